//! Host-facing permission checks on raw tool calls.
//!
//! Agent loops usually see a tool call as a name plus a JSON input object. The
//! [`PermissionHandler`] trait is the seam where such a loop asks for a decision,
//! without building an [`Invocation`](crate::evaluator::Invocation) itself.
//!
//! # Implementations
//!
//! - [`PermissionEngine`](crate::engine::PermissionEngine): decides against the
//!   engine's current snapshot
//! - [`StaticPermissionHandler`]: decides against one fixed snapshot, for hosts
//!   that never mutate rules during a session
//!
//! # Example
//!
//! ```rust
//! use claw_guard::prelude::*;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), GuardError> {
//! let config = EngineConfig::builder()
//!     .rule(RuleSource::CliArg, RuleBehavior::Allow, "Bash(cargo test:*)")
//!     .build();
//! let handler = StaticPermissionHandler::new(config);
//!
//! let decision = handler
//!     .check("Bash", &json!({ "command": "cargo test:unit" }))
//!     .await?;
//! assert_eq!(decision.outcome, PermissionOutcome::Allow);
//!
//! assert!(!handler.can_use_tool("Bash", &json!({ "command": "cargo publish" })).await?);
//! # Ok(())
//! # }
//! ```

mod handler;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GuardError;
use crate::evaluator::{PermissionDecision, PermissionOutcome};

pub use handler::StaticPermissionHandler;

/// Decides raw tool calls
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    /// Decide a tool call from its name and JSON input
    async fn check(&self, tool_name: &str, tool_input: &Value) -> Result<PermissionDecision, GuardError>;

    /// `true` only for `Allow`.
    ///
    /// `Ask` reads as `false`; callers that can prompt the user should use
    /// [`check`](Self::check) and handle `Ask` themselves.
    async fn can_use_tool(&self, tool_name: &str, tool_input: &Value) -> Result<bool, GuardError> {
        let decision = self.check(tool_name, tool_input).await?;
        Ok(decision.outcome == PermissionOutcome::Allow)
    }
}
