//! claw_guard - permission engine for LLM agent tool calls
//!
//! An agent that can run shell commands, edit files and fetch URLs needs a gate in
//! front of every tool call. This crate is that gate: given a tool invocation it
//! decides **Allow** (run it), **Deny** (refuse it) or **Ask** (get a human to confirm).
//!
//! # Overview
//!
//! Decisions come from rules such as `Bash(git diff:*)` or `Write`, collected from
//! five configuration sources, combined with an engine-wide permission mode and the
//! session's working directories:
//!
//! - Rules are parsed once per snapshot, never per decision
//! - Deny rules always win over allow rules, from any source and in any mode
//! - Evaluation is synchronous, pure and I/O-free
//! - Rule changes are serialized through one queue and persisted before they are published
//! - Deprecated flat settings keys are migrated with a visible warning
//!
//! # Architecture
//!
//! - `rules`: rule parsing (`Tool(pattern)`) and prefix-glob matching
//! - `source`: the five rule sources and their raw per-tool lists
//! - `aggregate`: flattening every source into typed allow and deny arrays
//! - `mode`: permission modes and the mode switch
//! - `scope`: working directories and path containment
//! - `classify`: tool classification (mutating, file-edit, filesystem)
//! - `evaluator`: the decision state machine
//! - `config`: settings documents, snapshots and loading
//! - `store` / `prompt`: host collaborators for persistence and user notices
//! - `engine`: snapshot publication and the mutation queue
//! - `migrate`: legacy settings conversion
//! - `permissions`: the raw tool-call seam for agent loops
//! - `error`: error types
//!
//! # Example
//!
//! ```rust
//! use claw_guard::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GuardError> {
//!     let store = Arc::new(InMemoryConfigStore::new());
//!     let (config, _report) = EngineConfig::builder()
//!         .working_directory("/work/project")
//!         .builtin_rules(BuiltinToolClassifier::new().builtin_allow_rules())
//!         .load(store.as_ref(), &TracingPrompt)
//!         .await;
//!
//!     let engine = PermissionEngine::new(config, store);
//!     engine
//!         .add_always_deny_rule(RuleSource::ProjectSettings, "Bash", Some("rm -rf *"))
//!         .await?;
//!     engine
//!         .add_always_allow_rule(RuleSource::UserSettings, "Bash", None)
//!         .await?;
//!
//!     let decision = engine.evaluate(&Invocation::new("Bash", "rm -rf /tmp/x"));
//!     assert_eq!(decision.outcome, PermissionOutcome::Deny);
//!
//!     let decision = engine.evaluate(&Invocation::new("Bash", "ls -la"));
//!     assert_eq!(decision.outcome, PermissionOutcome::Allow);
//!
//!     let decision = engine.evaluate(&Invocation::new("Write", "/etc/passwd"));
//!     assert_eq!(decision.outcome, PermissionOutcome::Deny);
//!     Ok(())
//! }
//! ```
//!
//! # License
//!
//! Licensed under MIT. See LICENSE file for details.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Rule parsing and argument pattern matching
///
/// A raw rule string is either a bare tool name (`Bash`) or a tool name with an
/// argument pattern (`Bash(git diff:*)`). Patterns are a literal with an optional
/// trailing `*`; there is no other glob or regex syntax.
pub mod rules;

/// The five fixed rule sources and their raw rule lists
pub mod source;

/// Aggregation of every source into one [`RuleSet`](aggregate::RuleSet)
pub mod aggregate;

/// Permission modes and the mode switch
pub mod mode;

/// Working-directory scope for filesystem tools
pub mod scope;

/// Tool classification used by mode and scope checks
pub mod classify;

/// The permission decision state machine
///
/// See [`PermissionEvaluator::evaluate`](evaluator::PermissionEvaluator::evaluate)
/// for the exact order of checks.
pub mod evaluator;

/// Settings documents, config snapshots and loading from a store
pub mod config;

/// Persistence collaborator
pub mod store;

/// User notice collaborator
pub mod prompt;

/// The permission engine
///
/// Owns the current [`EngineConfig`](config::EngineConfig) snapshot and applies
/// rule mutations one at a time on a background task.
pub mod engine;

/// Legacy settings migration
pub mod migrate;

/// Permission checks on raw tool calls
pub mod permissions;

/// Error types and utilities
///
/// This module defines the `GuardError` enum:
///
/// - `UnknownSource` - A source name outside the five fixed sources
/// - `ReadOnlySource` - A mutation aimed at policy settings
/// - `ConfigLoad` - A source failed to load (reported, never fatal)
/// - `Persist` - The config store rejected a save
/// - `JsonDecode` - Settings JSON did not decode (auto-converts from `serde_json::Error`)
/// - `EngineClosed` - The engine's mutation queue has shut down
pub mod error;

// Public API re-exports
pub use engine::PermissionEngine;
pub use evaluator::{Invocation, PermissionDecision, PermissionOutcome};
pub use migrate::migrate_legacy_config;

// Prelude module for common imports
pub mod prelude {
    //! Common imports for claw_guard users
    //!
    //! Use `use claw_guard::prelude::*;` to import commonly used types.

    pub use crate::aggregate::RuleSet;
    pub use crate::classify::{BuiltinToolClassifier, ToolClassifier};
    pub use crate::config::{EngineConfig, EngineConfigBuilder, LoadReport, SettingsDocument};
    pub use crate::engine::{PermissionEngine, PermissionEngineBuilder};
    pub use crate::error::GuardError;
    pub use crate::evaluator::{
        DecisionReason, Invocation, PermissionDecision, PermissionEvaluator, PermissionOutcome,
    };
    pub use crate::migrate::{MigrationResult, migrate_legacy_config};
    pub use crate::mode::{ModeController, PermissionMode};
    pub use crate::permissions::{PermissionHandler, StaticPermissionHandler};
    pub use crate::prompt::{TracingPrompt, UiPrompt};
    pub use crate::rules::{Rule, RuleBehavior, RuleOrigin, RuleValue};
    pub use crate::scope::{LexicalPathResolver, PathResolver, WorkingDirectoryScope};
    pub use crate::source::{IntoRuleSource, RuleSource, SourceRules};
    pub use crate::store::{ConfigStore, InMemoryConfigStore};
}
