//! Error types for the claw_guard permission engine
//!
//! This module defines the error hierarchy for the claw_guard crate using `thiserror`.
//! Fallible operations return `Result<T, GuardError>`.
//!
//! Note that most malformed input is *not* an error here: an unparsable rule string
//! becomes an opaque tool name, and an unmatched invocation resolves to `Ask`. Errors
//! are reserved for calls that must be rejected or failures that must be surfaced.
//!
//! # Error Variants
//!
//! - [`GuardError::UnknownSource`]: A source name outside the five fixed sources
//! - [`GuardError::ReadOnlySource`]: A mutation aimed at administrator-managed policy settings
//! - [`GuardError::ConfigLoad`]: A source failed to load (non-fatal, reported at load time)
//! - [`GuardError::Persist`]: The config store rejected a save
//! - [`GuardError::JsonDecode`]: Settings JSON did not decode (auto-converts from `serde_json::Error`)
//! - [`GuardError::EngineClosed`]: The engine's mutation queue has shut down
//!
//! # Example
//!
//! ```rust
//! use claw_guard::error::GuardError;
//! use claw_guard::source::RuleSource;
//!
//! let err = "globalSettings".parse::<RuleSource>().unwrap_err();
//! assert!(matches!(err, GuardError::UnknownSource { .. }));
//! ```

use thiserror::Error;

use crate::source::RuleSource;

/// The main error type for all claw_guard operations
#[derive(Error, Debug)]
pub enum GuardError {
    /// A source name did not match any of the five fixed rule sources
    ///
    /// Only the offending call is rejected; the engine keeps serving
    /// evaluations against its previous snapshot.
    #[error("Unknown rule source: {name}")]
    UnknownSource {
        /// The name that failed to parse
        name: String,
    },

    /// A mutation targeted a source that cannot be edited from the session
    #[error("Rule source {rule_source} is read-only")]
    ReadOnlySource {
        /// The source that rejected the mutation
        rule_source: RuleSource,
    },

    /// A source could not be loaded from the config store
    ///
    /// Load failures are non-fatal: the source contributes no rules and no mode,
    /// so every decision it would have made degrades to `Ask`.
    #[error("Failed to load {rule_source}: {reason}")]
    ConfigLoad {
        /// The source that failed to load
        rule_source: RuleSource,
        /// Description of the failure
        reason: String,
    },

    /// The config store failed to persist a mutation
    ///
    /// When this is returned the in-memory snapshot is left unchanged.
    #[error("Failed to persist {rule_source}: {reason}")]
    Persist {
        /// The source being written
        rule_source: RuleSource,
        /// Description of the failure
        reason: String,
    },

    /// Failed to decode a settings document
    #[error("Failed to decode settings JSON: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// The engine's background mutation task is no longer running
    #[error("Permission engine is closed")]
    EngineClosed,
}
