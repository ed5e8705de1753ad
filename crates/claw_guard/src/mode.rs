//! Engine-wide permission modes.
//!
//! The mode shifts the default outcome of evaluation:
//!
//! - `Default` - rules decide, everything else asks
//! - `AcceptEdits` - file-edit tools are allowed when no rule decides
//! - `Plan` - mutating tools are denied outright
//! - `BypassPermissions` - everything is allowed except explicit deny rules
//!
//! [`ModeController`] implements the interactive mode switch (cycling through the
//! modes in a fixed order), keeping `BypassPermissions` out of the cycle unless the
//! host has made it available for the session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Permission mode for tool evaluation
///
/// # Examples
///
/// ```
/// use claw_guard::mode::PermissionMode;
///
/// let mode: PermissionMode = "acceptEdits".parse().unwrap();
/// assert_eq!(mode, PermissionMode::AcceptEdits);
/// assert_eq!(serde_json::to_string(&mode).unwrap(), r#""acceptEdits""#);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Rules decide; unmatched invocations ask
    #[default]
    Default,
    /// Auto-accept file edits that no rule decides
    AcceptEdits,
    /// Allow everything not explicitly denied
    BypassPermissions,
    /// Read-only planning; mutating tools are denied
    Plan,
}

impl PermissionMode {
    /// camelCase wire name, matching the settings file and CLI flag values
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionMode::Default => "default",
            PermissionMode::AcceptEdits => "acceptEdits",
            PermissionMode::BypassPermissions => "bypassPermissions",
            PermissionMode::Plan => "plan",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a mode name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown permission mode: {0}")]
pub struct UnknownModeError(pub String);

impl FromStr for PermissionMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(PermissionMode::Default),
            "acceptEdits" => Ok(PermissionMode::AcceptEdits),
            "bypassPermissions" => Ok(PermissionMode::BypassPermissions),
            "plan" => Ok(PermissionMode::Plan),
            other => Err(UnknownModeError(other.to_string())),
        }
    }
}

/// Holds the active mode and implements the mode switch.
///
/// # Examples
///
/// ```
/// use claw_guard::mode::{ModeController, PermissionMode};
///
/// let mut controller = ModeController::new(PermissionMode::Default);
/// assert_eq!(controller.cycle(), PermissionMode::AcceptEdits);
/// assert_eq!(controller.cycle(), PermissionMode::Plan);
/// assert_eq!(controller.cycle(), PermissionMode::Default);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeController {
    current: PermissionMode,
    bypass_available: bool,
}

impl ModeController {
    /// Create a controller; bypass is available only if the initial mode is bypass
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            current: mode,
            bypass_available: mode == PermissionMode::BypassPermissions,
        }
    }

    /// Allow or forbid `BypassPermissions` for this session
    pub fn with_bypass_available(mut self, available: bool) -> Self {
        self.bypass_available = available;
        if !available && self.current == PermissionMode::BypassPermissions {
            self.current = PermissionMode::Default;
        }
        self
    }

    /// The active mode
    pub fn current(&self) -> PermissionMode {
        self.current
    }

    /// Whether `BypassPermissions` can be selected
    pub fn bypass_available(&self) -> bool {
        self.bypass_available
    }

    /// Switch to a specific mode.
    ///
    /// Returns `false` and leaves the mode unchanged when asked for
    /// `BypassPermissions` while it is unavailable.
    pub fn set(&mut self, mode: PermissionMode) -> bool {
        if mode == PermissionMode::BypassPermissions && !self.bypass_available {
            tracing::warn!("Refusing to enter bypassPermissions: not available in this session");
            return false;
        }
        self.current = mode;
        true
    }

    /// Advance to the next mode in cycle order and return it.
    ///
    /// Order: default → acceptEdits → plan → bypassPermissions (if available) → default.
    pub fn cycle(&mut self) -> PermissionMode {
        self.current = match self.current {
            PermissionMode::Default => PermissionMode::AcceptEdits,
            PermissionMode::AcceptEdits => PermissionMode::Plan,
            PermissionMode::Plan if self.bypass_available => PermissionMode::BypassPermissions,
            PermissionMode::Plan | PermissionMode::BypassPermissions => PermissionMode::Default,
        };
        self.current
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(PermissionMode::Default)
    }
}
