//! The five fixed rule sources and their raw per-tool rule lists.
//!
//! Sources are a closed enum rather than free-form strings, so a misspelled source
//! name fails loudly with [`GuardError::UnknownSource`] instead of silently dropping
//! rules.
//!
//! | Source            | Wire name         | Editable | Persisted |
//! |-------------------|-------------------|----------|-----------|
//! | `CliArg`          | `cliArg`          | yes      | no        |
//! | `PolicySettings`  | `policySettings`  | no       | -         |
//! | `ProjectSettings` | `projectSettings` | yes      | yes       |
//! | `LocalSettings`   | `localSettings`   | yes      | yes       |
//! | `UserSettings`    | `userSettings`    | yes      | yes       |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::GuardError;
use crate::rules::{RuleBehavior, RuleValue};

/// A configuration origin contributing rules.
///
/// Variant order is the fixed audit/display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleSource {
    /// Rules passed on the command line for this session
    CliArg,
    /// Administrator-managed policy
    PolicySettings,
    /// Shared project settings, checked into the repository
    ProjectSettings,
    /// Per-checkout project settings, not checked in
    LocalSettings,
    /// The user's global settings
    UserSettings,
}

impl RuleSource {
    /// All sources, in fixed display order
    pub const ALL: [RuleSource; 5] = [
        RuleSource::CliArg,
        RuleSource::PolicySettings,
        RuleSource::ProjectSettings,
        RuleSource::LocalSettings,
        RuleSource::UserSettings,
    ];

    /// camelCase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            RuleSource::CliArg => "cliArg",
            RuleSource::PolicySettings => "policySettings",
            RuleSource::ProjectSettings => "projectSettings",
            RuleSource::LocalSettings => "localSettings",
            RuleSource::UserSettings => "userSettings",
        }
    }

    /// Whether session mutations may target this source
    pub fn is_editable(self) -> bool {
        !matches!(self, RuleSource::PolicySettings)
    }

    /// Whether mutations to this source are written through the config store
    pub fn is_persisted(self) -> bool {
        match self {
            RuleSource::CliArg | RuleSource::PolicySettings => false,
            RuleSource::ProjectSettings | RuleSource::LocalSettings | RuleSource::UserSettings => {
                true
            }
        }
    }
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleSource {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleSource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| GuardError::UnknownSource { name: s.to_string() })
    }
}

/// Anything a mutation call can name a source with.
///
/// Implemented for [`RuleSource`] itself and for wire names (`&str`, `String`),
/// so hosts can pass user input straight through and get
/// [`GuardError::UnknownSource`] back for that call alone.
pub trait IntoRuleSource {
    /// Resolve to one of the five sources
    fn into_rule_source(self) -> Result<RuleSource, GuardError>;
}

impl IntoRuleSource for RuleSource {
    fn into_rule_source(self) -> Result<RuleSource, GuardError> {
        Ok(self)
    }
}

impl IntoRuleSource for &str {
    fn into_rule_source(self) -> Result<RuleSource, GuardError> {
        self.parse()
    }
}

impl IntoRuleSource for String {
    fn into_rule_source(self) -> Result<RuleSource, GuardError> {
        self.parse()
    }
}

/// Raw rule strings of one source, keyed by tool name.
///
/// Lists keep insertion order and never hold the same raw string twice under one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRules {
    /// `alwaysAllowRules`: tool name → raw rule strings
    #[serde(default)]
    pub allow: BTreeMap<String, Vec<String>>,
    /// `alwaysDenyRules`: tool name → raw rule strings
    #[serde(default)]
    pub deny: BTreeMap<String, Vec<String>>,
}

impl SourceRules {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build CLI rules from `--allowedTools` / `--disallowedTools` values.
    ///
    /// Each value may hold several rules separated by commas or whitespace, except
    /// inside parentheses: `"Bash(git log:*),Read"` yields two rules.
    ///
    /// ```
    /// use claw_guard::source::SourceRules;
    ///
    /// let rules = SourceRules::from_cli_args(
    ///     &["Bash(git log:*),Read".to_string()],
    ///     &["WebFetch".to_string()],
    /// );
    /// assert_eq!(rules.allow["Bash"], vec!["Bash(git log:*)".to_string()]);
    /// assert_eq!(rules.allow["Read"], vec!["Read".to_string()]);
    /// assert_eq!(rules.deny["WebFetch"], vec!["WebFetch".to_string()]);
    /// ```
    pub fn from_cli_args(allowed: &[String], disallowed: &[String]) -> Self {
        let mut rules = Self::new();
        for raw in allowed.iter().flat_map(|arg| split_rule_list(arg)) {
            rules.insert(RuleBehavior::Allow, &raw);
        }
        for raw in disallowed.iter().flat_map(|arg| split_rule_list(arg)) {
            rules.insert(RuleBehavior::Deny, &raw);
        }
        rules
    }

    /// The map for one behavior
    pub fn entries(&self, behavior: RuleBehavior) -> &BTreeMap<String, Vec<String>> {
        match behavior {
            RuleBehavior::Allow => &self.allow,
            RuleBehavior::Deny => &self.deny,
        }
    }

    fn entries_mut(&mut self, behavior: RuleBehavior) -> &mut BTreeMap<String, Vec<String>> {
        match behavior {
            RuleBehavior::Allow => &mut self.allow,
            RuleBehavior::Deny => &mut self.deny,
        }
    }

    /// Insert a raw rule string under its parsed tool name.
    ///
    /// Returns `false` when the exact string is already stored.
    pub fn insert(&mut self, behavior: RuleBehavior, raw: &str) -> bool {
        let tool = RuleValue::parse(raw).tool_name;
        self.insert_under(behavior, &tool, raw)
    }

    /// Insert a raw entry under an explicit tool key.
    ///
    /// Returns `false` when the exact string is already stored under that key.
    pub fn insert_under(&mut self, behavior: RuleBehavior, tool: &str, raw: &str) -> bool {
        let list = self.entries_mut(behavior).entry(tool.to_string()).or_default();
        if list.iter().any(|existing| existing == raw) {
            return false;
        }
        list.push(raw.to_string());
        true
    }

    /// Remove every occurrence of an exact raw string from one behavior.
    ///
    /// The other behavior's entries are untouched, so revoking an allow never
    /// drops a deny with the same text. Emptied tool lists are dropped. Returns
    /// `true` if anything was removed.
    pub fn remove(&mut self, behavior: RuleBehavior, raw: &str) -> bool {
        let map = self.entries_mut(behavior);
        let mut removed = false;
        for list in map.values_mut() {
            let before = list.len();
            list.retain(|existing| existing != raw);
            removed |= list.len() != before;
        }
        map.retain(|_, list| !list.is_empty());
        removed
    }

    /// Check whether an exact raw string is stored for a behavior
    pub fn contains(&self, behavior: RuleBehavior, raw: &str) -> bool {
        self.entries(behavior)
            .values()
            .any(|list| list.iter().any(|existing| existing == raw))
    }

    /// Total number of stored entries for a behavior
    pub fn len(&self, behavior: RuleBehavior) -> usize {
        self.entries(behavior).values().map(Vec::len).sum()
    }

    /// True when no allow or deny entries are stored
    pub fn is_empty(&self) -> bool {
        self.allow.values().all(Vec::is_empty) && self.deny.values().all(Vec::is_empty)
    }

    /// Merge another rule set into this one, skipping duplicates
    pub fn merge(&mut self, other: &SourceRules) {
        for behavior in [RuleBehavior::Allow, RuleBehavior::Deny] {
            for (tool, list) in other.entries(behavior) {
                for raw in list {
                    self.insert_under(behavior, tool, raw);
                }
            }
        }
    }
}

/// Split a CLI rule list on commas and whitespace outside parentheses.
fn split_rule_list(arg: &str) -> Vec<String> {
    let mut rules = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for ch in arg.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if depth == 0 && (c == ',' || c.is_whitespace()) => {
                if !current.is_empty() {
                    rules.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        rules.push(current);
    }
    rules
}
