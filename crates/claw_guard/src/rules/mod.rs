//! Typed permission rules.
//!
//! Raw rule strings (`"Bash(git diff:*)"`, `"Read"`) only exist at the configuration
//! boundary. Everything past it works on [`Rule`], which is parsed and compiled exactly
//! once and never mutated afterwards.
//!
//! # Matching
//!
//! - Tool names compare exactly and case-sensitively
//! - A rule without an argument pattern matches every invocation of its tool
//! - A pattern ending in `*` is a prefix test, anything else is exact equality
//!
//! ```
//! use claw_guard::evaluator::Invocation;
//! use claw_guard::rules::{Rule, RuleBehavior, RuleOrigin};
//! use claw_guard::source::RuleSource;
//!
//! let rule = Rule::parse(
//!     RuleOrigin::Source(RuleSource::ProjectSettings),
//!     "Bash(git diff:*)",
//!     RuleBehavior::Allow,
//! );
//! assert!(rule.matches(&Invocation::new("Bash", "git diff:--stat")));
//! assert!(!rule.matches(&Invocation::new("bash", "git diff:--stat")));
//! ```

mod parser;
mod pattern;

pub use parser::RuleValue;
pub use pattern::ArgumentPattern;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::evaluator::Invocation;
use crate::source::RuleSource;

/// Whether a rule grants or refuses an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleBehavior {
    /// Auto-allow matching invocations
    Allow,
    /// Auto-deny matching invocations
    Deny,
}

impl RuleBehavior {
    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            RuleBehavior::Allow => "allow",
            RuleBehavior::Deny => "deny",
        }
    }
}

/// Where a rule came from.
///
/// Origin is recorded for audit and display only; it never affects whether
/// Allow or Deny wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOrigin {
    /// One of the five configuration sources
    Source(RuleSource),
    /// A default rule supplied by the host's tool registry
    BuiltIn,
}

impl fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOrigin::Source(source) => source.fmt(f),
            RuleOrigin::BuiltIn => f.write_str("builtIn"),
        }
    }
}

/// A parsed, tagged permission rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    source: RuleOrigin,
    value: RuleValue,
    pattern: Option<ArgumentPattern>,
    behavior: RuleBehavior,
}

impl Rule {
    /// Build a rule from an already parsed value
    pub fn new(source: RuleOrigin, value: RuleValue, behavior: RuleBehavior) -> Self {
        let pattern = value.argument_pattern.as_deref().map(ArgumentPattern::compile);
        Self {
            source,
            value,
            pattern,
            behavior,
        }
    }

    /// Parse a raw rule string and tag it
    pub fn parse(source: RuleOrigin, raw: &str, behavior: RuleBehavior) -> Self {
        Self::new(source, RuleValue::parse(raw), behavior)
    }

    /// Where this rule came from
    pub fn source(&self) -> RuleOrigin {
        self.source
    }

    /// Tool the rule applies to
    pub fn tool_name(&self) -> &str {
        &self.value.tool_name
    }

    /// Raw argument pattern, if any
    pub fn argument_pattern(&self) -> Option<&str> {
        self.value.argument_pattern.as_deref()
    }

    /// Allow or Deny
    pub fn behavior(&self) -> RuleBehavior {
        self.behavior
    }

    /// The untagged tool/pattern pair
    pub fn value(&self) -> &RuleValue {
        &self.value
    }

    /// Literal prefix length of the argument pattern (0 when the rule covers the whole tool)
    pub fn specificity(&self) -> usize {
        self.pattern.as_ref().map_or(0, ArgumentPattern::literal_len)
    }

    /// Check whether this rule applies to an invocation
    pub fn matches(&self, invocation: &Invocation) -> bool {
        if self.value.tool_name != invocation.tool_name {
            return false;
        }
        match &self.pattern {
            None => true,
            Some(pattern) => pattern.matches(&invocation.argument),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} from {}]", self.value, self.behavior.as_str(), self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(raw: &str, behavior: RuleBehavior) -> Rule {
        Rule::parse(RuleOrigin::Source(RuleSource::ProjectSettings), raw, behavior)
    }

    #[test]
    fn test_tool_only_rule_matches_every_argument() {
        let rule = project("Bash", RuleBehavior::Allow);
        assert!(rule.matches(&Invocation::new("Bash", "ls -la")));
        assert!(rule.matches(&Invocation::new("Bash", "rm -rf /")));
        assert!(rule.matches(&Invocation::new("Bash", "")));
        assert!(!rule.matches(&Invocation::new("Read", "ls")));
    }

    #[test]
    fn test_tool_name_is_case_sensitive() {
        let rule = project("Bash", RuleBehavior::Allow);
        assert!(!rule.matches(&Invocation::new("bash", "ls")));
        assert!(!rule.matches(&Invocation::new("BASH", "ls")));
    }

    #[test]
    fn test_prefix_rule() {
        let rule = project("Bash(git diff:*)", RuleBehavior::Allow);
        assert!(rule.matches(&Invocation::new("Bash", "git diff:--stat")));
        assert!(rule.matches(&Invocation::new("Bash", "git diff:")));
        assert!(!rule.matches(&Invocation::new("Bash", "git status")));
        assert!(!rule.matches(&Invocation::new("Bash", "agit diff:x")));
    }

    #[test]
    fn test_exact_rule() {
        let rule = project("Read(secrets.env)", RuleBehavior::Deny);
        assert!(rule.matches(&Invocation::new("Read", "secrets.env")));
        assert!(!rule.matches(&Invocation::new("Read", "secrets.env.example")));
    }

    #[test]
    fn test_opaque_rule_only_matches_its_literal_name() {
        let rule = project("Bash()", RuleBehavior::Deny);
        assert_eq!(rule.tool_name(), "Bash()");
        assert!(!rule.matches(&Invocation::new("Bash", "")));
    }

    #[test]
    fn test_specificity() {
        assert_eq!(project("Bash", RuleBehavior::Deny).specificity(), 0);
        assert_eq!(project("Bash(rm *)", RuleBehavior::Deny).specificity(), 3);
        assert_eq!(project("Bash(rm -rf /)", RuleBehavior::Deny).specificity(), 8);
    }

    #[test]
    fn test_display() {
        let rule = project("Bash(ls)", RuleBehavior::Allow);
        assert_eq!(rule.to_string(), "Bash(ls) [allow from projectSettings]");

        let rule = Rule::parse(RuleOrigin::BuiltIn, "Read", RuleBehavior::Allow);
        assert_eq!(rule.to_string(), "Read [allow from builtIn]");
    }
}
