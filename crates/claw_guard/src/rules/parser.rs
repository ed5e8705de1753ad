//! Parsing of raw rule strings into typed fragments.
//!
//! The wire format is `Name` or `Name(content)`. Parsing never fails: a string that
//! does not fit the grammar becomes an opaque tool name with no argument pattern, so
//! a typo in a settings file can never take the engine down.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// `Name(content)`, anchored on both ends, neither group empty.
static RULE_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^(]+)\(([^)]+)\)$").expect("rule grammar is a valid regex")
});

/// A parsed rule string: a tool name plus an optional argument pattern.
///
/// This is the typed form of the `Tool(pattern)` wire encoding. It carries no
/// source or behavior; see [`Rule`](crate::rules::Rule) for the fully tagged form.
///
/// # Examples
///
/// ```
/// use claw_guard::rules::RuleValue;
///
/// let value = RuleValue::parse("Bash(git diff:*)");
/// assert_eq!(value.tool_name, "Bash");
/// assert_eq!(value.argument_pattern.as_deref(), Some("git diff:*"));
/// assert_eq!(value.to_string(), "Bash(git diff:*)");
///
/// // Malformed input falls back to an opaque tool name
/// let value = RuleValue::parse("Bash()");
/// assert_eq!(value.tool_name, "Bash()");
/// assert!(value.argument_pattern.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleValue {
    /// Tool the rule applies to (compared case-sensitively)
    pub tool_name: String,
    /// Argument pattern; `None` matches every invocation of the tool
    pub argument_pattern: Option<String>,
}

impl RuleValue {
    /// Build a rule value from its parts
    pub fn new(tool_name: impl Into<String>, argument_pattern: Option<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            argument_pattern,
        }
    }

    /// A rule value that covers every invocation of `tool_name`
    pub fn tool(tool_name: impl Into<String>) -> Self {
        Self::new(tool_name, None)
    }

    /// Parse a raw rule string.
    pub fn parse(raw: &str) -> Self {
        match RULE_GRAMMAR.captures(raw) {
            Some(caps) => {
                let name = caps.get(1).map_or("", |m| m.as_str());
                let content = caps.get(2).map_or("", |m| m.as_str());
                if name.is_empty() || content.is_empty() {
                    return Self::tool(raw);
                }
                Self::new(name, Some(content.to_string()))
            }
            None => Self::tool(raw),
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument_pattern {
            Some(pattern) => write!(f, "{}({})", self.tool_name, pattern),
            None => f.write_str(&self.tool_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_only() {
        let value = RuleValue::parse("Read");
        assert_eq!(value.tool_name, "Read");
        assert!(value.argument_pattern.is_none());
    }

    #[test]
    fn test_parse_tool_with_pattern() {
        let value = RuleValue::parse("Bash(npm run test:*)");
        assert_eq!(value.tool_name, "Bash");
        assert_eq!(value.argument_pattern.as_deref(), Some("npm run test:*"));
    }

    #[test]
    fn test_parse_mcp_tool_name() {
        let value = RuleValue::parse("mcp__github__create_issue");
        assert_eq!(value.tool_name, "mcp__github__create_issue");
        assert!(value.argument_pattern.is_none());
    }

    #[test]
    fn test_empty_content_falls_back_to_opaque_name() {
        let value = RuleValue::parse("Bash()");
        assert_eq!(value, RuleValue::tool("Bash()"));
    }

    #[test]
    fn test_empty_name_falls_back_to_opaque_name() {
        let value = RuleValue::parse("(ls)");
        assert_eq!(value, RuleValue::tool("(ls)"));
    }

    #[test]
    fn test_nested_parens_fall_back_to_opaque_name() {
        let value = RuleValue::parse("Bash(echo (hi))");
        assert_eq!(value.tool_name, "Bash(echo (hi))");
        assert!(value.argument_pattern.is_none());
    }

    #[test]
    fn test_trailing_text_falls_back_to_opaque_name() {
        let value = RuleValue::parse("Bash(ls) extra");
        assert_eq!(value.tool_name, "Bash(ls) extra");
        assert!(value.argument_pattern.is_none());
    }

    #[test]
    fn test_unclosed_paren_falls_back_to_opaque_name() {
        let value = RuleValue::parse("Bash(ls");
        assert_eq!(value, RuleValue::tool("Bash(ls"));
    }

    #[test]
    fn test_empty_string_is_opaque() {
        let value = RuleValue::parse("");
        assert_eq!(value.tool_name, "");
        assert!(value.argument_pattern.is_none());
    }

    #[test]
    fn test_display_matches_wire_format() {
        assert_eq!(RuleValue::tool("Read").to_string(), "Read");
        assert_eq!(
            RuleValue::new("Bash", Some("rm -rf *".to_string())).to_string(),
            "Bash(rm -rf *)"
        );
    }

    #[test]
    fn test_display_then_parse_is_stable() {
        let value = RuleValue::new("WebFetch", Some("domain:example.com".to_string()));
        assert_eq!(RuleValue::parse(&value.to_string()), value);
    }
}
