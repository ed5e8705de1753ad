//! Prefix-glob argument patterns.
//!
//! A pattern is a literal string that may end in a single `*`. With the trailing
//! wildcard the pattern is a prefix test; without it, an exact comparison. No shell
//! tokenization happens here: `"git diff:*"` is a byte-for-byte prefix, so
//! `"agit diff:x"` or `" git diff:x"` never match.

/// A compiled argument pattern.
///
/// # Examples
///
/// ```
/// use claw_guard::rules::ArgumentPattern;
///
/// let pattern = ArgumentPattern::compile("git diff:*");
/// assert!(pattern.matches("git diff:--stat"));
/// assert!(pattern.matches("git diff:"));
/// assert!(!pattern.matches("git status"));
///
/// let exact = ArgumentPattern::compile("ls");
/// assert!(exact.matches("ls"));
/// assert!(!exact.matches("ls -la"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgumentPattern {
    /// Exact string equality
    Exact(String),
    /// Prefix test; holds the literal text before the trailing `*`
    Prefix(String),
}

impl ArgumentPattern {
    /// Compile a raw pattern string.
    pub fn compile(raw: &str) -> Self {
        match raw.strip_suffix('*') {
            Some(prefix) => ArgumentPattern::Prefix(prefix.to_string()),
            None => ArgumentPattern::Exact(raw.to_string()),
        }
    }

    /// Check whether an invocation's argument string matches.
    pub fn matches(&self, argument: &str) -> bool {
        match self {
            ArgumentPattern::Exact(literal) => argument == literal,
            ArgumentPattern::Prefix(prefix) => argument.starts_with(prefix.as_str()),
        }
    }

    /// The literal text of the pattern, without the wildcard
    pub fn literal(&self) -> &str {
        match self {
            ArgumentPattern::Exact(literal) | ArgumentPattern::Prefix(literal) => literal,
        }
    }

    /// Length of the literal text, used to rank competing matches by specificity
    pub fn literal_len(&self) -> usize {
        self.literal().len()
    }
}
