//! Tool classification.
//!
//! The engine does not know what tools exist; it only asks a [`ToolClassifier`] a few
//! yes/no questions about a tool name. Hosts with their own tool registry implement
//! the trait; [`BuiltinToolClassifier`] covers the standard agent tool set.

use std::collections::HashSet;

use crate::rules::RuleValue;

/// Answers the questions evaluation needs about a tool
pub trait ToolClassifier: Send + Sync {
    /// The tool can change state (files, processes, remote systems).
    ///
    /// Mutating tools are denied in `Plan` mode.
    fn is_mutating(&self, tool_name: &str) -> bool;

    /// The tool edits files; auto-allowed in `AcceptEdits` mode when no rule decides
    fn is_file_edit(&self, tool_name: &str) -> bool;

    /// The tool's argument string is a filesystem path subject to scope checks
    fn is_filesystem(&self, tool_name: &str) -> bool {
        self.is_file_edit(tool_name)
    }
}

const FILE_EDIT_TOOLS: &[&str] = &["Edit", "MultiEdit", "Write", "NotebookEdit"];
const FILE_READ_TOOLS: &[&str] = &["Read", "NotebookRead", "Glob", "Grep", "LS"];
const MUTATING_TOOLS: &[&str] = &["Bash", "Edit", "MultiEdit", "Write", "NotebookEdit", "KillShell"];
const READ_ONLY_TOOLS: &[&str] = &[
    "Read",
    "NotebookRead",
    "Glob",
    "Grep",
    "LS",
    "TodoWrite",
    "WebSearch",
];

/// Classifier for the standard agent tool set.
///
/// - File edits: `Edit`, `MultiEdit`, `Write`, `NotebookEdit`
/// - Mutating: the file edits plus `Bash` and `KillShell`, and every `mcp__*` tool
/// - Filesystem: the file edits plus `Read`, `NotebookRead`, `Glob`, `Grep` and `LS`
///
/// Unknown tools are treated as mutating, so `Plan` mode fails closed.
///
/// # Examples
///
/// ```
/// use claw_guard::classify::{BuiltinToolClassifier, ToolClassifier};
///
/// let classifier = BuiltinToolClassifier::new();
/// assert!(classifier.is_file_edit("Write"));
/// assert!(classifier.is_mutating("Bash"));
/// assert!(!classifier.is_mutating("Grep"));
/// assert!(classifier.is_mutating("SomethingNew"));
/// ```
#[derive(Debug, Clone)]
pub struct BuiltinToolClassifier {
    read_only: HashSet<String>,
}

impl BuiltinToolClassifier {
    /// Classifier with the standard read-only tool list
    pub fn new() -> Self {
        Self {
            read_only: READ_ONLY_TOOLS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Mark an additional tool as read-only (never mutating)
    pub fn with_read_only_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.read_only.insert(tool_name.into());
        self
    }

    /// Default allow rules for the read-only tools, appended as lowest-priority
    /// built-in rules during aggregation.
    ///
    /// Path-taking tools among them (`Read`, `Glob`, `Grep`, `LS`, ...) are still
    /// confined by the working-directory scope, and the evaluator only applies
    /// a built-in rule to them when the scope is bounded.
    pub fn builtin_allow_rules(&self) -> Vec<RuleValue> {
        let mut tools: Vec<&String> = self.read_only.iter().collect();
        tools.sort();
        tools.into_iter().map(|tool| RuleValue::tool(tool.as_str())).collect()
    }
}

impl Default for BuiltinToolClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolClassifier for BuiltinToolClassifier {
    fn is_mutating(&self, tool_name: &str) -> bool {
        if MUTATING_TOOLS.contains(&tool_name) || tool_name.starts_with("mcp__") {
            return true;
        }
        !self.read_only.contains(tool_name) && !matches!(tool_name, "WebFetch")
    }

    fn is_file_edit(&self, tool_name: &str) -> bool {
        FILE_EDIT_TOOLS.contains(&tool_name)
    }

    fn is_filesystem(&self, tool_name: &str) -> bool {
        self.is_file_edit(tool_name) || FILE_READ_TOOLS.contains(&tool_name)
    }
}
