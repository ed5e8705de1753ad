//! The permission decision state machine.
//!
//! [`PermissionEvaluator::evaluate`] is a pure function of an [`Invocation`] and an
//! [`EngineConfig`] snapshot. It performs no I/O, holds no state between calls, and
//! walks a fixed sequence of steps where the first step that decides wins:
//!
//! ```text
//! 1. bypassPermissions ──► Deny if a deny rule matches, otherwise Allow
//! 2. plan + mutating tool ─────────────────────────────────────► Deny
//! 3. filesystem tool + path outside working directories ───────► Deny
//! 4. any deny rule matches (most specific reported) ───────────► Deny
//! 5. any allow rule matches ───────────────────────────────────► Allow
//!    (built-in rules for path tools need a bounded scope)
//! 6. acceptEdits + file-edit tool ─────────────────────────────► Allow
//! 7. otherwise ────────────────────────────────────────────────► Ask
//! ```
//!
//! Deny rules win over allow rules regardless of which source contributed them,
//! and they win even in `BypassPermissions` mode.
//!
//! # Example
//!
//! ```
//! use claw_guard::config::EngineConfig;
//! use claw_guard::evaluator::{Invocation, PermissionEvaluator, PermissionOutcome};
//! use claw_guard::rules::RuleBehavior;
//! use claw_guard::source::RuleSource;
//!
//! let config = EngineConfig::builder()
//!     .rule(RuleSource::UserSettings, RuleBehavior::Allow, "Bash")
//!     .rule(RuleSource::UserSettings, RuleBehavior::Deny, "Bash(rm -rf *)")
//!     .build();
//! let evaluator = PermissionEvaluator::default();
//!
//! let decision = evaluator.evaluate(&Invocation::new("Bash", "rm -rf /tmp/x"), &config);
//! assert_eq!(decision.outcome, PermissionOutcome::Deny);
//!
//! let decision = evaluator.evaluate(&Invocation::new("Bash", "ls -la"), &config);
//! assert_eq!(decision.outcome, PermissionOutcome::Allow);
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::classify::{BuiltinToolClassifier, ToolClassifier};
use crate::config::EngineConfig;
use crate::mode::PermissionMode;
use crate::rules::{Rule, RuleBehavior, RuleOrigin};
use crate::scope::{LexicalPathResolver, PathResolver};

/// Input fields consulted, in order, when deriving an argument string from JSON
const ARGUMENT_FIELDS: &[&str] = &["command", "file_path", "notebook_path", "path", "url", "pattern"];

/// A single request to run one tool with specific arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Invocation {
    /// Name of the tool being invoked (e.g., "Bash", "Write")
    pub tool_name: String,
    /// The argument string matched against rule patterns
    pub argument: String,
}

impl Invocation {
    /// Create an invocation from a tool name and argument string
    pub fn new(tool_name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            argument: argument.into(),
        }
    }

    /// Derive an invocation from a tool call's JSON input.
    ///
    /// The argument string is the first string found among `command`, `file_path`,
    /// `notebook_path`, `path`, `url` and `pattern`; empty when none is present.
    ///
    /// ```
    /// use claw_guard::evaluator::Invocation;
    /// use serde_json::json;
    ///
    /// let invocation = Invocation::from_tool_input("Bash", &json!({ "command": "ls -la" }));
    /// assert_eq!(invocation.argument, "ls -la");
    /// ```
    pub fn from_tool_input(tool_name: impl Into<String>, tool_input: &Value) -> Self {
        let argument = ARGUMENT_FIELDS
            .iter()
            .find_map(|field| tool_input.get(*field).and_then(Value::as_str))
            .unwrap_or_default();
        Self::new(tool_name, argument)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.tool_name, self.argument)
    }
}

/// The three possible outcomes of evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionOutcome {
    /// Run the tool without asking
    Allow,
    /// Refuse the tool call
    Deny,
    /// Require human confirmation
    Ask,
}

impl PermissionOutcome {
    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionOutcome::Allow => "allow",
            PermissionOutcome::Deny => "deny",
            PermissionOutcome::Ask => "ask",
        }
    }
}

/// Which step of the state machine produced a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionReason {
    /// The active mode decided (bypass allow, plan deny)
    Mode(PermissionMode),
    /// The target path lies outside every working directory
    OutOfScope {
        /// The offending path
        path: String,
    },
    /// A configured or built-in rule decided; see `matched_rule`
    Rule,
    /// `AcceptEdits` auto-accepted a file edit
    AcceptEdits,
    /// Nothing decided, so the user must be asked
    NoMatchingRule,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::Mode(mode) => write!(f, "{} mode", mode),
            DecisionReason::OutOfScope { path } => {
                write!(f, "{} is outside the allowed working directories", path)
            }
            DecisionReason::Rule => f.write_str("matched rule"),
            DecisionReason::AcceptEdits => f.write_str("file edits are auto-accepted"),
            DecisionReason::NoMatchingRule => f.write_str("no rule matched"),
        }
    }
}

/// The result of evaluating one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDecision {
    /// Allow, Deny or Ask
    pub outcome: PermissionOutcome,
    /// The rule that decided, when a rule decided
    pub matched_rule: Option<Rule>,
    /// Which evaluation step decided
    pub reason: DecisionReason,
}

impl PermissionDecision {
    fn new(outcome: PermissionOutcome, reason: DecisionReason) -> Self {
        Self {
            outcome,
            matched_rule: None,
            reason,
        }
    }

    fn by_rule(outcome: PermissionOutcome, rule: &Rule) -> Self {
        Self {
            outcome,
            matched_rule: Some(rule.clone()),
            reason: DecisionReason::Rule,
        }
    }

    /// Human-readable explanation for audit logs and prompts
    pub fn explanation(&self) -> String {
        match &self.matched_rule {
            Some(rule) => format!("{}: {}", self.outcome.as_str(), rule),
            None => format!("{}: {}", self.outcome.as_str(), self.reason),
        }
    }
}

/// Evaluates invocations against config snapshots.
///
/// Holds only the host's classifier and path resolver; cloning is cheap.
#[derive(Clone)]
pub struct PermissionEvaluator {
    classifier: Arc<dyn ToolClassifier>,
    resolver: Arc<dyn PathResolver>,
}

impl PermissionEvaluator {
    /// Create an evaluator from host collaborators
    pub fn new(classifier: Arc<dyn ToolClassifier>, resolver: Arc<dyn PathResolver>) -> Self {
        Self {
            classifier,
            resolver,
        }
    }

    /// The tool classifier in use
    pub fn classifier(&self) -> &Arc<dyn ToolClassifier> {
        &self.classifier
    }

    /// Decide one invocation against one snapshot.
    pub fn evaluate(&self, invocation: &Invocation, config: &EngineConfig) -> PermissionDecision {
        let decision = self.decide(invocation, config);
        tracing::debug!(
            tool = %invocation.tool_name,
            outcome = decision.outcome.as_str(),
            reason = %decision.reason,
            "Evaluated tool permission"
        );
        decision
    }

    fn decide(&self, invocation: &Invocation, config: &EngineConfig) -> PermissionDecision {
        let mode = config.mode();
        let rules = config.rules();

        if mode == PermissionMode::BypassPermissions {
            if let Some(rule) = rules.most_specific_deny(invocation) {
                return PermissionDecision::by_rule(PermissionOutcome::Deny, rule);
            }
            return PermissionDecision::new(PermissionOutcome::Allow, DecisionReason::Mode(mode));
        }

        if mode == PermissionMode::Plan && self.classifier.is_mutating(&invocation.tool_name) {
            return PermissionDecision::new(PermissionOutcome::Deny, DecisionReason::Mode(mode));
        }

        let takes_path = self.classifier.is_filesystem(&invocation.tool_name);
        if takes_path
            && !invocation.argument.is_empty()
            && !config.scope().contains(&invocation.argument, self.resolver.as_ref())
        {
            return PermissionDecision::new(
                PermissionOutcome::Deny,
                DecisionReason::OutOfScope {
                    path: invocation.argument.clone(),
                },
            );
        }

        if let Some(rule) = rules.most_specific_deny(invocation) {
            return PermissionDecision::by_rule(PermissionOutcome::Deny, rule);
        }

        // Without working directories nothing confines a path tool
        let unconfined = takes_path && config.scope().is_unbounded();
        if let Some(rule) = rules
            .matching(RuleBehavior::Allow, invocation)
            .find(|rule| !(unconfined && rule.source() == RuleOrigin::BuiltIn))
        {
            return PermissionDecision::by_rule(PermissionOutcome::Allow, rule);
        }

        if mode == PermissionMode::AcceptEdits && self.classifier.is_file_edit(&invocation.tool_name) {
            return PermissionDecision::new(PermissionOutcome::Allow, DecisionReason::AcceptEdits);
        }

        PermissionDecision::new(PermissionOutcome::Ask, DecisionReason::NoMatchingRule)
    }
}

impl Default for PermissionEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(BuiltinToolClassifier::new()), Arc::new(LexicalPathResolver))
    }
}

impl fmt::Debug for PermissionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionEvaluator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RuleSource;
    use serde_json::json;

    fn scenario_config(mode: PermissionMode) -> EngineConfig {
        EngineConfig::builder()
            .mode(mode)
            .rule(RuleSource::ProjectSettings, RuleBehavior::Deny, "Bash(rm -rf *)")
            .rule(RuleSource::UserSettings, RuleBehavior::Allow, "Bash")
            .build()
    }

    fn outcome(config: &EngineConfig, tool: &str, argument: &str) -> PermissionOutcome {
        PermissionEvaluator::default()
            .evaluate(&Invocation::new(tool, argument), config)
            .outcome
    }

    #[test]
    fn test_scenario_deny_beats_tool_wide_allow() {
        let config = scenario_config(PermissionMode::Default);
        let decision =
            PermissionEvaluator::default().evaluate(&Invocation::new("Bash", "rm -rf /tmp/x"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Deny);
        assert_eq!(decision.reason, DecisionReason::Rule);
        assert_eq!(
            decision.matched_rule.unwrap().argument_pattern(),
            Some("rm -rf *")
        );
    }

    #[test]
    fn test_scenario_allow_when_no_deny_matches() {
        let config = scenario_config(PermissionMode::Default);
        assert_eq!(outcome(&config, "Bash", "ls -la"), PermissionOutcome::Allow);
    }

    #[test]
    fn test_scenario_empty_rules_ask() {
        let config = EngineConfig::builder().build();
        let decision =
            PermissionEvaluator::default().evaluate(&Invocation::new("Write", "/etc/passwd"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Ask);
        assert_eq!(decision.reason, DecisionReason::NoMatchingRule);
        assert!(decision.matched_rule.is_none());
    }

    #[test]
    fn test_deny_wins_across_sources() {
        // Allow from the first source in display order, deny from the last
        let config = EngineConfig::builder()
            .rule(RuleSource::CliArg, RuleBehavior::Allow, "WebFetch")
            .rule(RuleSource::UserSettings, RuleBehavior::Deny, "WebFetch")
            .build();
        assert_eq!(outcome(&config, "WebFetch", "https://example.com"), PermissionOutcome::Deny);
    }

    #[test]
    fn test_bypass_allows_everything_else() {
        let config = scenario_config(PermissionMode::BypassPermissions);
        assert_eq!(outcome(&config, "Bash", "ls"), PermissionOutcome::Allow);
        assert_eq!(outcome(&config, "Write", "/etc/passwd"), PermissionOutcome::Allow);
    }

    #[test]
    fn test_deny_rule_wins_under_bypass() {
        let config = scenario_config(PermissionMode::BypassPermissions);
        let decision =
            PermissionEvaluator::default().evaluate(&Invocation::new("Bash", "rm -rf /"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Deny);
        assert!(decision.matched_rule.is_some());
    }

    #[test]
    fn test_plan_denies_mutating_tools() {
        let config = scenario_config(PermissionMode::Plan);
        let decision = PermissionEvaluator::default().evaluate(&Invocation::new("Bash", "ls"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Deny);
        assert_eq!(decision.reason, DecisionReason::Mode(PermissionMode::Plan));
    }

    #[test]
    fn test_plan_leaves_read_only_tools_to_rules() {
        let config = EngineConfig::builder()
            .mode(PermissionMode::Plan)
            .rule(RuleSource::UserSettings, RuleBehavior::Allow, "Grep")
            .build();
        assert_eq!(outcome(&config, "Grep", "TODO"), PermissionOutcome::Allow);
        assert_eq!(outcome(&config, "WebFetch", "https://example.com"), PermissionOutcome::Ask);
    }

    #[test]
    fn test_out_of_scope_path_denied() {
        let config = EngineConfig::builder()
            .working_directory("/work/project")
            .rule(RuleSource::UserSettings, RuleBehavior::Allow, "Write")
            .build();
        let decision =
            PermissionEvaluator::default().evaluate(&Invocation::new("Write", "/etc/passwd"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Deny);
        assert_eq!(
            decision.reason,
            DecisionReason::OutOfScope {
                path: "/etc/passwd".to_string()
            }
        );

        assert_eq!(
            outcome(&config, "Write", "/work/project/notes.md"),
            PermissionOutcome::Allow
        );
    }

    #[test]
    fn test_relative_working_directory_fails_closed() {
        let config = EngineConfig::builder()
            .working_directory(".")
            .rule(RuleSource::UserSettings, RuleBehavior::Allow, "Write")
            .build();
        let decision =
            PermissionEvaluator::default().evaluate(&Invocation::new("Write", "../../etc/cron.d/x"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Deny);
        assert_eq!(
            decision.reason,
            DecisionReason::OutOfScope {
                path: "../../etc/cron.d/x".to_string()
            }
        );
    }

    #[test]
    fn test_additional_directory_is_in_scope() {
        let config = EngineConfig::builder()
            .working_directory("/work/project")
            .additional_directory("/data/shared")
            .build();
        assert_eq!(outcome(&config, "Read", "/data/shared/a.csv"), PermissionOutcome::Ask);
        assert_eq!(outcome(&config, "Read", "/data/private/a.csv"), PermissionOutcome::Deny);
    }

    #[test]
    fn test_bypass_skips_scope_check() {
        let config = EngineConfig::builder()
            .mode(PermissionMode::BypassPermissions)
            .working_directory("/work/project")
            .build();
        assert_eq!(outcome(&config, "Write", "/etc/hosts"), PermissionOutcome::Allow);
    }

    #[test]
    fn test_scope_ignores_non_filesystem_tools() {
        let config = EngineConfig::builder().working_directory("/work/project").build();
        assert_eq!(outcome(&config, "Bash", "cat /etc/passwd"), PermissionOutcome::Ask);
    }

    #[test]
    fn test_accept_edits_allows_file_edits_only() {
        let config = EngineConfig::builder()
            .mode(PermissionMode::AcceptEdits)
            .working_directory("/work/project")
            .build();
        let decision = PermissionEvaluator::default()
            .evaluate(&Invocation::new("Edit", "/work/project/src/lib.rs"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Allow);
        assert_eq!(decision.reason, DecisionReason::AcceptEdits);

        assert_eq!(outcome(&config, "Bash", "make"), PermissionOutcome::Ask);
    }

    #[test]
    fn test_accept_edits_does_not_override_deny() {
        let config = EngineConfig::builder()
            .mode(PermissionMode::AcceptEdits)
            .rule(RuleSource::ProjectSettings, RuleBehavior::Deny, "Edit(.env)")
            .build();
        assert_eq!(outcome(&config, "Edit", ".env"), PermissionOutcome::Deny);
    }

    #[test]
    fn test_most_specific_deny_is_reported() {
        let config = EngineConfig::builder()
            .rule(RuleSource::UserSettings, RuleBehavior::Deny, "Bash(rm *)")
            .rule(RuleSource::LocalSettings, RuleBehavior::Deny, "Bash(rm -rf /*)")
            .build();
        let decision =
            PermissionEvaluator::default().evaluate(&Invocation::new("Bash", "rm -rf /home"), &config);
        let rule = decision.matched_rule.unwrap();
        assert_eq!(rule.argument_pattern(), Some("rm -rf /*"));
        assert_eq!(rule.source(), RuleOrigin::Source(RuleSource::LocalSettings));
    }

    #[test]
    fn test_builtin_rules_allow() {
        let config = EngineConfig::builder()
            .working_directory("/work/project")
            .builtin_rules(BuiltinToolClassifier::new().builtin_allow_rules())
            .build();
        let evaluator = PermissionEvaluator::default();
        for (tool, argument) in [("Grep", "TODO"), ("LS", "/work/project/src"), ("WebSearch", "tokio")] {
            let decision = evaluator.evaluate(&Invocation::new(tool, argument), &config);
            assert_eq!(decision.outcome, PermissionOutcome::Allow, "{tool}");
            assert_eq!(decision.matched_rule.unwrap().source(), RuleOrigin::BuiltIn);
        }
    }

    #[test]
    fn test_search_tools_are_scoped() {
        let config = EngineConfig::builder()
            .working_directory("/work/project")
            .builtin_rules(BuiltinToolClassifier::new().builtin_allow_rules())
            .build();
        let evaluator = PermissionEvaluator::default();
        for (tool, input) in [
            ("LS", json!({ "path": "/root/.ssh" })),
            ("Grep", json!({ "pattern": "BEGIN", "path": "/root/.ssh" })),
            ("Glob", json!({ "pattern": "*.conf", "path": "/etc" })),
            ("Glob", json!({ "pattern": "/etc/**/*.conf" })),
        ] {
            let decision = evaluator.evaluate(&Invocation::from_tool_input(tool, &input), &config);
            assert_eq!(decision.outcome, PermissionOutcome::Deny, "{tool} {input}");
            assert!(
                matches!(decision.reason, DecisionReason::OutOfScope { .. }),
                "{tool} {input}"
            );
        }

        let inside = Invocation::from_tool_input("Grep", &json!({ "pattern": "TODO", "path": "src" }));
        assert_eq!(evaluator.evaluate(&inside, &config).outcome, PermissionOutcome::Allow);
    }

    #[test]
    fn test_builtin_rules_need_bounded_scope_for_path_tools() {
        let config = EngineConfig::builder()
            .builtin_rules(BuiltinToolClassifier::new().builtin_allow_rules())
            .rule(RuleSource::UserSettings, RuleBehavior::Allow, "Grep")
            .build();
        assert_eq!(outcome(&config, "Read", "/etc/shadow"), PermissionOutcome::Ask);
        assert_eq!(outcome(&config, "LS", "/root"), PermissionOutcome::Ask);
        assert_eq!(outcome(&config, "WebSearch", "tokio"), PermissionOutcome::Allow);

        // Configured rules still apply
        let decision = PermissionEvaluator::default().evaluate(&Invocation::new("Grep", "TODO"), &config);
        assert_eq!(decision.outcome, PermissionOutcome::Allow);
        assert_eq!(
            decision.matched_rule.unwrap().source(),
            RuleOrigin::Source(RuleSource::UserSettings)
        );
    }

    #[test]
    fn test_evaluate_is_deterministic() {
        let config = scenario_config(PermissionMode::Default);
        let evaluator = PermissionEvaluator::default();
        let invocation = Invocation::new("Bash", "rm -rf /tmp/x");
        assert_eq!(
            evaluator.evaluate(&invocation, &config),
            evaluator.evaluate(&invocation, &config)
        );
    }

    #[test]
    fn test_invocation_from_tool_input() {
        let bash = Invocation::from_tool_input("Bash", &json!({ "command": "git status", "timeout": 5 }));
        assert_eq!(bash.argument, "git status");

        let write = Invocation::from_tool_input("Write", &json!({ "file_path": "/tmp/a", "content": "x" }));
        assert_eq!(write.argument, "/tmp/a");

        let fetch = Invocation::from_tool_input("WebFetch", &json!({ "url": "https://example.com" }));
        assert_eq!(fetch.argument, "https://example.com");

        let other = Invocation::from_tool_input("TodoWrite", &json!({ "todos": [] }));
        assert_eq!(other.argument, "");
    }

    #[test]
    fn test_explanation() {
        let config = scenario_config(PermissionMode::Default);
        let evaluator = PermissionEvaluator::default();
        let denied = evaluator.evaluate(&Invocation::new("Bash", "rm -rf /"), &config);
        assert_eq!(
            denied.explanation(),
            "deny: Bash(rm -rf *) [deny from projectSettings]"
        );

        let asked = evaluator.evaluate(&Invocation::new("Write", "a.txt"), &config);
        assert_eq!(asked.explanation(), "ask: no rule matched");
    }
}
