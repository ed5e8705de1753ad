//! Flattening of all rule sources into typed allow and deny arrays.
//!
//! The aggregator is the only place raw rule strings are parsed. It runs once per
//! [`EngineConfig`](crate::config::EngineConfig) snapshot, producing a [`RuleSet`]
//! that evaluation reads without ever re-parsing.
//!
//! # Inputs, in output order
//!
//! 1. Each source's `alwaysAllowRules` / `alwaysDenyRules`, in fixed source order
//! 2. The legacy ProjectSettings `allowedTools` list, as ProjectSettings allow rules
//! 3. Built-in default rules from the tool registry, as lowest-priority allow rules
//!
//! # Entry interpretation
//!
//! An entry stored under a tool key is used as-is when it parses to that same tool
//! (`"Bash"` or `"Bash(ls)"` under `"Bash"`). Any other entry is taken as the argument
//! pattern for the keyed tool, so `"git diff:*"` under `"Bash"` means `Bash(git diff:*)`.

use std::collections::{BTreeMap, HashMap};

use crate::evaluator::Invocation;
use crate::rules::{Rule, RuleBehavior, RuleOrigin, RuleValue};
use crate::source::{RuleSource, SourceRules};

/// Indices into the flat arrays for one tool
#[derive(Debug, Clone, Default)]
struct ToolIndex {
    allow: Vec<usize>,
    deny: Vec<usize>,
}

/// Aggregated, parsed rules for one config snapshot.
///
/// # Examples
///
/// ```
/// use claw_guard::aggregate::RuleSet;
/// use claw_guard::evaluator::Invocation;
/// use claw_guard::rules::RuleBehavior;
/// use claw_guard::source::{RuleSource, SourceRules};
/// use std::collections::BTreeMap;
///
/// let mut project = SourceRules::new();
/// project.insert(RuleBehavior::Allow, "Bash(git diff:*)");
/// let mut sources = BTreeMap::new();
/// sources.insert(RuleSource::ProjectSettings, project);
///
/// let rules = RuleSet::aggregate(&sources, &[], &[]);
/// assert_eq!(rules.allow_rules().len(), 1);
/// assert!(rules.first_match(RuleBehavior::Allow, &Invocation::new("Bash", "git diff:HEAD")).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    allow: Vec<Rule>,
    deny: Vec<Rule>,
    by_tool: HashMap<String, ToolIndex>,
}

impl RuleSet {
    /// Build a rule set from every input.
    ///
    /// # Arguments
    ///
    /// * `sources` - Raw per-tool rule lists of each loaded source
    /// * `project_allowed_tools` - Legacy untagged `allowedTools` list of ProjectSettings
    /// * `builtin` - Default allow rules supplied by the host's tool registry
    pub fn aggregate(
        sources: &BTreeMap<RuleSource, SourceRules>,
        project_allowed_tools: &[String],
        builtin: &[RuleValue],
    ) -> Self {
        let mut set = RuleSet::default();

        for source in RuleSource::ALL {
            let Some(rules) = sources.get(&source) else {
                continue;
            };
            for behavior in [RuleBehavior::Allow, RuleBehavior::Deny] {
                for (tool, entries) in rules.entries(behavior) {
                    for raw in entries {
                        set.push(Rule::new(
                            RuleOrigin::Source(source),
                            entry_value(tool, raw),
                            behavior,
                        ));
                    }
                }
            }
        }

        for raw in project_allowed_tools {
            set.push(Rule::parse(
                RuleOrigin::Source(RuleSource::ProjectSettings),
                raw,
                RuleBehavior::Allow,
            ));
        }

        for value in builtin {
            set.push(Rule::new(RuleOrigin::BuiltIn, value.clone(), RuleBehavior::Allow));
        }

        tracing::debug!(
            allow = set.allow.len(),
            deny = set.deny.len(),
            "Aggregated permission rules"
        );
        set
    }

    fn push(&mut self, rule: Rule) {
        let index = self.by_tool.entry(rule.tool_name().to_string()).or_default();
        match rule.behavior() {
            RuleBehavior::Allow => {
                index.allow.push(self.allow.len());
                self.allow.push(rule);
            }
            RuleBehavior::Deny => {
                index.deny.push(self.deny.len());
                self.deny.push(rule);
            }
        }
    }

    /// All allow rules, in source order with built-ins last
    pub fn allow_rules(&self) -> &[Rule] {
        &self.allow
    }

    /// All deny rules, in source order
    pub fn deny_rules(&self) -> &[Rule] {
        &self.deny
    }

    /// Rules of one behavior that apply to a tool, in source order
    pub fn rules_for<'a>(
        &'a self,
        behavior: RuleBehavior,
        tool_name: &str,
    ) -> impl Iterator<Item = &'a Rule> + use<'a> {
        let (rules, indices) = match (behavior, self.by_tool.get(tool_name)) {
            (RuleBehavior::Allow, Some(index)) => (&self.allow, index.allow.as_slice()),
            (RuleBehavior::Deny, Some(index)) => (&self.deny, index.deny.as_slice()),
            (RuleBehavior::Allow, None) => (&self.allow, &[][..]),
            (RuleBehavior::Deny, None) => (&self.deny, &[][..]),
        };
        indices.iter().map(move |&i| &rules[i])
    }

    /// Every rule of one behavior matching an invocation, in source order
    pub fn matching<'a, 'b>(
        &'a self,
        behavior: RuleBehavior,
        invocation: &'b Invocation,
    ) -> impl Iterator<Item = &'a Rule> + use<'a, 'b> {
        self.rules_for(behavior, &invocation.tool_name)
            .filter(move |rule| rule.matches(invocation))
    }

    /// The first matching rule of one behavior, in source order
    pub fn first_match(&self, behavior: RuleBehavior, invocation: &Invocation) -> Option<&Rule> {
        self.matching(behavior, invocation).next()
    }

    /// The matching deny rule with the longest literal prefix.
    ///
    /// Ties go to the earliest rule in source order.
    pub fn most_specific_deny(&self, invocation: &Invocation) -> Option<&Rule> {
        let mut best: Option<&Rule> = None;
        for rule in self.matching(RuleBehavior::Deny, invocation) {
            if best.is_none_or(|current| rule.specificity() > current.specificity()) {
                best = Some(rule);
            }
        }
        best
    }

    /// True when the set holds no rules at all
    pub fn is_empty(&self) -> bool {
        self.allow.is_empty() && self.deny.is_empty()
    }
}

/// Interpret a raw entry stored under a tool key.
fn entry_value(tool: &str, raw: &str) -> RuleValue {
    let parsed = RuleValue::parse(raw);
    if parsed.tool_name == tool {
        parsed
    } else {
        RuleValue::new(tool, Some(raw.to_string()))
    }
}
