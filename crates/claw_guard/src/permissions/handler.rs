//! [`PermissionHandler`] implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::PermissionHandler;
use crate::config::EngineConfig;
use crate::engine::PermissionEngine;
use crate::error::GuardError;
use crate::evaluator::{Invocation, PermissionDecision, PermissionEvaluator};

/// Decides tool calls against one fixed snapshot.
#[derive(Debug, Clone)]
pub struct StaticPermissionHandler {
    config: Arc<EngineConfig>,
    evaluator: PermissionEvaluator,
}

impl StaticPermissionHandler {
    /// Handler with the default evaluator
    pub fn new(config: EngineConfig) -> Self {
        Self::with_evaluator(config, PermissionEvaluator::default())
    }

    /// Handler with a custom classifier and resolver
    pub fn with_evaluator(config: EngineConfig, evaluator: PermissionEvaluator) -> Self {
        Self {
            config: Arc::new(config),
            evaluator,
        }
    }

    /// The snapshot decisions are made against
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[async_trait]
impl PermissionHandler for StaticPermissionHandler {
    async fn check(&self, tool_name: &str, tool_input: &Value) -> Result<PermissionDecision, GuardError> {
        let invocation = Invocation::from_tool_input(tool_name, tool_input);
        Ok(self.evaluator.evaluate(&invocation, &self.config))
    }
}

#[async_trait]
impl PermissionHandler for PermissionEngine {
    async fn check(&self, tool_name: &str, tool_input: &Value) -> Result<PermissionDecision, GuardError> {
        let invocation = Invocation::from_tool_input(tool_name, tool_input);
        Ok(self.evaluate(&invocation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{DecisionReason, PermissionOutcome};
    use crate::mode::PermissionMode;
    use crate::rules::RuleBehavior;
    use crate::source::RuleSource;
    use crate::store::InMemoryConfigStore;
    use serde_json::json;

    fn handler() -> StaticPermissionHandler {
        StaticPermissionHandler::new(
            EngineConfig::builder()
                .working_directory("/work")
                .rule(RuleSource::UserSettings, RuleBehavior::Allow, "Bash(git diff:*)")
                .rule(RuleSource::UserSettings, RuleBehavior::Deny, "WebFetch")
                .build(),
        )
    }

    #[tokio::test]
    async fn test_check_reads_command_field() {
        let decision = handler()
            .check("Bash", &json!({ "command": "git diff:--stat" }))
            .await
            .unwrap();
        assert_eq!(decision.outcome, PermissionOutcome::Allow);
    }

    #[tokio::test]
    async fn test_check_reads_file_path_for_scope() {
        let decision = handler()
            .check("Write", &json!({ "file_path": "/etc/hosts", "content": "" }))
            .await
            .unwrap();
        assert_eq!(decision.outcome, PermissionOutcome::Deny);
        assert!(matches!(decision.reason, DecisionReason::OutOfScope { .. }));
    }

    #[tokio::test]
    async fn test_can_use_tool() {
        let handler = handler();
        assert!(handler.can_use_tool("Bash", &json!({ "command": "git diff:HEAD" })).await.unwrap());
        assert!(!handler.can_use_tool("WebFetch", &json!({ "url": "https://example.com" })).await.unwrap());
        // Ask is not an allow
        assert!(!handler.can_use_tool("Bash", &json!({ "command": "make" })).await.unwrap());
    }

    #[tokio::test]
    async fn test_engine_as_handler_sees_mutations() {
        let engine = PermissionEngine::new(
            EngineConfig::builder().mode(PermissionMode::AcceptEdits).build(),
            Arc::new(InMemoryConfigStore::new()),
        );
        let handler: &dyn PermissionHandler = &engine;
        let input = json!({ "command": "npm install" });

        assert!(!handler.can_use_tool("Bash", &input).await.unwrap());
        engine
            .add_always_allow_rule(RuleSource::LocalSettings, "Bash", Some("npm install"))
            .await
            .unwrap();
        assert!(handler.can_use_tool("Bash", &input).await.unwrap());
    }
}
