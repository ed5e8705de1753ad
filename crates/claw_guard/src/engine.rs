//! The permission engine: snapshot publication and the serialized mutation queue.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  PermissionEngine (handle)                   │
//! │                                                              │
//! │  evaluate() ──► watch::Receiver<Arc<EngineConfig>> (borrow)  │
//! │                                                              │
//! │  add/remove/set_mode/... ──► mpsc::Sender<Request>           │
//! │                                  │          ▲                │
//! │                                  ▼          │ oneshot reply  │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │                 EngineTask (spawned)                    │ │
//! │  │  1. derive next snapshot from current                   │ │
//! │  │  2. ConfigStore::save(patch)  (persisted sources only)  │ │
//! │  │  3. watch::Sender::send_replace(next)                   │ │
//! │  └────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Evaluation never waits on the queue: it reads whatever snapshot is current
//! and keeps that `Arc` for the whole decision. Mutations apply one at a time
//! in arrival order, and a snapshot is published only after its change was
//! persisted, so the stored settings and the in-memory state never diverge.
//!
//! # Example
//!
//! ```
//! use claw_guard::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), GuardError> {
//! let store = Arc::new(InMemoryConfigStore::new());
//! let engine = PermissionEngine::new(EngineConfig::builder().build(), store);
//!
//! let invocation = Invocation::new("Bash", "git diff:HEAD");
//! assert_eq!(engine.evaluate(&invocation).outcome, PermissionOutcome::Ask);
//!
//! engine
//!     .add_always_allow_rule(RuleSource::LocalSettings, "Bash", Some("git diff:*"))
//!     .await?;
//! assert_eq!(engine.evaluate(&invocation).outcome, PermissionOutcome::Allow);
//! # Ok(())
//! # }
//! ```

use serde_json::{Map, Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;

use crate::config::EngineConfig;
use crate::error::GuardError;
use crate::evaluator::{Invocation, PermissionDecision, PermissionEvaluator};
use crate::migrate::migrate_legacy_config;
use crate::mode::PermissionMode;
use crate::prompt::{TracingPrompt, UiPrompt};
use crate::rules::{RuleBehavior, RuleValue};
use crate::source::{IntoRuleSource, RuleSource};
use crate::store::{ConfigStore, InMemoryConfigStore};

const DEFAULT_QUEUE_CAPACITY: usize = 64;

type Reply = oneshot::Sender<Result<Arc<EngineConfig>, GuardError>>;

#[derive(Debug)]
enum Mutation {
    AddRule {
        source: RuleSource,
        behavior: RuleBehavior,
        raw: String,
    },
    RemoveRule {
        source: RuleSource,
        behavior: RuleBehavior,
        raw: String,
    },
    SetMode(PermissionMode),
    CycleMode,
    AddWorkingDirectory {
        source: RuleSource,
        dir: PathBuf,
    },
    ApplyLegacyConfig(Value),
    Shutdown,
}

#[derive(Debug)]
struct Request {
    mutation: Mutation,
    reply: Reply,
}

/// Handle to a running permission engine.
///
/// Cloning the handle is cheap; every clone talks to the same background task
/// and sees the same snapshots.
#[derive(Debug, Clone)]
pub struct PermissionEngine {
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<Arc<EngineConfig>>,
    evaluator: PermissionEvaluator,
}

impl PermissionEngine {
    /// Spawn an engine with the default evaluator and [`TracingPrompt`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: EngineConfig, store: Arc<dyn ConfigStore>) -> Self {
        Self::builder(config).store(store).spawn()
    }

    /// Create a builder starting from an initial snapshot
    pub fn builder(config: EngineConfig) -> PermissionEngineBuilder {
        PermissionEngineBuilder {
            config,
            store: None,
            prompt: None,
            evaluator: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.snapshots.borrow().clone()
    }

    /// The evaluator used by [`evaluate`](Self::evaluate)
    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    /// Decide an invocation against the current snapshot.
    ///
    /// Synchronous and I/O-free; never waits on pending mutations.
    pub fn evaluate(&self, invocation: &Invocation) -> PermissionDecision {
        let snapshot = self.snapshot();
        self.evaluator.evaluate(invocation, &snapshot)
    }

    /// Stream of snapshots: the current one first, then every published change.
    ///
    /// Intermediate snapshots may be skipped if the consumer falls behind.
    pub fn subscribe(&self) -> WatchStream<Arc<EngineConfig>> {
        WatchStream::new(self.snapshots.clone())
    }

    /// Add an always-allow rule `tool_name` or `tool_name(pattern)` to a source.
    ///
    /// Adding a string the source already holds returns the current snapshot
    /// without persisting.
    ///
    /// # Errors
    ///
    /// - [`GuardError::UnknownSource`] if `source` names no known source
    /// - [`GuardError::ReadOnlySource`] for policy settings
    /// - [`GuardError::Persist`] if the store rejects the change
    /// - [`GuardError::EngineClosed`] after [`shutdown`](Self::shutdown)
    pub async fn add_always_allow_rule(
        &self,
        source: impl IntoRuleSource,
        tool_name: &str,
        pattern: Option<&str>,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        self.add_rule(source, RuleBehavior::Allow, tool_name, pattern).await
    }

    /// Add an always-deny rule; see [`add_always_allow_rule`](Self::add_always_allow_rule)
    pub async fn add_always_deny_rule(
        &self,
        source: impl IntoRuleSource,
        tool_name: &str,
        pattern: Option<&str>,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        self.add_rule(source, RuleBehavior::Deny, tool_name, pattern).await
    }

    async fn add_rule(
        &self,
        source: impl IntoRuleSource,
        behavior: RuleBehavior,
        tool_name: &str,
        pattern: Option<&str>,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        let source = source.into_rule_source()?;
        let pattern = pattern.filter(|p| !p.is_empty()).map(str::to_string);
        let raw = RuleValue::new(tool_name, pattern).to_string();
        self.request(Mutation::AddRule {
            source,
            behavior,
            raw,
        })
        .await
    }

    /// Revoke a granted permission: remove an exact raw allow rule string from a source.
    ///
    /// Deny rules with the same text stay in place. For project settings the
    /// legacy `allowedTools` list is searched too. Removing an absent string
    /// returns the current snapshot without persisting.
    pub async fn remove_rule(
        &self,
        source: impl IntoRuleSource,
        raw: &str,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        self.remove(source, RuleBehavior::Allow, raw).await
    }

    /// Remove an exact raw deny rule string from a source; see [`remove_rule`](Self::remove_rule)
    pub async fn remove_deny_rule(
        &self,
        source: impl IntoRuleSource,
        raw: &str,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        self.remove(source, RuleBehavior::Deny, raw).await
    }

    async fn remove(
        &self,
        source: impl IntoRuleSource,
        behavior: RuleBehavior,
        raw: &str,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        let source = source.into_rule_source()?;
        self.request(Mutation::RemoveRule {
            source,
            behavior,
            raw: raw.to_string(),
        })
        .await
    }

    /// Switch the session mode (not persisted).
    ///
    /// A refused switch to `BypassPermissions` returns the unchanged snapshot.
    pub async fn set_mode(&self, mode: PermissionMode) -> Result<Arc<EngineConfig>, GuardError> {
        self.request(Mutation::SetMode(mode)).await
    }

    /// Advance the session mode in cycle order (not persisted)
    pub async fn cycle_mode(&self) -> Result<Arc<EngineConfig>, GuardError> {
        self.request(Mutation::CycleMode).await
    }

    /// Add an additional working directory to a source
    pub async fn add_working_directory(
        &self,
        source: impl IntoRuleSource,
        dir: impl Into<PathBuf>,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        let source = source.into_rule_source()?;
        self.request(Mutation::AddWorkingDirectory {
            source,
            dir: dir.into(),
        })
        .await
    }

    /// Migrate a legacy settings object into project settings.
    ///
    /// Every migration warning is shown through the engine's [`UiPrompt`]. The
    /// migrated rules merge into ProjectSettings and are persisted.
    pub async fn apply_legacy_config(&self, legacy: Value) -> Result<Arc<EngineConfig>, GuardError> {
        self.request(Mutation::ApplyLegacyConfig(legacy)).await
    }

    /// Stop the background task.
    ///
    /// Mutations queued before this call still apply; later ones fail with
    /// [`GuardError::EngineClosed`]. Evaluation keeps serving the last snapshot.
    pub async fn shutdown(&self) {
        if self.request(Mutation::Shutdown).await.is_err() {
            tracing::debug!("Permission engine already stopped");
        }
    }

    async fn request(&self, mutation: Mutation) -> Result<Arc<EngineConfig>, GuardError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { mutation, reply })
            .await
            .map_err(|_| GuardError::EngineClosed)?;
        response.await.map_err(|_| GuardError::EngineClosed)?
    }
}

/// Builder for [`PermissionEngine`]
pub struct PermissionEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn ConfigStore>>,
    prompt: Option<Arc<dyn UiPrompt>>,
    evaluator: Option<PermissionEvaluator>,
    queue_capacity: usize,
}

impl PermissionEngineBuilder {
    /// Set the config store (default: an empty [`InMemoryConfigStore`])
    pub fn store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the UI collaborator (default: [`TracingPrompt`])
    pub fn prompt(mut self, prompt: Arc<dyn UiPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Set the evaluator (default: built-in classifier and lexical resolver)
    pub fn evaluator(mut self, evaluator: PermissionEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Bound of the mutation queue; senders wait while it is full
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Spawn the background task and return the handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> PermissionEngine {
        let initial = Arc::new(self.config);
        let (publisher, snapshots) = watch::channel(initial.clone());
        let (requests, receiver) = mpsc::channel(self.queue_capacity);

        let task = EngineTask {
            current: initial,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryConfigStore::new())),
            prompt: self.prompt.unwrap_or_else(|| Arc::new(TracingPrompt)),
            publisher,
        };
        tokio::spawn(task.run(receiver));

        PermissionEngine {
            requests,
            snapshots,
            evaluator: self.evaluator.unwrap_or_default(),
        }
    }
}

struct EngineTask {
    current: Arc<EngineConfig>,
    store: Arc<dyn ConfigStore>,
    prompt: Arc<dyn UiPrompt>,
    publisher: watch::Sender<Arc<EngineConfig>>,
}

impl EngineTask {
    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        tracing::debug!("Permission engine started");
        while let Some(Request { mutation, reply }) = requests.recv().await {
            if let Mutation::Shutdown = mutation {
                requests.close();
                // Drain what was queued before the shutdown request
                while let Ok(Request { mutation, reply }) = requests.try_recv() {
                    let result = self.apply(mutation).await;
                    let _ = reply.send(result);
                }
                let _ = reply.send(Ok(self.current.clone()));
                break;
            }
            let result = self.apply(mutation).await;
            // The caller may have stopped waiting
            let _ = reply.send(result);
        }
        tracing::debug!("Permission engine stopped");
    }

    async fn apply(&mut self, mutation: Mutation) -> Result<Arc<EngineConfig>, GuardError> {
        match mutation {
            Mutation::AddRule {
                source,
                behavior,
                raw,
            } => {
                ensure_editable(source)?;
                let Some(next) = self.current.with_rule(source, behavior, &raw) else {
                    tracing::debug!(source = %source, rule = %raw, "Rule already present");
                    return Ok(self.current.clone());
                };
                tracing::debug!(source = %source, behavior = behavior.as_str(), rule = %raw, "Adding rule");
                let patch = rules_patch(&next, source, false);
                self.commit(source, next, patch).await
            }
            Mutation::RemoveRule {
                source,
                behavior,
                raw,
            } => {
                ensure_editable(source)?;
                let Some(next) = self.current.without_rule(source, behavior, &raw) else {
                    tracing::debug!(source = %source, behavior = behavior.as_str(), rule = %raw, "Rule not present");
                    return Ok(self.current.clone());
                };
                tracing::debug!(source = %source, behavior = behavior.as_str(), rule = %raw, "Removing rule");
                let allowed_tools_changed =
                    next.project_allowed_tools() != self.current.project_allowed_tools();
                let patch = rules_patch(&next, source, allowed_tools_changed);
                self.commit(source, next, patch).await
            }
            Mutation::SetMode(mode) => match self.current.with_mode(mode) {
                Some(next) => {
                    tracing::debug!(mode = %mode, "Switching mode");
                    Ok(self.publish(next))
                }
                None => Ok(self.current.clone()),
            },
            Mutation::CycleMode => {
                let next = self.current.with_cycled_mode();
                tracing::debug!(mode = %next.mode(), "Cycled mode");
                Ok(self.publish(next))
            }
            Mutation::AddWorkingDirectory { source, dir } => {
                ensure_editable(source)?;
                let Some(next) = self.current.with_working_directory(source, &dir) else {
                    return Ok(self.current.clone());
                };
                tracing::debug!(source = %source, dir = %dir.display(), "Adding working directory");
                let patch = json!({
                    "additionalWorkingDirectories": next.source_directories(source),
                });
                self.commit(source, next, patch).await
            }
            Mutation::ApplyLegacyConfig(legacy) => {
                let source = RuleSource::ProjectSettings;
                let result = migrate_legacy_config(&legacy);
                for warning in &result.warnings {
                    self.prompt.warn(warning);
                }
                let next = self.current.with_settings(source, &result.migrated);
                let mut patch = rules_patch(&next, source, false);
                if let Value::Object(fields) = &mut patch {
                    fields.insert(
                        "additionalWorkingDirectories".to_string(),
                        json!(next.source_directories(source)),
                    );
                    if let Some(mode) = result.migrated.mode {
                        fields.insert("mode".to_string(), json!(mode));
                    }
                }
                self.commit(source, next, patch).await
            }
            Mutation::Shutdown => Ok(self.current.clone()),
        }
    }

    /// Persist if the source is persisted, then publish.
    async fn commit(
        &mut self,
        source: RuleSource,
        next: EngineConfig,
        patch: Value,
    ) -> Result<Arc<EngineConfig>, GuardError> {
        if source.is_persisted() {
            if let Err(err) = self.store.save(source, patch).await {
                let err = match err {
                    err @ GuardError::Persist { .. } => err,
                    other => GuardError::Persist {
                        rule_source: source,
                        reason: other.to_string(),
                    },
                };
                tracing::error!(source = %source, error = %err, "Failed to persist permission change");
                return Err(err);
            }
        }
        Ok(self.publish(next))
    }

    fn publish(&mut self, next: EngineConfig) -> Arc<EngineConfig> {
        let next = Arc::new(next);
        self.current = next.clone();
        self.publisher.send_replace(next.clone());
        next
    }
}

fn ensure_editable(source: RuleSource) -> Result<(), GuardError> {
    if source.is_editable() {
        Ok(())
    } else {
        Err(GuardError::ReadOnlySource {
            rule_source: source,
        })
    }
}

/// The full allow and deny maps of a source, plus the legacy list when it changed.
fn rules_patch(config: &EngineConfig, source: RuleSource, include_allowed_tools: bool) -> Value {
    let rules = config.source_rules(source).cloned().unwrap_or_default();
    let mut patch = Map::new();
    patch.insert("alwaysAllowRules".to_string(), json!(rules.allow));
    patch.insert("alwaysDenyRules".to_string(), json!(rules.deny));
    if include_allowed_tools {
        patch.insert(
            "allowedTools".to_string(),
            json!(config.project_allowed_tools()),
        );
    }
    Value::Object(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::PermissionOutcome;
    use crate::prompt::test_support::RecordingPrompt;
    use async_trait::async_trait;
    use tokio_stream::StreamExt;

    struct RejectingStore;

    #[async_trait]
    impl ConfigStore for RejectingStore {
        async fn load(&self, _source: RuleSource) -> Result<Value, GuardError> {
            Ok(Value::Null)
        }

        async fn save(&self, source: RuleSource, _patch: Value) -> Result<(), GuardError> {
            Err(GuardError::Persist {
                rule_source: source,
                reason: "disk full".to_string(),
            })
        }
    }

    fn engine_with_store() -> (PermissionEngine, Arc<InMemoryConfigStore>) {
        let store = Arc::new(InMemoryConfigStore::new());
        let engine = PermissionEngine::new(EngineConfig::builder().build(), store.clone());
        (engine, store)
    }

    #[tokio::test]
    async fn test_add_rule_persists_and_publishes() {
        let (engine, store) = engine_with_store();
        let snapshot = engine
            .add_always_deny_rule(RuleSource::UserSettings, "Bash", Some("rm -rf *"))
            .await
            .unwrap();

        assert_eq!(snapshot.rules().deny_rules().len(), 1);
        assert!(Arc::ptr_eq(&snapshot, &engine.snapshot()));
        assert_eq!(
            store.document(RuleSource::UserSettings).await,
            json!({
                "alwaysAllowRules": {},
                "alwaysDenyRules": { "Bash": ["Bash(rm -rf *)"] }
            })
        );
    }

    #[tokio::test]
    async fn test_duplicate_add_is_noop() {
        let (engine, _store) = engine_with_store();
        let first = engine
            .add_always_allow_rule(RuleSource::LocalSettings, "Read", None)
            .await
            .unwrap();
        let second = engine
            .add_always_allow_rule(RuleSource::LocalSettings, "Read", None)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            second
                .source_rules(RuleSource::LocalSettings)
                .unwrap()
                .len(RuleBehavior::Allow),
            1
        );
    }

    #[tokio::test]
    async fn test_empty_pattern_means_whole_tool() {
        let (engine, _store) = engine_with_store();
        let snapshot = engine
            .add_always_allow_rule(RuleSource::CliArg, "WebFetch", Some(""))
            .await
            .unwrap();
        assert!(
            snapshot
                .source_rules(RuleSource::CliArg)
                .unwrap()
                .contains(RuleBehavior::Allow, "WebFetch")
        );
    }

    #[tokio::test]
    async fn test_cli_arg_rules_are_not_persisted() {
        let (engine, store) = engine_with_store();
        engine
            .add_always_allow_rule(RuleSource::CliArg, "Bash", Some("ls"))
            .await
            .unwrap();
        assert_eq!(store.document(RuleSource::CliArg).await, Value::Null);
        assert_eq!(
            engine.evaluate(&Invocation::new("Bash", "ls")).outcome,
            PermissionOutcome::Allow
        );
    }

    #[tokio::test]
    async fn test_policy_settings_are_read_only() {
        let (engine, _store) = engine_with_store();
        let err = engine
            .add_always_allow_rule(RuleSource::PolicySettings, "Bash", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GuardError::ReadOnlySource {
                rule_source: RuleSource::PolicySettings
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_source_name() {
        let (engine, _store) = engine_with_store();
        let err = engine
            .add_always_allow_rule("globalSettings", "Bash", None)
            .await
            .unwrap_err();
        assert!(matches!(err, GuardError::UnknownSource { .. }));

        engine
            .add_always_allow_rule("userSettings", "Bash", None)
            .await
            .unwrap();
        assert_eq!(
            engine.evaluate(&Invocation::new("Bash", "ls")).outcome,
            PermissionOutcome::Allow
        );
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_snapshot() {
        let engine = PermissionEngine::new(EngineConfig::builder().build(), Arc::new(RejectingStore));
        let before = engine.snapshot();

        let err = engine
            .add_always_allow_rule(RuleSource::ProjectSettings, "Bash", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to persist projectSettings: disk full");
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));
    }

    #[tokio::test]
    async fn test_remove_rule() {
        let (engine, store) = engine_with_store();
        engine
            .add_always_allow_rule(RuleSource::ProjectSettings, "Bash", Some("npm test"))
            .await
            .unwrap();

        let unchanged = engine
            .remove_rule(RuleSource::ProjectSettings, "Bash(npm run)")
            .await
            .unwrap();
        assert_eq!(unchanged.rules().allow_rules().len(), 1);

        let snapshot = engine
            .remove_rule(RuleSource::ProjectSettings, "Bash(npm test)")
            .await
            .unwrap();
        assert!(snapshot.rules().is_empty());
        assert_eq!(
            store.document(RuleSource::ProjectSettings).await["alwaysAllowRules"],
            json!({})
        );
    }

    #[tokio::test]
    async fn test_revoking_allow_keeps_deny() {
        let (engine, store) = engine_with_store();
        engine
            .add_always_deny_rule(RuleSource::LocalSettings, "WebFetch", None)
            .await
            .unwrap();
        engine
            .add_always_allow_rule(RuleSource::LocalSettings, "WebFetch", None)
            .await
            .unwrap();

        let snapshot = engine
            .remove_rule(RuleSource::LocalSettings, "WebFetch")
            .await
            .unwrap();
        assert!(snapshot.rules().allow_rules().is_empty());
        assert_eq!(snapshot.rules().deny_rules().len(), 1);
        assert_eq!(
            engine.evaluate(&Invocation::new("WebFetch", "https://example.com")).outcome,
            PermissionOutcome::Deny
        );
        let document = store.document(RuleSource::LocalSettings).await;
        assert_eq!(document["alwaysAllowRules"], json!({}));
        assert_eq!(document["alwaysDenyRules"], json!({ "WebFetch": ["WebFetch"] }));

        let snapshot = engine
            .remove_deny_rule(RuleSource::LocalSettings, "WebFetch")
            .await
            .unwrap();
        assert!(snapshot.rules().is_empty());
        assert_eq!(
            store.document(RuleSource::LocalSettings).await["alwaysDenyRules"],
            json!({})
        );
    }

    #[tokio::test]
    async fn test_remove_legacy_allowed_tool_persists_list() {
        let store = Arc::new(InMemoryConfigStore::new());
        let config = EngineConfig::builder()
            .allowed_tools(vec!["WebFetch".to_string(), "Grep".to_string()])
            .build();
        let engine = PermissionEngine::new(config, store.clone());

        engine
            .remove_rule(RuleSource::ProjectSettings, "WebFetch")
            .await
            .unwrap();
        assert_eq!(
            store.document(RuleSource::ProjectSettings).await["allowedTools"],
            json!(["Grep"])
        );
    }

    #[tokio::test]
    async fn test_mode_changes_are_session_only() {
        let (engine, store) = engine_with_store();
        let snapshot = engine.set_mode(PermissionMode::Plan).await.unwrap();
        assert_eq!(snapshot.mode(), PermissionMode::Plan);

        let refused = engine
            .set_mode(PermissionMode::BypassPermissions)
            .await
            .unwrap();
        assert_eq!(refused.mode(), PermissionMode::Plan);

        let cycled = engine.cycle_mode().await.unwrap();
        assert_eq!(cycled.mode(), PermissionMode::Default);

        for source in RuleSource::ALL {
            assert_eq!(store.document(source).await, Value::Null);
        }
    }

    #[tokio::test]
    async fn test_add_working_directory() {
        let store = Arc::new(InMemoryConfigStore::new());
        let config = EngineConfig::builder().working_directory("/work").build();
        let engine = PermissionEngine::new(config, store.clone());

        let write = Invocation::new("Write", "/data/out.csv");
        assert_eq!(engine.evaluate(&write).outcome, PermissionOutcome::Deny);

        engine
            .add_working_directory(RuleSource::LocalSettings, "/data")
            .await
            .unwrap();
        assert_eq!(engine.evaluate(&write).outcome, PermissionOutcome::Ask);
        assert_eq!(
            store.document(RuleSource::LocalSettings).await,
            json!({ "additionalWorkingDirectories": ["/data"] })
        );
    }

    #[tokio::test]
    async fn test_apply_legacy_config() {
        let store = Arc::new(InMemoryConfigStore::new());
        let prompt = Arc::new(RecordingPrompt::default());
        let engine = PermissionEngine::builder(EngineConfig::builder().build())
            .store(store.clone())
            .prompt(prompt.clone())
            .spawn();

        let snapshot = engine
            .apply_legacy_config(json!({
                "allowedTools": ["Bash(git status)"],
                "ignorePatterns": [".env"]
            }))
            .await
            .unwrap();

        assert_eq!(snapshot.rules().allow_rules().len(), 1);
        assert_eq!(snapshot.rules().deny_rules().len(), 1);
        assert_eq!(prompt.messages().len(), 2);
        assert_eq!(
            engine.evaluate(&Invocation::new("Read", ".env")).outcome,
            PermissionOutcome::Deny
        );

        let doc = store.document(RuleSource::ProjectSettings).await;
        assert_eq!(doc["alwaysDenyRules"]["Read"], json!(["Read(.env)"]));
        assert_eq!(doc["alwaysAllowRules"]["Bash"], json!(["Bash(git status)"]));
    }

    #[tokio::test]
    async fn test_subscribe_sees_changes() {
        let (engine, _store) = engine_with_store();
        let mut updates = engine.subscribe();

        let initial = updates.next().await.unwrap();
        assert!(initial.rules().is_empty());

        engine.set_mode(PermissionMode::AcceptEdits).await.unwrap();
        let next = updates.next().await.unwrap();
        assert_eq!(next.mode(), PermissionMode::AcceptEdits);
    }

    #[tokio::test]
    async fn test_shutdown_closes_queue() {
        let (engine, _store) = engine_with_store();
        engine
            .add_always_allow_rule(RuleSource::CliArg, "Grep", None)
            .await
            .unwrap();
        engine.shutdown().await;

        let err = engine.cycle_mode().await.unwrap_err();
        assert!(matches!(err, GuardError::EngineClosed));
        assert_eq!(
            engine.evaluate(&Invocation::new("Grep", "x")).outcome,
            PermissionOutcome::Allow
        );

        // A second shutdown is harmless
        engine.shutdown().await;
    }
}
