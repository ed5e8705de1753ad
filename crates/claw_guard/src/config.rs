//! Engine configuration.
//!
//! Two layers live here:
//!
//! - [`SettingsDocument`]: the persisted JSON document of one rule source
//!   (`mode`, `additionalWorkingDirectories`, `alwaysAllowRules`, `alwaysDenyRules`)
//! - [`EngineConfig`]: an immutable snapshot combining every source, the active
//!   mode and the working-directory scope, with its rules already aggregated
//!
//! Snapshots are never mutated in place. The `with_*` methods return a new
//! snapshot (or `None` when the change would be a no-op), which is what lets the
//! engine publish them behind an `Arc` while evaluations are in flight.
//!
//! # Loading
//!
//! ```
//! use claw_guard::classify::BuiltinToolClassifier;
//! use claw_guard::config::EngineConfig;
//! use claw_guard::prompt::TracingPrompt;
//! use claw_guard::source::RuleSource;
//! use claw_guard::store::InMemoryConfigStore;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let store = InMemoryConfigStore::new().with_document(
//!     RuleSource::ProjectSettings,
//!     json!({ "mode": "acceptEdits", "alwaysDenyRules": { "Bash": ["Bash(rm -rf *)"] } }),
//! );
//!
//! let (config, report) = EngineConfig::builder()
//!     .working_directory("/work/project")
//!     .builtin_rules(BuiltinToolClassifier::new().builtin_allow_rules())
//!     .load(&store, &TracingPrompt)
//!     .await;
//!
//! assert!(report.is_clean());
//! assert_eq!(config.mode().as_str(), "acceptEdits");
//! assert_eq!(config.rules().deny_rules().len(), 1);
//! # }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::aggregate::RuleSet;
use crate::error::GuardError;
use crate::mode::{ModeController, PermissionMode};
use crate::prompt::UiPrompt;
use crate::rules::{RuleBehavior, RuleValue};
use crate::scope::WorkingDirectoryScope;
use crate::source::{RuleSource, SourceRules};
use crate::store::ConfigStore;

/// The persisted settings document of one rule source.
///
/// Unknown keys are ignored and `null` values read as empty, so documents written
/// by newer or older hosts still load.
///
/// # Example
///
/// ```
/// use claw_guard::config::SettingsDocument;
/// use serde_json::json;
///
/// let doc = SettingsDocument::from_value(json!({
///     "mode": "plan",
///     "alwaysAllowRules": { "Bash": ["git diff:*"] },
///     "theme": "dark"
/// }))
/// .unwrap();
/// assert_eq!(doc.always_allow_rules["Bash"], vec!["git diff:*".to_string()]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDocument {
    /// Permission mode this source selects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<PermissionMode>,

    /// Extra directories filesystem tools may touch
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub additional_working_directories: Vec<PathBuf>,

    /// Tool name → raw allow rule strings
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub always_allow_rules: BTreeMap<String, Vec<String>>,

    /// Tool name → raw deny rule strings
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub always_deny_rules: BTreeMap<String, Vec<String>>,

    /// Legacy untagged allow list; only read from project settings
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_tools: Vec<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl SettingsDocument {
    /// Decode a raw document; `null` is an empty document
    pub fn from_value(value: Value) -> Result<Self, GuardError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Encode as JSON, omitting empty fields
    pub fn to_value(&self) -> Result<Value, GuardError> {
        Ok(serde_json::to_value(self)?)
    }

    /// The allow and deny maps as a [`SourceRules`]
    pub fn rules(&self) -> SourceRules {
        SourceRules {
            allow: self.always_allow_rules.clone(),
            deny: self.always_deny_rules.clone(),
        }
    }

    /// Replace the allow and deny maps
    pub fn set_rules(&mut self, rules: SourceRules) {
        self.always_allow_rules = rules.allow;
        self.always_deny_rules = rules.deny;
    }
}

/// Outcome of [`EngineConfigBuilder::load`]
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Sources that loaded and decoded successfully
    pub loaded: Vec<RuleSource>,
    /// One [`GuardError::ConfigLoad`] per source that fell back to empty
    pub errors: Vec<GuardError>,
}

impl LoadReport {
    /// True when every source loaded
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// An immutable snapshot of everything evaluation needs.
///
/// # Example
///
/// ```
/// use claw_guard::config::EngineConfig;
/// use claw_guard::mode::PermissionMode;
/// use claw_guard::rules::RuleBehavior;
/// use claw_guard::source::RuleSource;
///
/// let config = EngineConfig::builder()
///     .mode(PermissionMode::Plan)
///     .rule(RuleSource::LocalSettings, RuleBehavior::Allow, "Bash(npm test)")
///     .build();
///
/// let next = config
///     .with_rule(RuleSource::LocalSettings, RuleBehavior::Allow, "Bash(npm run lint)")
///     .unwrap();
/// assert_eq!(config.rules().allow_rules().len(), 1);
/// assert_eq!(next.rules().allow_rules().len(), 2);
///
/// // Adding the same string again is a no-op
/// assert!(next
///     .with_rule(RuleSource::LocalSettings, RuleBehavior::Allow, "Bash(npm run lint)")
///     .is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    modes: ModeController,
    scope: WorkingDirectoryScope,
    directories: BTreeMap<RuleSource, BTreeSet<PathBuf>>,
    sources: BTreeMap<RuleSource, SourceRules>,
    project_allowed_tools: Vec<String>,
    builtin: Vec<RuleValue>,
    rules: RuleSet,
}

impl EngineConfig {
    /// Create a new builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// The active permission mode
    pub fn mode(&self) -> PermissionMode {
        self.modes.current()
    }

    /// The mode controller, including whether bypass is available
    pub fn mode_controller(&self) -> &ModeController {
        &self.modes
    }

    /// The working-directory scope
    pub fn scope(&self) -> &WorkingDirectoryScope {
        &self.scope
    }

    /// Aggregated rules of this snapshot
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Raw rules of one source
    pub fn source_rules(&self, source: RuleSource) -> Option<&SourceRules> {
        self.sources.get(&source)
    }

    /// Additional working directories contributed by one source
    pub fn source_directories(&self, source: RuleSource) -> Vec<PathBuf> {
        self.directories
            .get(&source)
            .map(|dirs| dirs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Legacy ProjectSettings `allowedTools` entries
    pub fn project_allowed_tools(&self) -> &[String] {
        &self.project_allowed_tools
    }

    /// Built-in default allow rules
    pub fn builtin_rules(&self) -> &[RuleValue] {
        &self.builtin
    }

    /// Snapshot with one more raw rule string; `None` if already stored
    pub fn with_rule(&self, source: RuleSource, behavior: RuleBehavior, raw: &str) -> Option<Self> {
        let mut next = self.clone();
        if !next.sources.entry(source).or_default().insert(behavior, raw) {
            return None;
        }
        Some(next.reaggregate())
    }

    /// Snapshot without an exact raw rule string of one behavior; `None` if
    /// nothing matched.
    ///
    /// Removing an allow from ProjectSettings searches the legacy `allowedTools`
    /// list too.
    pub fn without_rule(&self, source: RuleSource, behavior: RuleBehavior, raw: &str) -> Option<Self> {
        let mut next = self.clone();
        let mut removed = next
            .sources
            .get_mut(&source)
            .is_some_and(|rules| rules.remove(behavior, raw));
        if source == RuleSource::ProjectSettings && behavior == RuleBehavior::Allow {
            let before = next.project_allowed_tools.len();
            next.project_allowed_tools.retain(|existing| existing != raw);
            removed |= next.project_allowed_tools.len() != before;
        }
        removed.then(|| next.reaggregate())
    }

    /// Snapshot in a different mode; `None` if the mode switch refuses it
    pub fn with_mode(&self, mode: PermissionMode) -> Option<Self> {
        let mut next = self.clone();
        next.modes.set(mode).then_some(next)
    }

    /// Snapshot advanced to the next mode in cycle order
    pub fn with_cycled_mode(&self) -> Self {
        let mut next = self.clone();
        next.modes.cycle();
        next
    }

    /// Snapshot with one more additional working directory for a source.
    ///
    /// Returns `None` if the source already lists the directory.
    pub fn with_working_directory(&self, source: RuleSource, dir: impl AsRef<Path>) -> Option<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut next = self.clone();
        if !next.directories.entry(source).or_default().insert(dir.clone()) {
            return None;
        }
        next.scope.insert(dir);
        Some(next)
    }

    /// Snapshot with a settings document merged into one source.
    ///
    /// Rules and directories are merged without duplicates. A mode in the document
    /// is applied if the mode switch accepts it.
    pub fn with_settings(&self, source: RuleSource, document: &SettingsDocument) -> Self {
        let mut next = self.clone();
        next.sources.entry(source).or_default().merge(&document.rules());
        for dir in &document.additional_working_directories {
            next.directories.entry(source).or_default().insert(dir.clone());
            next.scope.insert(dir.clone());
        }
        if source == RuleSource::ProjectSettings {
            for raw in &document.allowed_tools {
                if !next.project_allowed_tools.contains(raw) {
                    next.project_allowed_tools.push(raw.clone());
                }
            }
        }
        if let Some(mode) = document.mode {
            next.modes.set(mode);
        }
        next.reaggregate()
    }

    fn reaggregate(mut self) -> Self {
        self.rules = RuleSet::aggregate(&self.sources, &self.project_allowed_tools, &self.builtin);
        self
    }
}

/// Builder for [`EngineConfig`].
///
/// `build` produces a config from the builder alone; `load` first reads every
/// source from a [`ConfigStore`] and merges it in.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    mode: Option<PermissionMode>,
    bypass_available: bool,
    primary: Option<PathBuf>,
    directories: BTreeMap<RuleSource, BTreeSet<PathBuf>>,
    sources: BTreeMap<RuleSource, SourceRules>,
    project_allowed_tools: Vec<String>,
    builtin: Vec<RuleValue>,
}

impl EngineConfigBuilder {
    /// Set the initial mode, overriding any mode found in the sources
    pub fn mode(mut self, mode: PermissionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Make `BypassPermissions` selectable for this session
    pub fn bypass_available(mut self, available: bool) -> Self {
        self.bypass_available = available;
        self
    }

    /// Set the primary working directory.
    ///
    /// Pass an absolute path: [`LexicalPathResolver`](crate::scope::LexicalPathResolver)
    /// treats a relative directory as containing nothing.
    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.primary = Some(dir.into());
        self
    }

    /// Add a session-only working directory (recorded under `CliArg`)
    pub fn additional_directory(self, dir: impl Into<PathBuf>) -> Self {
        self.source_directory(RuleSource::CliArg, dir)
    }

    /// Add a working directory contributed by a specific source
    pub fn source_directory(mut self, source: RuleSource, dir: impl Into<PathBuf>) -> Self {
        self.directories.entry(source).or_default().insert(dir.into());
        self
    }

    /// Add one raw rule string to a source
    pub fn rule(mut self, source: RuleSource, behavior: RuleBehavior, raw: &str) -> Self {
        self.sources.entry(source).or_default().insert(behavior, raw);
        self
    }

    /// Merge a whole rule set into a source
    pub fn source_rules(mut self, source: RuleSource, rules: &SourceRules) -> Self {
        self.sources.entry(source).or_default().merge(rules);
        self
    }

    /// Add `--allowedTools` / `--disallowedTools` values as `CliArg` rules
    pub fn cli_args(self, allowed: &[String], disallowed: &[String]) -> Self {
        let rules = SourceRules::from_cli_args(allowed, disallowed);
        self.source_rules(RuleSource::CliArg, &rules)
    }

    /// Set the legacy ProjectSettings `allowedTools` list
    pub fn allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.project_allowed_tools = tools;
        self
    }

    /// Set the built-in default allow rules from the host's tool registry
    pub fn builtin_rules(mut self, rules: Vec<RuleValue>) -> Self {
        self.builtin = rules;
        self
    }

    /// Build the config from the builder alone
    pub fn build(self) -> EngineConfig {
        let mode = self.mode.unwrap_or_default();
        let modes = ModeController::new(mode)
            .with_bypass_available(self.bypass_available || mode == PermissionMode::BypassPermissions);

        let mut scope = match self.primary {
            Some(primary) => WorkingDirectoryScope::new(primary),
            None => WorkingDirectoryScope::unrooted(),
        };
        for dir in self.directories.values().flatten() {
            scope.insert(dir.clone());
        }

        EngineConfig {
            modes,
            scope,
            directories: self.directories,
            sources: self.sources,
            project_allowed_tools: self.project_allowed_tools,
            builtin: self.builtin,
            rules: RuleSet::default(),
        }
        .reaggregate()
    }

    /// Load every source from a store, then build.
    ///
    /// A source that fails to load or decode contributes nothing: no rules, no
    /// directories and no mode. Each failure is logged, shown through `prompt`
    /// and recorded in the returned [`LoadReport`]; loading itself never fails.
    ///
    /// The mode is the builder's explicit mode if set, else the first source in
    /// fixed order whose document sets one.
    pub async fn load(
        mut self,
        store: &dyn ConfigStore,
        prompt: &dyn UiPrompt,
    ) -> (EngineConfig, LoadReport) {
        let mut report = LoadReport::default();
        let mut loaded_mode = None;

        for source in RuleSource::ALL {
            let document = match store.load(source).await.and_then(SettingsDocument::from_value) {
                Ok(document) => document,
                Err(err) => {
                    let err = match err {
                        err @ GuardError::ConfigLoad { .. } => err,
                        other => GuardError::ConfigLoad {
                            rule_source: source,
                            reason: other.to_string(),
                        },
                    };
                    tracing::warn!(source = %source, error = %err, "Source failed to load, using empty rules");
                    prompt.warn(&err.to_string());
                    report.errors.push(err);
                    continue;
                }
            };

            if loaded_mode.is_none() {
                loaded_mode = document.mode;
            }
            self.sources.entry(source).or_default().merge(&document.rules());
            self.directories
                .entry(source)
                .or_default()
                .extend(document.additional_working_directories);

            if source == RuleSource::ProjectSettings {
                for raw in document.allowed_tools {
                    if !self.project_allowed_tools.contains(&raw) {
                        self.project_allowed_tools.push(raw);
                    }
                }
            } else if !document.allowed_tools.is_empty() {
                tracing::debug!(source = %source, "Ignoring allowedTools outside projectSettings");
            }

            report.loaded.push(source);
        }

        if self.mode.is_none() {
            self.mode = loaded_mode;
        }
        let config = self.build();
        tracing::debug!(
            mode = %config.mode(),
            loaded = report.loaded.len(),
            failed = report.errors.len(),
            "Loaded permission config"
        );
        (config, report)
    }
}
