//! Persistence collaborator for per-source settings documents.
//!
//! The engine never touches files itself. Hosts implement [`ConfigStore`] over
//! whatever backs their settings (JSON files, a database, a remote service);
//! [`InMemoryConfigStore`] is provided for tests and demos.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::error::GuardError;
use crate::source::RuleSource;

/// Loads and saves the raw settings document of each rule source.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use claw_guard::error::GuardError;
/// use claw_guard::source::RuleSource;
/// use claw_guard::store::ConfigStore;
/// use serde_json::{json, Value};
///
/// struct Readonly;
///
/// #[async_trait]
/// impl ConfigStore for Readonly {
///     async fn load(&self, source: RuleSource) -> Result<Value, GuardError> {
///         match source {
///             RuleSource::UserSettings => Ok(json!({ "alwaysAllowRules": { "Grep": ["Grep"] } })),
///             _ => Ok(Value::Null),
///         }
///     }
///
///     async fn save(&self, source: RuleSource, _patch: Value) -> Result<(), GuardError> {
///         Err(GuardError::Persist {
///             rule_source: source,
///             reason: "store is read-only".to_string(),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the raw document of one source.
    ///
    /// Return `Value::Null` when the source has no document yet.
    async fn load(&self, source: RuleSource) -> Result<Value, GuardError>;

    /// Persist a partial document for one source.
    ///
    /// The patch holds only the top-level keys that changed; every other key of
    /// the stored document must be preserved.
    async fn save(&self, source: RuleSource, patch: Value) -> Result<(), GuardError>;
}

/// A [`ConfigStore`] held entirely in memory.
///
/// `save` merges the patch's top-level keys into the stored document.
///
/// # Example
///
/// ```
/// use claw_guard::source::RuleSource;
/// use claw_guard::store::{ConfigStore, InMemoryConfigStore};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryConfigStore::new()
///     .with_document(RuleSource::ProjectSettings, json!({ "mode": "plan" }));
///
/// store
///     .save(RuleSource::ProjectSettings, json!({ "alwaysDenyRules": { "Bash": ["Bash(rm *)"] } }))
///     .await?;
///
/// let doc = store.load(RuleSource::ProjectSettings).await?;
/// assert_eq!(doc["mode"], "plan");
/// assert_eq!(doc["alwaysDenyRules"]["Bash"][0], "Bash(rm *)");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    documents: Mutex<HashMap<RuleSource, Value>>,
}

impl InMemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the document of one source
    pub fn with_document(mut self, source: RuleSource, document: Value) -> Self {
        self.documents.get_mut().insert(source, document);
        self
    }

    /// Current stored document of a source (`Value::Null` when absent)
    pub async fn document(&self, source: RuleSource) -> Value {
        self.documents
            .lock()
            .await
            .get(&source)
            .cloned()
            .unwrap_or(Value::Null)
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self, source: RuleSource) -> Result<Value, GuardError> {
        Ok(self.document(source).await)
    }

    async fn save(&self, source: RuleSource, patch: Value) -> Result<(), GuardError> {
        let Value::Object(patch) = patch else {
            return Err(GuardError::Persist {
                rule_source: source,
                reason: "patch must be a JSON object".to_string(),
            });
        };

        let mut documents = self.documents.lock().await;
        let document = documents
            .entry(source)
            .or_insert_with(|| Value::Object(Map::new()));
        if !document.is_object() {
            *document = Value::Object(Map::new());
        }
        if let Value::Object(existing) = document {
            existing.extend(patch);
        }
        tracing::trace!(source = %source, "Saved settings patch");
        Ok(())
    }
}
