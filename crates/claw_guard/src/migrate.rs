//! Conversion of deprecated flat settings keys.
//!
//! Older hosts wrote two flat lists that are now expressed as rules:
//!
//! | Legacy key       | Becomes                                       |
//! |------------------|-----------------------------------------------|
//! | `allowedTools`   | `alwaysAllowRules` entries keyed by tool name |
//! | `ignorePatterns` | `alwaysDenyRules` entries `Read(<pattern>)`   |
//!
//! Migration never fails. Anything it cannot use is skipped and reported in
//! [`MigrationResult::warnings`], alongside one deprecation notice per legacy key
//! showing the equivalent new-format JSON.

use serde_json::{json, Map, Value};

use crate::config::SettingsDocument;
use crate::rules::{RuleBehavior, RuleValue};
use crate::source::SourceRules;

const ALLOWED_TOOLS: &str = "allowedTools";
const IGNORE_PATTERNS: &str = "ignorePatterns";

/// Output of [`migrate_legacy_config`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationResult {
    /// The settings document in the current format
    pub migrated: SettingsDocument,
    /// Deprecation notices and skipped-entry warnings, in the order produced
    pub warnings: Vec<String>,
}

impl MigrationResult {
    /// True when the input used no legacy keys and nothing was skipped
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Convert a legacy settings object to the current format.
///
/// Keys other than the legacy ones pass through, and migrated entries merge into
/// any rules already present.
///
/// # Example
///
/// ```
/// use claw_guard::migrate::migrate_legacy_config;
/// use serde_json::json;
///
/// let result = migrate_legacy_config(&json!({
///     "allowedTools": ["Bash", "Read"],
///     "ignorePatterns": ["secrets.env"]
/// }));
///
/// let doc = result.migrated;
/// assert_eq!(doc.always_allow_rules.len(), 2);
/// assert_eq!(doc.always_deny_rules["Read"], vec!["Read(secrets.env)".to_string()]);
/// assert_eq!(result.warnings.len(), 2);
/// ```
pub fn migrate_legacy_config(legacy: &Value) -> MigrationResult {
    let mut warnings = Vec::new();

    let object = match legacy {
        Value::Object(object) => object.clone(),
        Value::Null => Map::new(),
        other => {
            warnings.push(format!(
                "Ignoring legacy config: expected a JSON object, found {}",
                kind(other)
            ));
            Map::new()
        }
    };

    let mut rest = object.clone();
    rest.remove(ALLOWED_TOOLS);
    rest.remove(IGNORE_PATTERNS);
    let mut migrated = match SettingsDocument::from_value(Value::Object(rest)) {
        Ok(document) => document,
        Err(err) => {
            warnings.push(format!("Ignoring unreadable settings keys: {}", err));
            SettingsDocument::default()
        }
    };

    let mut rules = migrated.rules();

    if let Some(value) = object.get(ALLOWED_TOOLS) {
        let mut converted = SourceRules::new();
        for raw in string_items(ALLOWED_TOOLS, value, &mut warnings) {
            converted.insert(RuleBehavior::Allow, &raw);
        }
        if !converted.is_empty() {
            warnings.push(deprecation(
                ALLOWED_TOOLS,
                json!({ "alwaysAllowRules": converted.allow }),
            ));
            rules.merge(&converted);
        }
    }

    if let Some(value) = object.get(IGNORE_PATTERNS) {
        let mut converted = SourceRules::new();
        for pattern in string_items(IGNORE_PATTERNS, value, &mut warnings) {
            let raw = RuleValue::new("Read", Some(pattern)).to_string();
            converted.insert(RuleBehavior::Deny, &raw);
        }
        if !converted.is_empty() {
            warnings.push(deprecation(
                IGNORE_PATTERNS,
                json!({ "alwaysDenyRules": converted.deny }),
            ));
            rules.merge(&converted);
        }
    }

    migrated.set_rules(rules);
    for warning in &warnings {
        tracing::debug!(warning = %warning, "Legacy config migration");
    }
    MigrationResult { migrated, warnings }
}

/// Non-empty string items of a legacy list, warning about everything else.
fn string_items(key: &str, value: &Value, warnings: &mut Vec<String>) -> Vec<String> {
    let Value::Array(items) = value else {
        warnings.push(format!(
            "Ignoring {}: expected a list of strings, found {}",
            key,
            kind(value)
        ));
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str().map(str::trim) {
            Some(s) if !s.is_empty() => out.push(s.to_string()),
            _ => warnings.push(format!("Skipping {} entry {}: not a non-empty string", key, item)),
        }
    }
    out
}

fn deprecation(key: &str, replacement: Value) -> String {
    format!("\"{}\" is deprecated; use {} instead", key, replacement)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
