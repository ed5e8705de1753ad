//! Legacy migration: convert deprecated `allowedTools` / `ignorePatterns` keys.
//!
//! This example demonstrates:
//! - `migrate_legacy_config` as a pure conversion with warnings
//! - `PermissionEngine::apply_legacy_config`, which shows the warnings through a
//!   `UiPrompt` and persists the result into project settings
//!
//! ## Run
//! ```sh
//! cargo run -p demos --example legacy_migration
//! ```

use claw_guard::prelude::*;
use serde_json::json;
use std::sync::Arc;

/// Prompt that prints notices to stderr
struct StderrPrompt;

impl UiPrompt for StderrPrompt {
    fn warn(&self, message: &str) {
        eprintln!("  warning: {}", message);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claw_guard=warn".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let legacy = json!({
        "allowedTools": ["Bash(git log:*)", "Read", "Read", 42],
        "ignorePatterns": ["secrets.env", "*.pem"],
        "additionalWorkingDirectories": ["/data/shared"]
    });

    // --- 1. Pure conversion ---
    println!("=== migrate_legacy_config ===\n");

    let result = migrate_legacy_config(&legacy);
    println!("Migrated document:\n{}\n", serde_json::to_string_pretty(&result.migrated)?);
    for warning in &result.warnings {
        println!("  - {}", warning);
    }

    // --- 2. Through the engine ---
    println!("\n=== apply_legacy_config ===\n");

    let store = Arc::new(InMemoryConfigStore::new());
    let engine = PermissionEngine::builder(EngineConfig::builder().working_directory("/work").build())
        .store(store.clone())
        .prompt(Arc::new(StderrPrompt))
        .spawn();

    engine.apply_legacy_config(legacy).await?;

    for (tool, argument) in [
        ("Bash", "git log:--oneline"),
        ("Read", "src/main.rs"),
        ("Read", "secrets.env"),
        ("Read", "/data/shared/report.csv"),
    ] {
        let decision = engine.evaluate(&Invocation::new(tool, argument));
        println!("  {}({}) → {}", tool, argument, decision.explanation());
    }

    println!(
        "\nPersisted projectSettings:\n{}",
        serde_json::to_string_pretty(&store.document(RuleSource::ProjectSettings).await)?
    );

    engine.shutdown().await;
    Ok(())
}
