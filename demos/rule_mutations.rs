//! Rule mutations: grant, revoke and watch permissions at runtime.
//!
//! This example demonstrates:
//! - `add_always_allow_rule` / `add_always_deny_rule` / `remove_rule`
//! - What gets persisted per source (and what stays session-only)
//! - Subscribing to snapshot changes
//! - Error handling for unknown and read-only sources
//!
//! ## Run
//! ```sh
//! cargo run -p demos --example rule_mutations
//! ```

use claw_guard::prelude::*;
use std::sync::Arc;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claw_guard=debug".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let store = Arc::new(InMemoryConfigStore::new());
    let engine = PermissionEngine::new(EngineConfig::builder().build(), store.clone());

    // Print every published snapshot in the background
    let mut updates = engine.subscribe();
    let watcher = tokio::spawn(async move {
        while let Some(snapshot) = updates.next().await {
            println!(
                "  [snapshot] mode={} allow={} deny={}",
                snapshot.mode(),
                snapshot.rules().allow_rules().len(),
                snapshot.rules().deny_rules().len()
            );
        }
    });

    // --- 1. Grant and revoke ---
    println!("=== Grant and Revoke ===\n");

    let npm = Invocation::new("Bash", "npm install left-pad");
    println!("Before: {}", engine.evaluate(&npm).explanation());

    engine
        .add_always_allow_rule(RuleSource::LocalSettings, "Bash", Some("npm install *"))
        .await?;
    println!("After grant: {}", engine.evaluate(&npm).explanation());

    engine
        .remove_rule(RuleSource::LocalSettings, "Bash(npm install *)")
        .await?;
    println!("After revoke: {}", engine.evaluate(&npm).explanation());

    // --- 2. Persistence ---
    println!("\n=== Persistence ===\n");

    engine
        .add_always_deny_rule(RuleSource::UserSettings, "Bash", Some("curl * | sh"))
        .await?;
    engine
        .add_always_allow_rule(RuleSource::CliArg, "WebFetch", None)
        .await?;
    engine
        .add_working_directory(RuleSource::ProjectSettings, "/data/fixtures")
        .await?;

    for source in RuleSource::ALL {
        println!("  {:<16} {}", source, store.document(source).await);
    }

    // --- 3. Errors ---
    println!("\n=== Errors ===\n");

    match engine.add_always_allow_rule("teamSettings", "Bash", None).await {
        Err(err) => println!("  {}", err),
        Ok(_) => println!("  unexpectedly accepted"),
    }
    match engine
        .add_always_allow_rule(RuleSource::PolicySettings, "Bash", None)
        .await
    {
        Err(err) => println!("  {}", err),
        Ok(_) => println!("  unexpectedly accepted"),
    }

    engine.cycle_mode().await?;
    engine.shutdown().await;
    watcher.await?;

    println!("\nDone.");
    Ok(())
}
