//! Tool permissions: decide Allow, Deny or Ask for agent tool calls.
//!
//! This example demonstrates the decision pipeline:
//! - Rules from several sources, with deny always beating allow
//! - Permission modes (`acceptEdits`, `plan`, `bypassPermissions`)
//! - Working-directory scope for file tools
//! - `PermissionHandler` on raw JSON tool input
//! - A custom `ToolClassifier` for host-specific tools
//!
//! ## Run
//! ```sh
//! cargo run -p demos --example tool_permissions
//! ```

use claw_guard::prelude::*;
use serde_json::json;
use std::sync::Arc;

/// Classifier that knows about one extra, read-only host tool.
struct HostClassifier {
    builtin: BuiltinToolClassifier,
}

impl ToolClassifier for HostClassifier {
    fn is_mutating(&self, tool_name: &str) -> bool {
        tool_name != "ListTickets" && self.builtin.is_mutating(tool_name)
    }

    fn is_file_edit(&self, tool_name: &str) -> bool {
        self.builtin.is_file_edit(tool_name)
    }

    fn is_filesystem(&self, tool_name: &str) -> bool {
        self.builtin.is_filesystem(tool_name)
    }
}

fn show(label: &str, decision: &PermissionDecision) {
    println!("  {:<42} → {}", label, decision.explanation());
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

    // --- 1. Layered rules ---
    println!("=== Layered Rules ===\n");

    let store = Arc::new(InMemoryConfigStore::new().with_document(
        RuleSource::ProjectSettings,
        json!({
            "alwaysAllowRules": { "Bash": ["git diff:*", "cargo test:*"] },
            "alwaysDenyRules": { "Bash": ["rm -rf *"] }
        }),
    ));
    let (config, report) = EngineConfig::builder()
        .working_directory("/work/app")
        .cli_args(&["Bash".to_string()], &["WebFetch".to_string()])
        .builtin_rules(BuiltinToolClassifier::new().builtin_allow_rules())
        .load(store.as_ref(), &TracingPrompt)
        .await;
    println!("Loaded {} sources, {} failures\n", report.loaded.len(), report.errors.len());

    let engine = PermissionEngine::new(config, store);
    for (tool, argument) in [
        ("Bash", "git diff:--stat"),
        ("Bash", "rm -rf /tmp/scratch"),
        ("Bash", "make release"),
        ("WebFetch", "https://example.com"),
        ("Grep", "TODO"),
        ("Write", "/work/app/notes.md"),
        ("Write", "/etc/hosts"),
    ] {
        let invocation = Invocation::new(tool, argument);
        show(&invocation.to_string(), &engine.evaluate(&invocation));
    }

    // --- 2. Modes ---
    println!("\n=== Modes ===\n");

    let edit = Invocation::new("Edit", "src/lib.rs");
    for mode in [PermissionMode::Default, PermissionMode::AcceptEdits, PermissionMode::Plan] {
        let snapshot = engine.set_mode(mode).await?;
        show(
            &format!("[{}] {}", snapshot.mode(), edit),
            &engine.evaluate(&edit),
        );
    }

    // Bypass was never made available, so the switch is refused
    let snapshot = engine.set_mode(PermissionMode::BypassPermissions).await?;
    println!("  bypassPermissions requested, mode is now {}", snapshot.mode());
    engine.set_mode(PermissionMode::Default).await?;

    // --- 3. Raw tool input ---
    println!("\n=== PermissionHandler ===\n");

    let handler: &dyn PermissionHandler = &engine;
    for (tool, input) in [
        ("Bash", json!({ "command": "cargo test:integration" })),
        ("Read", json!({ "file_path": "/home/me/.ssh/id_ed25519" })),
        ("WebSearch", json!({ "query": "tokio watch channel" })),
    ] {
        let decision = handler.check(tool, &input).await?;
        show(&format!("{} {}", tool, input), &decision);
    }

    // --- 4. Custom classifier ---
    println!("\n=== Custom ToolClassifier ===\n");

    let evaluator = PermissionEvaluator::new(
        Arc::new(HostClassifier {
            builtin: BuiltinToolClassifier::new(),
        }),
        Arc::new(LexicalPathResolver),
    );
    let plan = EngineConfig::builder().mode(PermissionMode::Plan).build();
    for tool in ["ListTickets", "CloseTicket"] {
        let invocation = Invocation::new(tool, "");
        show(&format!("[plan] {}", tool), &evaluator.evaluate(&invocation, &plan));
    }

    engine.shutdown().await;
    println!("\nDone.");
    Ok(())
}
