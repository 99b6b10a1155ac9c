// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mnemo list|search|stats|import-legacy` command implementations.

use std::path::Path;

use mnemo_agent::{Coordinator, ListArgs, SearchArgs};
use mnemo_core::{MnemoError, SearchScope};
use tracing::warn;

/// Shortest line that counts as a memory during legacy import.
const MIN_IMPORT_LINE_CHARS: usize = 5;

/// Run `mnemo list`.
pub async fn run_list(
    coordinator: &Coordinator,
    user_id: Option<String>,
    scope: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<(), MnemoError> {
    let memories = coordinator
        .memory_list(ListArgs {
            user_id,
            scope: scope.as_deref().map(SearchScope::from_str_value),
            limit,
        })
        .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&memories).unwrap_or_else(|_| "[]".to_string())
        );
        return Ok(());
    }

    if memories.is_empty() {
        println!("No memories stored.");
        return Ok(());
    }
    println!("{} memories:", memories.len());
    for memory in &memories {
        let scope_tag = memory
            .run_id
            .as_deref()
            .map(|run| format!("session {run}"))
            .unwrap_or_else(|| "long-term".to_string());
        println!("  {}  [{}] {}", memory.id, scope_tag, preview(&memory.text, 80));
    }
    Ok(())
}

/// Run `mnemo search <query>`.
pub async fn run_search(
    coordinator: &Coordinator,
    query: &str,
    limit: Option<usize>,
    deep: bool,
    json: bool,
) -> Result<(), MnemoError> {
    let output = coordinator
        .memory_search(SearchArgs {
            query: query.to_string(),
            limit,
            deep,
            ..Default::default()
        })
        .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output.results).unwrap_or_else(|_| "[]".to_string())
        );
    } else {
        println!("{}", output.text.trim_end());
    }
    Ok(())
}

/// Run `mnemo stats`.
pub async fn run_stats(coordinator: &Coordinator, json: bool) -> Result<(), MnemoError> {
    let stats = coordinator.memory_stats().await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        println!("{}", stats.render());
    }
    Ok(())
}

/// Run `mnemo import-legacy <file>`: one non-trivial line per memory,
/// each pushed through the ingest merge policy.
pub async fn run_import_legacy(coordinator: &Coordinator, file: &Path) -> Result<(), MnemoError> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| MnemoError::Internal(format!("cannot read {}: {e}", file.display())))?;

    let mut stored = 0usize;
    let mut skipped = 0usize;
    let mut failed = 0usize;
    for line in raw.lines() {
        let line = line.trim();
        if line.chars().count() < MIN_IMPORT_LINE_CHARS || line.starts_with('#') {
            skipped += 1;
            continue;
        }
        match coordinator
            .memory_store(mnemo_agent::StoreArgs {
                text: line.to_string(),
                ..Default::default()
            })
            .await
        {
            Ok(output) if output.stored_count > 0 => stored += 1,
            Ok(_) => skipped += 1, // duplicate
            Err(e) => {
                failed += 1;
                warn!(error = %e, line, "legacy import line failed");
            }
        }
    }

    println!("Imported {stored} memories ({skipped} skipped, {failed} failed).");
    if failed > 0 && stored == 0 {
        return Err(MnemoError::Internal(
            "legacy import failed for every line".to_string(),
        ));
    }
    Ok(())
}

/// First `max` characters with an ellipsis when clipped.
fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max).collect();
    format!("{clipped}…")
}
