// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mnemo dashboard` command implementation.
//!
//! Renders a compact status block over the data directory: tier sizes,
//! write-queue counters, and pending proactive actions. Colors are
//! disabled with `--plain` or when stdout is not a TTY.

use std::io::IsTerminal;

use mnemo_agent::Coordinator;
use mnemo_core::MnemoError;

/// Run the `mnemo dashboard` command.
pub async fn run_dashboard(coordinator: &Coordinator, plain: bool) -> Result<(), MnemoError> {
    let stats = coordinator.memory_stats().await?;
    let pending = coordinator.reflection().pending_count().await;
    let unfired = coordinator.reflection().unfired_count().await;
    let use_color = !plain && std::io::stdout().is_terminal();

    println!();
    println!("  mnemo dashboard");
    println!("  {}", "-".repeat(42));
    print_line(
        "Memories",
        &format!(
            "{} total ({} hot bytes, {} archive bytes)",
            stats.total_memories, stats.hot_size_bytes, stats.archive_size_bytes
        ),
        use_color,
    );
    print_line(
        "Writes",
        &format!(
            "{} total, peak queue {}, in flight {}",
            stats.write_queue.total_writes, stats.write_queue.queue_max, stats.write_queue.current_queue
        ),
        use_color,
    );
    print_line(
        "Actions",
        &format!("{pending} pending ({unfired} awaiting trigger)"),
        use_color,
    );
    print_line("Data dir", &coordinator.data_dir().display().to_string(), use_color);
    print_line("Updated", &stats.last_updated.to_rfc3339(), use_color);
    println!();
    Ok(())
}

fn print_line(label: &str, value: &str, use_color: bool) {
    if use_color {
        use colored::Colorize;
        println!("    {:<10} {}", label.bold(), value.green());
    } else {
        println!("    {label:<10} {value}");
    }
}
