// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plain-line event printer; the TUI's little sibling.

use gf_core::Event;
use gf_engine::TaskResult;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Print every event as one line until the bus closes.
pub fn spawn_printer(mut rx: mpsc::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", render(&event));
        }
    })
}

fn render(event: &Event) -> String {
    match event {
        Event::TaskStarted { id, role, .. } => format!("[start]    {id} ({role})"),
        Event::TaskOutput { id, line, .. } => format!("[output]   {id}: {line}"),
        Event::TaskCompleted {
            id, duration_ms, ..
        } => format!("[done]     {id} ({duration_ms}ms)"),
        Event::TaskFailed { id, error, .. } => format!("[failed]   {id}: {error}"),
        Event::TaskMerged {
            id, merged: true, ..
        } => format!("[merged]   {id}"),
        Event::TaskMerged {
            id,
            conflict_files,
            ..
        } => format!("[conflict] {id}: {}", conflict_files.join(", ")),
        Event::DagProgress { counts, .. } => format!(
            "[progress] {}/{} done, {} running, {} failed, {} pending",
            counts.completed, counts.total, counts.running, counts.failed, counts.pending
        ),
    }
}

pub fn print_summary(results: &[TaskResult]) {
    let completed = results
        .iter()
        .filter(|r| r.error.is_none())
        .count();
    let failed = results.len() - completed;
    let conflicted: Vec<&TaskResult> = results
        .iter()
        .filter(|r| r.error.is_none() && !r.merged)
        .collect();

    println!("\n{completed} completed, {failed} failed");
    for result in conflicted {
        println!(
            "  branch task/{} kept unmerged (conflicts: {})",
            result.task_id,
            result.conflict_files.join(", ")
        );
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
