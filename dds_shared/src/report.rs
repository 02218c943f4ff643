//! Report Module
//!
//! End-of-run output: the boxed summary for humans and a JSON document
//! for `--json`.

use crate::batch::{RunStatus, RunSummary};
use crate::progress::format_duration;
use console::style;
use serde::Serialize;

pub fn print_summary_report(summary: &RunSummary, status: RunStatus, operation_name: &str) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  📊 {:<56} ║", format!("{} Summary Report", operation_name));
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  📁 Jobs Planned:       {:>10}                           ║", summary.total);
    println!("║  ✅ Succeeded:          {:>10}                           ║", summary.succeeded);
    println!("║  ❌ Failed:             {:>10}                           ║", summary.failed);
    println!("║  ⏭️  Skipped:            {:>10}                           ║", summary.skipped);
    if summary.cancelled > 0 {
        println!("║  ⛔ Cancelled:          {:>10}                           ║", summary.cancelled);
    }
    println!("║  📈 Success Rate:       {:>9.1}%                           ║", summary.success_rate());
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!(
        "║  ⏱️  Total Time:         {:>10}                           ║",
        format_duration(summary.elapsed)
    );
    if summary.total > 0 {
        let avg_time = summary.elapsed.as_secs_f64() / summary.total as f64;
        println!("║  ⏱️  Avg Time/Job:       {:>9.2}s                           ║", avg_time);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");

    let verdict = match status {
        RunStatus::Success => style("✅ SUCCESS").green().bold(),
        RunStatus::PartialSuccess => style("⚠️  PARTIAL SUCCESS").yellow().bold(),
        RunStatus::Failure => style("❌ FAILURE").red().bold(),
    };
    if summary.aborted {
        println!(
            "{} {}",
            verdict,
            style("(stopped early, remaining jobs were not started)").dim()
        );
    } else {
        println!("{}", verdict);
    }

    if !summary.errors.is_empty() {
        println!();
        println!("❌ Errors encountered:");
        println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for (path, error) in &summary.errors {
            println!("   {} → {}", path.display(), error);
        }
    }
}

/// Machine-readable result of a finished run.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub mode: &'a str,
    pub status: RunStatus,
    pub exit_code: i32,
    pub finished_at: String,
    pub summary: &'a RunSummary,
}

impl<'a> RunReport<'a> {
    pub fn new(mode: &'a str, status: RunStatus, summary: &'a RunSummary) -> Self {
        Self {
            mode,
            status,
            exit_code: status.exit_code(),
            finished_at: chrono::Local::now().to_rfc3339(),
            summary,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
