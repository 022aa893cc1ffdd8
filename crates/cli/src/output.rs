//! Human-readable rendering of run summaries and status reports

use console::style;
use elif_migrations::{MigrationDirection, RunSummary, StatusReport};
use std::fmt::Write;

/// Successes first, then failures, then a timing footer
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let verb = match (summary.direction, summary.dry_run) {
        (MigrationDirection::Up, false) => "Applied",
        (MigrationDirection::Up, true) => "Would apply",
        (MigrationDirection::Down, false) => "Rolled back",
        (MigrationDirection::Down, true) => "Would roll back",
    };

    if summary.dry_run {
        let _ = writeln!(out, "{}", style("Dry run: no changes were made").yellow().bold());
    }

    if summary.is_empty() {
        let message = match summary.direction {
            MigrationDirection::Up => "Nothing to migrate",
            MigrationDirection::Down => "Nothing to roll back",
        };
        let _ = writeln!(out, "{}", message);
    }

    for result in &summary.executed {
        if result.dry_run {
            let _ = writeln!(out, "  ⏳ {} {} - {}", verb, result.version, result.description);
        } else {
            let _ = writeln!(
                out,
                "  ✅ {} {} - {} ({} ms)",
                verb, result.version, result.description, result.execution_time_ms
            );
        }
    }

    for result in &summary.errors {
        let detail = result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  ❌ {} {} - {}: {}",
            style("Failed").red().bold(),
            result.version,
            result.description,
            detail
        );
    }

    let _ = writeln!(
        out,
        "\n{} succeeded, {} failed in {} ms",
        summary.executed.len(),
        summary.errors.len(),
        summary.total_time_ms
    );
    out
}

pub fn render_status(report: &StatusReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Migration Status:");
    let _ = writeln!(out, "================");

    if report.migrations.is_empty() {
        let _ = writeln!(out, "No migrations found");
    }

    for entry in &report.migrations {
        if entry.applied {
            let applied_at = entry
                .applied_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  ✅ {} {} (applied {})",
                entry.version, entry.description, applied_at
            );
        } else if report.out_of_order.contains(&entry.version) {
            let _ = writeln!(
                out,
                "  ⚠️  {} {} (older than current version, will not run)",
                entry.version, entry.description
            );
        } else {
            let _ = writeln!(out, "  ⏳ {} {}", entry.version, entry.description);
        }
    }

    for version in &report.orphaned {
        let _ = writeln!(
            out,
            "  ❓ {} (applied, but no migration file found)",
            version
        );
    }

    let _ = writeln!(
        out,
        "\nCurrent version: {}  Latest: {}",
        report.current_version, report.latest_version
    );
    let _ = writeln!(
        out,
        "{} total, {} applied, {} pending",
        report.total_migrations, report.applied_count, report.pending_count
    );
    out
}
