//! Human-readable rendering of fleet events and reports

use std::fmt::Write as _;

use fleetcmd_core::{Classification, ExecutionResult, FleetEvent, FleetReport, HostStatus};

/// Console line(s) for an event, `None` for events that are only logged
#[must_use]
pub fn event_line(event: &FleetEvent) -> Option<String> {
    match event {
        FleetEvent::RunStarted { hosts } => Some(format!("Running on {hosts} host(s)")),
        FleetEvent::InventoryLineSkipped { line } => Some(format!("Skipping inventory {line}")),
        FleetEvent::HostClassified {
            host,
            os_family,
            os_name,
        } => Some(match os_name {
            Some(name) => format!("[{host}] detected {os_family} ({name})"),
            None => format!("[{host}] detected {os_family}"),
        }),
        FleetEvent::CommandFinished { result } => Some(command_block(result)),
        FleetEvent::HostFinished {
            host,
            status: HostStatus::Completed,
            ..
        } => Some(format!("[{host}] done")),
        FleetEvent::HostFinished {
            host,
            status,
            error,
        } => Some(match error {
            Some(error) => format!("[{host}] {status}: {error}"),
            None => format!("[{host}] {status}"),
        }),
        FleetEvent::RunFinished { cancelled: true } => Some("Run cancelled".to_string()),
        FleetEvent::HostStageChanged { .. } | FleetEvent::RunFinished { .. } => None,
    }
}

fn command_block(result: &ExecutionResult) -> String {
    let mut out = format!(
        "[{}] {} `{}`",
        result.host,
        label(result.classification),
        result.command
    );

    if let Some(status) = result.exit_status
        && status != 0
    {
        let _ = write!(out, " (exit {status})");
    }
    if let Some(error) = &result.error {
        let _ = write!(out, ": {error}");
    }

    push_indented(&mut out, &result.stdout);
    if result.classification != Classification::Ok {
        push_indented(&mut out, &result.stderr);
    }

    out
}

fn label(classification: Classification) -> &'static str {
    match classification {
        Classification::Ok => "ok",
        Classification::Warning => "warning",
        Classification::Error => "ERROR",
    }
}

fn push_indented(out: &mut String, text: &str) {
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        out.push_str("\n    ");
        out.push_str(line);
    }
}

/// Multi-line closing summary for a report
#[must_use]
pub fn summary(report: &FleetReport) -> String {
    let summary = report.summary();
    let mut out = String::from("\nSummary\n");

    for outcome in &report.outcomes {
        let _ = write!(out, "  {:<24} {}", outcome.host, outcome.status);
        if outcome.status.is_completed() {
            let errors = outcome.error_count();
            let _ = write!(out, " ({} command(s), {errors} error(s))", outcome.results.len());
        } else if let Some(error) = &outcome.error {
            let _ = write!(out, ": {error}");
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "\n{} host(s): {} completed, {} skipped, {} failed, {} cancelled",
        summary.total_hosts, summary.completed, summary.skipped, summary.failed, summary.cancelled
    );
    let _ = write!(
        out,
        "commands: {} ok, {} warning, {} error",
        summary.commands_ok, summary.commands_warning, summary.commands_error
    );
    if !report.skipped_lines.is_empty() {
        let _ = write!(
            out,
            "\n{} inventory line(s) skipped",
            report.skipped_lines.len()
        );
    }

    out
}
