//! `mcpscout status`: verify every configured server.

use super::{truncate, SourceArgs};
use mcpscout_mcp::{AggregateReport, ServerStatus};
use std::fmt::Write;

const DETAIL_WIDTH: usize = 60;

/// Handle the status command.
pub async fn handle_status(source: &SourceArgs, json: bool) -> anyhow::Result<()> {
    let cwd = source.cwd()?;
    let discovery = source.discovery()?;

    let report = discovery.servers_status(&cwd).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

/// Render the report as a table.
pub fn render_report(report: &AggregateReport) -> String {
    if report.is_empty() {
        return "No MCP servers configured.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<20} {:<16} {:<10} {}", "NAME", "TYPE", "STATUS", "DETAIL");
    let _ = writeln!(out, "{}", "-".repeat(72));

    for status in report {
        let kind = status.transport.map(|k| k.label()).unwrap_or("-");
        let _ = writeln!(
            out,
            "{:<20} {:<16} {:<10} {}",
            status.name,
            kind,
            status.status.as_str(),
            truncate(&detail(status), DETAIL_WIDTH)
        );
    }

    let _ = writeln!(
        out,
        "\n{} of {} connected",
        report.connected_count(),
        report.len()
    );
    out
}

fn detail(status: &ServerStatus) -> String {
    if let Some(error) = &status.error {
        return error.clone();
    }
    match &status.server_info {
        Some(info) => match &info.version {
            Some(version) => format!("{} {version}", info.name),
            None => info.name.clone(),
        },
        None => String::new(),
    }
}
