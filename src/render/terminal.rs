use std::collections::BTreeMap;
use console::style;

use crate::models::{HistoryEntry, TaskStatus};
use crate::pipeline::{DisplayMessage, MessageKind};
use crate::stores::{AnalysisState, LedgerTotals};
use crate::stores::cost::ModelUsage;
use crate::transport::ConnectionState;
use crate::utils::formatting::{format_cost, format_duration, format_tokens, truncate_chars};

const SUMMARY_WIDTH: usize = 48;

/// Render one pipeline line as styled terminal output.
pub fn render_message(message: &DisplayMessage) -> String {
    let time = style(&message.time).dim();
    match message.kind {
        MessageKind::Agent => {
            let agent = message.agent.as_deref().unwrap_or("agent");
            format!(
                "{} {} {}",
                time,
                style(format!("[{}]", agent)).cyan().bold(),
                message.content,
            )
        }
        MessageKind::Tool => {
            let agent = message
                .agent
                .as_deref()
                .map(|a| format!("{} ", style(a).dim()))
                .unwrap_or_default();
            format!(
                "{}   {} {}{}",
                time,
                style("⚙").yellow(),
                agent,
                style(&message.content).yellow(),
            )
        }
        MessageKind::System => {
            format!("{} {} {}", time, style("•").blue(), style(&message.content).blue())
        }
        MessageKind::Error => {
            format!(
                "{} {} {}",
                time,
                style("✗").red().bold(),
                style(&message.content).red(),
            )
        }
    }
}

pub fn render_connection(state: ConnectionState, url: &str) -> String {
    match state {
        ConnectionState::Connecting => format!("{} Connecting to {}", style("…").dim(), style(url).dim()),
        ConnectionState::Connected => format!("{} Connected to {}", style("●").green(), style(url).white()),
        ConnectionState::Disconnected => format!("{} Disconnected, will retry", style("●").yellow()),
        ConnectionState::Closed => format!("{} Connection closed", style("●").red()),
    }
}

/// Render the end-of-run summary.
pub fn render_summary(state: &AnalysisState, totals: &LedgerTotals) -> String {
    let headline = match state.status {
        TaskStatus::Completed => style("✓ Analysis complete:").green().bold(),
        TaskStatus::Failed => style("✗ Analysis failed:").red().bold(),
        TaskStatus::Cancelled => style("■ Analysis cancelled:").yellow().bold(),
        TaskStatus::Pending | TaskStatus::Running => style("… Analysis stopped:").dim(),
    };
    let elapsed = state
        .finished_at
        .map(|f| (f - state.started_at).num_milliseconds().max(0) as u64)
        .unwrap_or(0);

    let mut out = format!(
        "\n{} {} | {} tokens | {} | {}\n",
        headline,
        style(&state.symbol).white().bold(),
        format_tokens(totals.total_tokens()),
        format_cost(totals.cost_usd),
        format_duration(elapsed),
    );
    if let Some(summary) = &state.summary {
        out.push_str(&format!("  {} {}\n", style("Decision:").dim(), style(summary).white().bold()));
    }
    if let Some(error) = &state.error {
        out.push_str(&format!("  {} {}\n", style("Error:").dim(), style(error).red()));
    }
    out
}

/// Render a history listing as an aligned table.
pub fn render_history_table(entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return format!("  {}\n", style("No analyses recorded yet.").dim());
    }
    let mut out = String::new();
    out.push_str(&format!(
        "\n  {:<38} {:<8} {:<10} {:>9} {:>9}  {}\n",
        style("ID").dim(),
        style("SYMBOL").dim(),
        style("STATUS").dim(),
        style("TOKENS").dim(),
        style("COST").dim(),
        style("STARTED").dim(),
    ));
    for entry in entries {
        out.push_str(&format!(
            "  {:<38} {:<8} {:<10} {:>9} {:>9}  {}\n",
            entry.analysis_id,
            style(&entry.symbol).white().bold(),
            render_status(entry.status),
            format_tokens(entry.total_tokens),
            format_cost(entry.total_cost_usd),
            entry.started_at.format("%Y-%m-%d %H:%M"),
        ));
    }
    out
}

pub fn render_history_detail(entry: &HistoryEntry, usage: &BTreeMap<String, ModelUsage>) -> String {
    let mut out = format!(
        "\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {}\n",
        style("Analysis:").dim(),
        style(&entry.analysis_id).cyan(),
        style("Symbol:").dim(),
        style(&entry.symbol).white().bold(),
        style("Status:").dim(),
        render_status(entry.status),
        style("Duration:").dim(),
        entry.duration_ms().map(format_duration).unwrap_or_else(|| "-".into()),
        style("Agents:").dim(),
        entry.agents.join(", "),
    );
    if let Some(summary) = &entry.summary {
        out.push_str(&format!(
            "  {} {}\n",
            style("Decision:").dim(),
            truncate_chars(summary, SUMMARY_WIDTH * 4),
        ));
    }
    if let Some(error) = &entry.error {
        out.push_str(&format!("  {} {}\n", style("Error:").dim(), style(error).red()));
    }
    if !usage.is_empty() {
        out.push_str(&format!("\n  {}\n", style("Usage by model:").white().bold()));
        for (model, u) in usage {
            out.push_str(&format!(
                "    {:<24} {:>4} calls {:>9} tokens {:>9}\n",
                model,
                u.calls,
                format_tokens(u.prompt_tokens + u.completion_tokens),
                format_cost(u.cost_usd),
            ));
        }
    }
    out
}

fn render_status(status: TaskStatus) -> String {
    match status {
        TaskStatus::Completed => style(status.as_str()).green().to_string(),
        TaskStatus::Failed => style(status.as_str()).red().to_string(),
        TaskStatus::Cancelled => style(status.as_str()).yellow().to_string(),
        TaskStatus::Pending | TaskStatus::Running => style(status.as_str()).white().to_string(),
    }
}

/// Render the version info.
pub fn render_version() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let git_hash = option_env!("GIT_HASH").unwrap_or("dev");
    let build_ts = option_env!("BUILD_TIMESTAMP").unwrap_or("unknown");

    format!(
        "marketdesk {} ({}, built {})",
        style(version).white().bold(),
        git_hash,
        build_ts,
    )
}

pub fn render_error(msg: &str) -> String {
    format!("{} {}", style("✗").red(), style(msg).red())
}

pub fn render_success(msg: &str) -> String {
    format!("{} {}", style("✓").green(), msg)
}
