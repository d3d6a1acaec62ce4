//! Human-readable per-iteration console summary

use crate::models::{MetricsSnapshot, PodDescriptor};
use colored::Colorize;
use std::fmt::Display;

/// Processes listed in the summary
pub const SUMMARY_PROCESSES: usize = 3;

/// Maximum characters of a command line shown in the summary
pub const COMMAND_WIDTH: usize = 50;

const NOT_AVAILABLE: &str = "N/A";

/// Render the summary lines printed after each collection
pub fn render_summary(pod: &PodDescriptor, snapshot: &MetricsSnapshot) -> Vec<String> {
    let mut lines = Vec::with_capacity(5 + SUMMARY_PROCESSES);

    lines.push(format!(
        "Monitoring pod {} in namespace {}",
        pod.name.cyan(),
        pod.namespace.cyan()
    ));

    lines.push(format!(
        "CPU: {}%, Load: {}",
        or_na(snapshot.cpu.usage_percent),
        or_na(snapshot.cpu.load_1min)
    ));

    lines.push(match &snapshot.memory {
        Some(m) => format!(
            "Memory: {}/{} MB ({})",
            m.used_mb,
            m.total_mb,
            color_percent(m.usage_percent, format!("{:.1}%", m.usage_percent))
        ),
        None => format!("Memory: {0}/{0} MB ({0})", NOT_AVAILABLE),
    });

    lines.push(match &snapshot.disk {
        Some(d) => format!(
            "Disk: {}/{} ({})",
            d.used,
            d.size,
            color_percent(d.usage_percent as f64, format!("{}%", d.usage_percent))
        ),
        None => format!("Disk: {0}/{0} ({0})", NOT_AVAILABLE),
    });

    lines.push(String::new());
    lines.push("Top processes:".bold().to_string());
    for process in snapshot.processes.iter().take(SUMMARY_PROCESSES) {
        lines.push(format!(
            "  {} ({}): CPU {}%, MEM {}% - {}...",
            process.pid,
            process.user,
            process.cpu_percent,
            process.memory_percent,
            truncate_chars(&process.command, COMMAND_WIDTH)
        ));
    }

    lines
}

/// Cut `s` to at most `width` characters without splitting a UTF-8 sequence
pub fn truncate_chars(s: &str, width: usize) -> &str {
    match s.char_indices().nth(width) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn or_na<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn color_percent(percent: f64, formatted: String) -> String {
    if percent >= 90.0 {
        formatted.red().to_string()
    } else if percent >= 75.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
