//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a latency in milliseconds; replicas without traffic have none
pub fn format_latency(latency_ms: Option<u64>) -> String {
    match latency_ms {
        Some(ms) if ms >= 1000 => format!("{:.2}s", ms as f64 / 1000.0),
        Some(ms) => format!("{}ms", ms),
        None => "-".to_string(),
    }
}

/// Format a CPU request in millicores
pub fn format_cpu(millicores: u64) -> String {
    if millicores == 0 {
        "-".to_string()
    } else if millicores % 1000 == 0 {
        format!("{}", millicores / 1000)
    } else {
        format!("{}m", millicores)
    }
}

/// Render a cumulative threshold list as `replica<=threshold` pairs
pub fn format_thresholds<'a>(targets: impl IntoIterator<Item = (&'a str, u8)>) -> String {
    targets
        .into_iter()
        .map(|(replica, threshold)| format!("{}<={}", replica, threshold))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Share of traffic each target receives, from cumulative thresholds
pub fn shares(thresholds: &[u8]) -> Vec<u8> {
    let mut previous = 0;
    thresholds
        .iter()
        .map(|&t| {
            let share = t.saturating_sub(previous);
            previous = t;
            share
        })
        .collect()
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" => status.green().to_string(),
        "degraded" => status.yellow().to_string(),
        "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color CPU utilization: above one core is red, above half is yellow
pub fn color_cpu(percent: u32) -> String {
    let formatted = format!("{}%", percent);
    if percent > 100 {
        formatted.red().to_string()
    } else if percent > 50 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}
