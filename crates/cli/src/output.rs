//! Output formatting utilities

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use hostwatch_lib::AnomalyLabel;
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

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
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

/// Print a section header
pub fn print_header(title: &str) {
    println!("{}", title.bold());
    println!("{}", "=".repeat(60));
}

/// Format a timestamp for tables
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format an optional percentage reading, `-` when absent
pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => "-".to_string(),
    }
}

/// Color an anomaly label
pub fn color_label(label: AnomalyLabel) -> String {
    match label {
        AnomalyLabel::Anomaly => "ANOMALY".red().bold().to_string(),
        AnomalyLabel::Normal => "normal".green().to_string(),
    }
}

/// Color the share of anomalies in a batch
pub fn color_anomaly_percent(percent: f64, contamination: Option<f64>) -> String {
    let formatted = format!("{:.2}%", percent);
    let expected = contamination.map(|c| c * 100.0).unwrap_or(5.0);
    if percent == 0.0 {
        formatted.green().to_string()
    } else if percent <= expected {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}
