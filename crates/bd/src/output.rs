//! Output formatting and the CLI error type.

use std::io::{self, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use beads_daemon::RpcErrorInfo;

/// CLI-level error carrying the RPC error taxonomy, so exit codes follow
/// the kind contract (2 invalid, 3 policy, 4 unavailable, 5 integrity).
#[derive(Debug)]
pub struct CliError {
    info: RpcErrorInfo,
}

/// Result alias for command handlers.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub fn from_info(info: RpcErrorInfo) -> Self {
        Self { info }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            info: RpcErrorInfo::new("invalid", message),
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self {
            info: RpcErrorInfo::new("internal", e.to_string()),
        }
    }

    pub fn info(&self) -> &RpcErrorInfo {
        &self.info
    }

    pub fn exit_code(&self) -> i32 {
        self.info.exit_code()
    }
}

impl From<beads_daemon::DaemonError> for CliError {
    fn from(e: beads_daemon::DaemonError) -> Self {
        let kind = match &e {
            beads_daemon::DaemonError::Unavailable(_)
            | beads_daemon::DaemonError::AlreadyRunning(_) => "unavailable",
            beads_daemon::DaemonError::Storage(inner) => inner.kind(),
            _ => "internal",
        };
        Self {
            info: RpcErrorInfo::new(kind, e.to_string()),
        }
    }
}

impl From<beads_config::ConfigError> for CliError {
    fn from(e: beads_config::ConfigError) -> Self {
        Self {
            info: RpcErrorInfo::new("invalid", e.to_string()),
        }
    }
}

/// Prints a value as pretty JSON on stdout; broken pipes are ignored.
pub fn output_json<T: Serialize>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        let _ = writeln!(handle, "{json}");
    }
}

/// Prints a plain left-aligned table.
pub fn output_table(headers: &[&str], rows: &[Vec<String>]) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_line.join("  ").bold());

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
            .collect();
        println!("{}", line.join("  "));
    }
}

/// Colors a status for terminal output.
pub fn styled_status(status: &str) -> String {
    match status {
        "open" => status.green().to_string(),
        "in_progress" => status.yellow().to_string(),
        "blocked" => status.red().to_string(),
        "closed" => status.dimmed().to_string(),
        other => other.to_string(),
    }
}

/// Renders one issue JSON value as a compact line.
pub fn issue_line(issue: &serde_json::Value) -> String {
    let id = issue["id"].as_str().unwrap_or("?");
    let status = issue["status"].as_str().unwrap_or("open");
    let priority = issue["priority"].as_i64().unwrap_or(2);
    let issue_type = issue["issue_type"].as_str().unwrap_or("task");
    let title = issue["title"].as_str().unwrap_or("");
    let labels = issue["labels"]
        .as_array()
        .map(|l| {
            l.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default();
    let label_suffix = if labels.is_empty() {
        String::new()
    } else {
        format!(" [{labels}]")
    };
    format!(
        "{id}  P{priority} {issue_type:<8} {:<12} {title}{label_suffix}",
        styled_status(status)
    )
}
