use crate::constants::MAX_REPORT_NAME_LEN;
use crate::error::Result;
use serde::Serialize;
use std::fmt::Write;

const SUMMARY_LABEL: &str = "Summary screen time:";

/// One output line of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub time_ms: i64,
}

impl ReportRow {
    pub fn new(name: impl Into<String>, time_ms: i64) -> Self {
        Self {
            name: name.into(),
            time_ms,
        }
    }
}

/// Longest first (ties by name), cut to `limit` rows; 0 keeps all.
pub fn top_rows(mut rows: Vec<ReportRow>, limit: usize) -> Vec<ReportRow> {
    rows.sort_by(|a, b| b.time_ms.cmp(&a.time_ms).then_with(|| a.name.cmp(&b.name)));
    if limit > 0 {
        rows.truncate(limit);
    }
    rows
}

/// `1h 2m 3s`. Milliseconds only show below one hour.
pub fn format_duration(ms: i64) -> String {
    if ms <= 0 {
        return "0ms".to_string();
    }

    let millis = ms % 1000;
    let seconds = ms / 1000 % 60;
    let minutes = ms / 60_000 % 60;
    let hours = ms / 3_600_000;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if seconds > 0 {
        parts.push(format!("{seconds}s"));
    }
    if millis > 0 && hours == 0 {
        parts.push(format!("{millis}ms"));
    }

    if parts.is_empty() {
        "0ms".to_string()
    } else {
        parts.join(" ")
    }
}

/// Single-line name of at most `MAX_REPORT_NAME_LEN` characters (plus `...`).
pub fn truncate_name(name: &str) -> String {
    let line: String = name.chars().filter(|c| !matches!(c, '\n' | '\r')).collect();
    if line.chars().count() <= MAX_REPORT_NAME_LEN {
        return line;
    }

    let mut truncated: String = line.chars().take(MAX_REPORT_NAME_LEN).collect();
    truncated.push_str("...");
    truncated
}

/// Plain-text table: header, one aligned row per entry, then the total of
/// the rows shown.
pub fn render_text(header: &str, rows: &[ReportRow]) -> String {
    let names: Vec<String> = rows.iter().map(|row| truncate_name(&row.name)).collect();
    let width = names
        .iter()
        .map(|name| name.chars().count())
        .chain(std::iter::once(SUMMARY_LABEL.len()))
        .max()
        .unwrap_or(0);
    let total: i64 = rows.iter().map(|row| row.time_ms).sum();

    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "{header}\n");
    for (name, row) in names.iter().zip(rows) {
        let _ = writeln!(out, "{name:<width$}   {}", format_duration(row.time_ms));
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{SUMMARY_LABEL:<width$}   {}", format_duration(total));
    out
}

pub fn render_json(rows: &[ReportRow]) -> Result<String> {
    Ok(serde_json::to_string(rows)?)
}
