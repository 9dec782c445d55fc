//! CLI rendering: table, JSON, CSV, and compact views of records, plus the
//! correlation result views and detection confidence bars.

use console::style;
use serde_json::{Value, json};

use crate::correlate::CorrelationResult;
use crate::record::{LogLevel, LogRecord};
use crate::security;

fn styled_level(level: LogLevel, width: usize) -> String {
    let padded = format!("{:<width$}", level.name());
    match level {
        LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical => {
            style(padded).red().bold().to_string()
        }
        LogLevel::Error => style(padded).red().to_string(),
        LogLevel::Warning => style(padded).yellow().to_string(),
        LogLevel::Notice => style(padded).blue().to_string(),
        LogLevel::Info => style(padded).green().to_string(),
        LogLevel::Debug | LogLevel::Trace => style(padded).dim().to_string(),
        LogLevel::Unknown => padded,
    }
}

fn source_label(record: &LogRecord) -> String {
    let mut label = match (&record.source.service, &record.source.file_path) {
        (Some(service), _) => service.clone(),
        (None, Some(path)) => path.rsplit('/').next().unwrap_or(path).to_string(),
        (None, None) => return "-".to_string(),
    };
    if let Some(line) = record.source.line_number {
        label.push_str(&format!(":{line}"));
    }
    label
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

pub fn render_table(records: &[LogRecord]) {
    println!(
        "{}",
        style(format!(
            "{:<19}  {:<9}  {:<20}  {}",
            "TIME", "LEVEL", "SOURCE", "MESSAGE"
        ))
        .bold()
        .magenta()
    );
    for record in records {
        let time = record.formatted_timestamp("%Y-%m-%d %H:%M:%S");
        let source = truncate(&source_label(record), 20);
        let message = truncate(&record.message, 200);
        println!(
            "{:<19}  {}  {:<20}  {}",
            style(time).dim(),
            styled_level(record.level, 9),
            source,
            message
        );
    }
    println!();
    println!("{}", style(format!("Total: {} entries", records.len())).dim());
}

pub fn render_json(records: &[LogRecord]) {
    let output: Vec<Value> = records.iter().map(|r| r.to_mapping()).collect();
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::warn!(error = %e, "failed to serialize records"),
    }
}

fn csv_quote(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn csv_cell(value: &str) -> String {
    csv_quote(&security::sanitize_csv_cell(value))
}

pub fn render_csv(records: &[LogRecord]) {
    println!("timestamp,level,message,source_file,line_number,service,format");
    for record in records {
        let cells = [
            record
                .timestamp
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default(),
            record.level.name().to_string(),
            record.message.clone(),
            record.source.file_path.clone().unwrap_or_default(),
            record
                .source
                .line_number
                .map(|n| n.to_string())
                .unwrap_or_default(),
            record.source.service.clone().unwrap_or_default(),
            record.format_detected.clone(),
        ];
        let row: Vec<String> = cells.iter().map(|c| csv_cell(c)).collect();
        println!("{}", row.join(","));
    }
}

pub fn render_compact(records: &[LogRecord]) {
    for record in records {
        println!("{}", compact_line(record));
    }
}

/// One-line rendering shared by the parse and stream commands.
pub fn compact_line(record: &LogRecord) -> String {
    let ts = match record.timestamp {
        Some(_) => record.formatted_timestamp("%H:%M:%S"),
        None => "--------".to_string(),
    };
    let level = &record.level.name()[..record.level.name().len().min(5)];
    let source = match &record.source.service {
        Some(service) => format!("[{service}] "),
        None => String::new(),
    };
    format!(
        "{} {} {}{}",
        style(ts).dim(),
        styled_level_short(record.level, level),
        source,
        record.message
    )
}

fn styled_level_short(level: LogLevel, text: &str) -> String {
    let padded = format!("{:<5}", text);
    match level {
        LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical => {
            style(padded).red().bold().to_string()
        }
        LogLevel::Error => style(padded).red().to_string(),
        LogLevel::Warning => style(padded).yellow().to_string(),
        LogLevel::Notice => style(padded).blue().to_string(),
        LogLevel::Info => style(padded).green().to_string(),
        LogLevel::Debug | LogLevel::Trace => style(padded).dim().to_string(),
        LogLevel::Unknown => padded,
    }
}

fn group_time_range(group: &crate::correlate::CorrelationGroup) -> String {
    match group.time_range {
        Some((start, end)) => format!(
            "{} - {}",
            start.format("%H:%M:%S"),
            end.format("%H:%M:%S")
        ),
        None => String::new(),
    }
}

pub fn render_correlation_table(result: &CorrelationResult) {
    println!(
        "{}",
        style(format!(
            "{:<30}  {:<16}  {:>7}  {:<24}  {}",
            "KEY", "TYPE", "ENTRIES", "SOURCES", "TIME RANGE"
        ))
        .bold()
        .magenta()
    );
    for group in result.groups.iter().take(50) {
        let sources: Vec<&str> = group
            .sources
            .iter()
            .take(3)
            .map(|s| s.rsplit('/').next().unwrap_or(s))
            .collect();
        println!(
            "{:<30}  {:<16}  {:>7}  {:<24}  {}",
            truncate(&group.correlation_key, 30),
            group.correlation_type,
            group.len(),
            truncate(&sources.join(", "), 24),
            group_time_range(group)
        );
    }
}

pub fn render_correlation_json(result: &CorrelationResult) {
    let groups: Vec<Value> = result
        .groups
        .iter()
        .map(|g| {
            json!({
                "id": g.id.to_string(),
                "correlation_key": &g.correlation_key,
                "correlation_type": &g.correlation_type,
                "entry_count": g.len(),
                "sources": g.sources.iter().collect::<Vec<_>>(),
                "time_range": g.time_range.map(|(start, end)| {
                    json!([start.to_rfc3339(), end.to_rfc3339()])
                }),
                "duration_ms": g.duration_ms(),
                "metadata": &g.metadata,
            })
        })
        .collect();
    let output = json!({
        "statistics": result.statistics,
        "groups": groups,
        "orphan_count": result.orphans.len(),
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => tracing::warn!(error = %e, "failed to serialize correlation result"),
    }
}

/// Visual confidence bar for detection output.
pub fn confidence_bar(confidence: f64, width: usize) -> String {
    let filled = (confidence.clamp(0.0, 1.0) * width as f64) as usize;
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(width - filled));
    if confidence >= 0.8 {
        style(bar).green().to_string()
    } else if confidence >= 0.5 {
        style(bar).yellow().to_string()
    } else {
        style(bar).red().to_string()
    }
}
