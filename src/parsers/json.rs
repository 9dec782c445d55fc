//! JSON lines (JSONL/NDJSON) parser.
//!
//! Handles the field-naming conventions of the common structured logging
//! libraries: timestamps, levels, and messages are probed through alias
//! lists, correlation ids and source metadata are lifted from their
//! well-known names, and everything else lands in `extra`.

use serde_json::{Map, Value};

use crate::parser::{self, LogParser};
use crate::record::{CorrelationIds, LogLevel, LogRecord, SourceInfo};
use crate::security::{self, MAX_JSON_DEPTH};

pub const TIMESTAMP_FIELDS: &[&str] = &[
    "timestamp",
    "time",
    "@timestamp",
    "ts",
    "datetime",
    "created",
    "date",
    "logged_at",
    "log_time",
];

pub const LEVEL_FIELDS: &[&str] = &[
    "level",
    "severity",
    "loglevel",
    "log_level",
    "lvl",
    "levelname",
    "priority",
];

pub const MESSAGE_FIELDS: &[&str] = &[
    "message",
    "msg",
    "text",
    "log",
    "body",
    "content",
    "event",
    "description",
];

pub struct JsonParser;

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn get_field<'a>(data: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| data.get(*name))
}

fn get_string(data: &Map<String, Value>, names: &[&str]) -> Option<String> {
    get_field(data, names).map(value_string)
}

fn truncate_message(line: &str) -> String {
    if line.chars().count() > 200 {
        let head: String = line.chars().take(200).collect();
        format!("{head}...")
    } else {
        line.to_string()
    }
}

pub(crate) fn extract_correlation(data: &Map<String, Value>) -> CorrelationIds {
    CorrelationIds {
        request_id: get_string(data, &["request_id", "requestId", "req_id", "x-request-id"]),
        trace_id: get_string(data, &["trace_id", "traceId", "x-trace-id", "traceid"]),
        span_id: get_string(data, &["span_id", "spanId", "x-span-id"]),
        correlation_id: get_string(
            data,
            &["correlation_id", "correlationId", "x-correlation-id"],
        ),
        session_id: get_string(data, &["session_id", "sessionId", "session"]),
        user_id: get_string(data, &["user_id", "userId", "user", "username"]),
        transaction_id: get_string(data, &["transaction_id", "transactionId", "txn_id"]),
    }
}

pub(crate) fn extract_source(data: &Map<String, Value>) -> SourceInfo {
    SourceInfo {
        hostname: get_string(data, &["hostname", "host", "server", "node"]),
        service: get_string(data, &["service", "app", "application", "logger", "name"]),
        container_id: get_string(data, &["container_id", "containerId", "container"]),
        pod_name: get_string(data, &["pod_name", "podName", "pod"]),
        namespace: get_string(data, &["namespace", "ns"]),
        ..SourceInfo::default()
    }
}

fn summary_message(data: &Map<String, Value>) -> String {
    let parts: Vec<String> = ["event", "action", "type", "status"]
        .iter()
        .filter_map(|key| data.get(*key).map(|v| format!("{key}={}", value_string(v))))
        .collect();
    if !parts.is_empty() {
        return parts.join(", ");
    }
    data.iter()
        .take(3)
        .map(|(k, v)| format!("{k}={}", value_string(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

impl LogParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["json_structured", "json_lines", "ndjson", "json"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let data: Value = match serde_json::from_str(line.trim()) {
            Ok(v) => v,
            Err(e) => return parser::error_record(self.name(), line, format!("JSON decode error: {e}")),
        };
        let Value::Object(data) = data else {
            return parser::error_record(self.name(), line, "JSON is not an object");
        };

        // Depth cap before adopting any of the decoded value.
        if let Err(e) = security::validate_json_depth(&Value::Object(data.clone()), MAX_JSON_DEPTH)
        {
            let mut record =
                parser::error_record(self.name(), line, format!("JSON validation failed: {e}"));
            record.message = truncate_message(line);
            return record;
        }

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "json_structured".to_string();
        record.parser_confidence = 1.0;
        record.structured_data = data.clone();

        if let Some(ts_value) = get_field(&data, TIMESTAMP_FIELDS) {
            let ts_str = value_string(ts_value);
            if let Some(ts) = parser::parse_timestamp(&ts_str) {
                record.timestamp = Some(ts);
                record.timestamp_precision = parser::detect_precision(&ts_str);
            }
        }

        if let Some(level) = get_string(&data, LEVEL_FIELDS) {
            record.level = LogLevel::parse(&level);
        }

        if let Some(message) = get_string(&data, MESSAGE_FIELDS) {
            record.message = message;
        }
        if record.message.is_empty() {
            record.message = summary_message(&data);
        }

        record.correlation = extract_correlation(&data);
        record.source = extract_source(&data);

        let known: Vec<&str> = TIMESTAMP_FIELDS
            .iter()
            .chain(LEVEL_FIELDS)
            .chain(MESSAGE_FIELDS)
            .copied()
            .collect();
        record.extra = data
            .into_iter()
            .filter(|(k, _)| !known.contains(&k.as_str()))
            .collect();

        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let mut json_count = 0usize;
        let mut has_log_fields = 0usize;
        for line in sample {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(line) {
                json_count += 1;
                let fields = TIMESTAMP_FIELDS.iter().chain(LEVEL_FIELDS).chain(MESSAGE_FIELDS);
                if fields.into_iter().any(|f| data.contains_key(*f)) {
                    has_log_fields += 1;
                }
            }
        }

        let json_ratio = json_count as f64 / sample.len() as f64;
        if has_log_fields > 0 {
            let bonus = (has_log_fields as f64 / sample.len() as f64 * 0.3).min(0.2);
            (json_ratio + bonus).min(1.0)
        } else {
            json_ratio * 0.8
        }
    }
}
