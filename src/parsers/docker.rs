//! Docker log parsers: json-file container logs and dockerd daemon logs.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::parser::{self, LogParser};
use crate::record::{LogLevel, LogRecord, TimestampPrecision};

pub struct DockerJsonParser;

impl LogParser for DockerJsonParser {
    fn name(&self) -> &'static str {
        "docker_json"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["docker_json", "docker_container"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let data: Value = match serde_json::from_str(line.trim()) {
            Ok(v) => v,
            Err(e) => {
                return parser::error_record(self.name(), line, format!("JSON decode error: {e}"));
            }
        };
        let Value::Object(data) = data else {
            return parser::error_record(self.name(), line, "not a Docker JSON log");
        };
        if !data.contains_key("log") {
            return parser::error_record(self.name(), line, "not a Docker JSON log");
        }

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "docker_json".to_string();
        record.parser_confidence = 1.0;

        record.message = data
            .get("log")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim_end_matches('\n')
            .to_string();

        if let Some(time) = data.get("time").and_then(|v| v.as_str()) {
            record.timestamp = parser::parse_timestamp(time);
            // Docker's json-file driver emits nanosecond timestamps.
            record.timestamp_precision = TimestampPrecision::Nanos;
        }

        let stream = data
            .get("stream")
            .and_then(|v| v.as_str())
            .unwrap_or("stdout")
            .to_string();
        record
            .structured_data
            .insert("stream".to_string(), Value::String(stream.clone()));

        record.level = parser::infer_level_from_message(&record.message);
        if stream == "stderr" && record.level == LogLevel::Info {
            record.level = LogLevel::Warning;
        }

        for (key, value) in &data {
            if !matches!(key.as_str(), "log" | "stream" | "time") {
                record.structured_data.insert(key.clone(), value.clone());
            }
        }

        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let matches = sample
            .iter()
            .filter(|line| {
                let line = line.trim();
                if line.is_empty() {
                    return false;
                }
                match serde_json::from_str::<Value>(line) {
                    Ok(Value::Object(data)) => {
                        data.contains_key("log")
                            && data.contains_key("stream")
                            && data.contains_key("time")
                    }
                    _ => false,
                }
            })
            .count();
        matches as f64 / sample.len() as f64
    }
}

static DAEMON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^time="([^"]+)"\s+level=(\w+)\s+msg="([^"]*)"(.*)$"#).unwrap()
});

static SYSTEMD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w{3}\s+\d+\s+\d+:\d+:\d+)\s+(\S+)\s+dockerd\[(\d+)\]:\s+(.*)$").unwrap()
});

static KEYVALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)=(?:"([^"]*)"|(\S+))"#).unwrap());

fn parse_keyvalue_fields(input: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for caps in KEYVALUE_RE.captures_iter(input) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or("");
        fields.insert(caps[1].to_string(), Value::String(value.to_string()));
    }
    fields
}

pub struct DockerDaemonParser;

impl DockerDaemonParser {
    fn parse_logfmt(&self, line: &str, caps: &regex::Captures<'_>) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "docker_daemon".to_string();
        record.parser_confidence = 1.0;
        record.timestamp = parser::parse_timestamp(&caps[1]);
        record.level = LogLevel::parse(&caps[2]);
        record.message = caps[3].to_string();

        let extra = caps.get(4).map(|m| m.as_str()).unwrap_or("");
        if !extra.trim().is_empty() {
            record.structured_data = parse_keyvalue_fields(extra);
            if let Some(container) = record
                .structured_data
                .get("container")
                .and_then(|v| v.as_str())
            {
                record.source.container_id = Some(container.to_string());
            }
        }

        record.source.service = Some("dockerd".to_string());
        record
    }

    fn parse_systemd(&self, line: &str, caps: &regex::Captures<'_>) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "docker_daemon_systemd".to_string();
        record.parser_confidence = 0.9;
        record.timestamp = parser::parse_bsd_timestamp(&caps[1]);
        record.message = caps[4].to_string();
        record.level = parser::infer_level_from_message(&record.message);
        record.source.hostname = Some(caps[2].to_string());
        record.source.service = Some("dockerd".to_string());
        record
            .structured_data
            .insert("pid".to_string(), Value::String(caps[3].to_string()));
        record
    }

    fn parse_keyvalue(&self, line: &str) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "docker_daemon".to_string();
        record.parser_confidence = 0.5;

        let fields = parse_keyvalue_fields(line);
        if !fields.is_empty() {
            if let Some(msg) = fields
                .get("msg")
                .or_else(|| fields.get("message"))
                .and_then(|v| v.as_str())
            {
                record.message = msg.to_string();
            } else {
                record.message = line.to_string();
            }
            if let Some(time) = fields.get("time").and_then(|v| v.as_str()) {
                record.timestamp = parser::parse_timestamp(time);
            }
            if let Some(level) = fields.get("level").and_then(|v| v.as_str()) {
                record.level = LogLevel::parse(level);
            }
            record.structured_data = fields;
        } else {
            record.message = line.to_string();
            record.level = parser::infer_level_from_message(line);
        }

        record
    }
}

impl LogParser for DockerDaemonParser {
    fn name(&self) -> &'static str {
        "docker_daemon"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["docker_daemon", "dockerd"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let trimmed = line.trim();
        if let Some(caps) = DAEMON_RE.captures(trimmed) {
            return self.parse_logfmt(line, &caps);
        }
        if let Some(caps) = SYSTEMD_RE.captures(trimmed) {
            return self.parse_systemd(line, &caps);
        }
        self.parse_keyvalue(line)
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let mut score = 0.0;
        for line in sample {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if DAEMON_RE.is_match(line) {
                score += 1.0;
            } else if SYSTEMD_RE.is_match(line) {
                score += 0.8;
            } else if line.to_ascii_lowercase().contains("dockerd") || line.contains("level=") {
                score += 0.3;
            }
        }
        (score / sample.len() as f64).min(1.0)
    }
}
