//! Parser for the Python standard logging output shapes.
//!
//! Default format `%(asctime)s - %(name)s - %(levelname)s - %(message)s`
//! plus the threaded, reordered, and `LEVEL:name:message` variants.

use std::sync::LazyLock;

use regex::Regex;

use crate::parser::{self, LogParser};
use crate::record::{LogLevel, LogRecord, TimestampPrecision};

static THREADED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<timestamp>\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}[,\.]\d{3})\s+[-:]\s*(?P<name>\S+)\s+[-:]\s*(?P<level>DEBUG|INFO|WARNING|ERROR|CRITICAL)\s+[-:]\s*\[(?P<thread>[^\]]+)\]\s+[-:]\s*(?P<message>.*)",
    )
    .unwrap()
});

static FULL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<timestamp>\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}[,\.]\d{3})\s+[-:]\s*(?P<name>\S+)\s+[-:]\s*(?P<level>DEBUG|INFO|WARNING|ERROR|CRITICAL)\s+[-:]\s*(?P<message>.*)",
    )
    .unwrap()
});

static ALT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<timestamp>\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}[,\.]\d{3})\s+(?P<level>DEBUG|INFO|WARNING|ERROR|CRITICAL)\s+(?P<name>\S+)\s+(?P<message>.*)",
    )
    .unwrap()
});

static SIMPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<level>DEBUG|INFO|WARNING|ERROR|CRITICAL):(?P<name>\S+):(?P<message>.*)")
        .unwrap()
});

pub struct PythonLoggingParser;

impl PythonLoggingParser {
    fn build(&self, line: &str, caps: &regex::Captures<'_>) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "python_logging".to_string();
        record.parser_confidence = 0.95;

        if let Some(ts) = caps.name("timestamp") {
            if let Some(parsed) = parser::parse_timestamp(ts.as_str()) {
                record.timestamp = Some(parsed);
                record.timestamp_precision = TimestampPrecision::Millis;
            }
        }

        record.level = LogLevel::parse(&caps["level"]);
        record.message = caps["message"].to_string();
        record.source.service = caps.name("name").map(|m| m.as_str().to_string());

        if let Some(thread) = caps.name("thread") {
            record
                .extra
                .insert("thread".to_string(), thread.as_str().into());
        }

        record
    }
}

impl LogParser for PythonLoggingParser {
    fn name(&self) -> &'static str {
        "python_logging"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["python_logging", "python_default", "python"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let trimmed = line.trim();
        for re in [&*THREADED_RE, &*FULL_RE, &*ALT_RE, &*SIMPLE_RE] {
            if let Some(caps) = re.captures(trimmed) {
                return self.build(line, &caps);
            }
        }
        parser::error_record(
            self.name(),
            line,
            "line does not match Python logging format",
        )
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let matches = sample
            .iter()
            .filter(|line| {
                let t = line.trim();
                THREADED_RE.is_match(t)
                    || FULL_RE.is_match(t)
                    || ALT_RE.is_match(t)
                    || SIMPLE_RE.is_match(t)
            })
            .count();
        matches as f64 / sample.len() as f64
    }
}
