//! Fallback parser for lines no format-specific parser claims.
//!
//! Pulls out whatever structure it can recognize: a leading timestamp in any
//! of the common shapes, then a level keyword anywhere in the remainder.
//! Confidence stays capped below every format-specific parser so those always
//! win the best-parser search.

use std::sync::LazyLock;

use regex::Regex;

use crate::parser::{self, LogParser};
use crate::record::{LogLevel, LogRecord, TimestampPrecision};

static TIMESTAMP_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s*",
        r"^(\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}(?:[,\.]\d+)?)\s*",
        r"^(\d{4}/\d{2}/\d{2}\s+\d{2}:\d{2}:\d{2})\s*",
        r"^(\d{2}/\d{2}/\d{4}\s+\d{2}:\d{2}:\d{2})\s*",
        r"^(\d{13})\s*",
        r"^(\d{10})\s*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("builtin timestamp pattern"))
    .collect()
});

static LEVEL_TOKENS: LazyLock<Vec<(Regex, LogLevel)>> = LazyLock::new(|| {
    [
        (r"(?i)\b(EMERG|EMERGENCY)\b", LogLevel::Emergency),
        (r"(?i)\b(ALERT)\b", LogLevel::Alert),
        (r"(?i)\b(CRIT|CRITICAL|FATAL)\b", LogLevel::Critical),
        (r"(?i)\b(ERR|ERROR)\b", LogLevel::Error),
        (r"(?i)\b(WARN|WARNING)\b", LogLevel::Warning),
        (r"(?i)\b(NOTICE)\b", LogLevel::Notice),
        (r"(?i)\b(INFO)\b", LogLevel::Info),
        (r"(?i)\b(DEBUG|TRACE|VERBOSE)\b", LogLevel::Debug),
    ]
    .iter()
    .map(|(p, level)| (Regex::new(p).expect("builtin level pattern"), *level))
    .collect()
});

pub struct GenericParser;

impl LogParser for GenericParser {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["generic", "unknown", "text"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let stripped = line.trim();
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "generic".to_string();
        record.parser_confidence = 0.3;

        let mut message = stripped.to_string();

        for pattern in TIMESTAMP_PREFIXES.iter() {
            if let Some(caps) = pattern.captures(stripped) {
                let ts_str = &caps[1];
                if let Some(ts) = parser::parse_timestamp(ts_str) {
                    record.timestamp = Some(ts);
                    record.timestamp_precision = TimestampPrecision::Seconds;
                    message = stripped[caps.get(0).unwrap().end()..].trim().to_string();
                    record.parser_confidence = 0.5;
                    break;
                }
            }
        }

        for (pattern, level) in LEVEL_TOKENS.iter() {
            if pattern.is_match(&message) {
                record.level = *level;
                record.parser_confidence = (record.parser_confidence + 0.2).min(0.7);
                break;
            }
        }

        if record.level == LogLevel::Unknown {
            record.level = parser::infer_level_from_message(&message);
        }

        record.message = message;
        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.3;
        }
        let mut has_timestamp = 0usize;
        let mut has_level = 0usize;
        for line in sample {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if TIMESTAMP_PREFIXES.iter().any(|p| p.is_match(line)) {
                has_timestamp += 1;
            }
            if LEVEL_TOKENS.iter().any(|(p, _)| p.is_match(line)) {
                has_level += 1;
            }
        }
        let ts_ratio = has_timestamp as f64 / sample.len() as f64;
        let level_ratio = has_level as f64 / sample.len() as f64;
        (0.3 + ts_ratio * 0.2 + level_ratio * 0.1).min(0.6)
    }
}
