//! Syslog parsers for the RFC 3164 (BSD) and RFC 5424 formats.
//!
//! The PRI field encodes `facility * 8 + severity`; severity maps onto the
//! level enum through the RFC 5424 numeric table.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::parser::{self, LogParser};
use crate::record::{LogLevel, LogRecord, TimestampPrecision};

static RFC3164_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:<(?P<pri>\d{1,3})>)?(?P<timestamp>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<hostname>\S+)\s+(?P<tag>\S+?)(?:\[(?P<pid>\d+)\])?:\s*(?P<message>.*)",
    )
    .unwrap()
});

/// Looser form without a tag, for relays that only forward host + message.
static RFC3164_ALT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:<(?P<pri>\d{1,3})>)?(?P<timestamp>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2})\s+(?P<hostname>\S+)\s+(?P<message>.*)",
    )
    .unwrap()
});

static RFC5424_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^<(?P<pri>\d{1,3})>(?P<version>\d+)\s+(?P<timestamp>\S+)\s+(?P<hostname>\S+)\s+(?P<appname>\S+)\s+(?P<procid>\S+)\s+(?P<msgid>\S+)\s+(?P<sd>-|\[.*?\](?:\s*\[.*?\])*)\s*(?P<message>.*)?",
    )
    .unwrap()
});

static SD_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());
static SD_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(\S+)="([^"]*)""#).unwrap());

fn apply_pri(record: &mut LogRecord, pri: u16) {
    let facility = pri >> 3;
    let severity = (pri & 0x07) as u8;
    record.level = LogLevel::from_severity(severity);
    record.extra.insert("facility".to_string(), facility.into());
    record.extra.insert("severity".to_string(), severity.into());
}

pub struct Syslog3164Parser;

impl LogParser for Syslog3164Parser {
    fn name(&self) -> &'static str {
        "syslog_rfc3164"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["syslog_rfc3164", "syslog_bsd", "syslog"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let trimmed = line.trim();
        let caps = match RFC3164_RE.captures(trimmed) {
            Some(caps) => caps,
            None => match RFC3164_ALT_RE.captures(trimmed) {
                Some(caps) => caps,
                None => {
                    return parser::error_record(
                        self.name(),
                        line,
                        "line does not match RFC 3164 format",
                    );
                }
            },
        };

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "syslog_rfc3164".to_string();
        record.parser_confidence = 0.90;

        let message = caps.name("message").map(|m| m.as_str()).unwrap_or("");
        match caps.name("pri").and_then(|p| p.as_str().parse::<u16>().ok()) {
            Some(pri) => apply_pri(&mut record, pri),
            None => record.level = parser::infer_level_from_message(message),
        }

        if let Some(ts) = parser::parse_bsd_timestamp(&caps["timestamp"]) {
            record.timestamp = Some(ts);
            record.timestamp_precision = TimestampPrecision::Seconds;
        }

        record.source.hostname = Some(caps["hostname"].to_string());
        record.source.service = caps.name("tag").map(|m| m.as_str().to_string());

        if let Some(pid) = caps.name("pid").and_then(|p| p.as_str().parse::<u64>().ok()) {
            record.extra.insert("pid".to_string(), pid.into());
        }

        record.message = message.to_string();
        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let matches = sample
            .iter()
            .filter(|line| {
                let t = line.trim();
                RFC3164_RE.is_match(t) || RFC3164_ALT_RE.is_match(t)
            })
            .count();
        matches as f64 / sample.len() as f64
    }
}

pub struct Syslog5424Parser;

impl Syslog5424Parser {
    /// Decode `[sd-id k="v" ...]` blocks into per-id maps.
    fn parse_structured_data(sd: &str) -> Map<String, Value> {
        let mut result = Map::new();
        for block in SD_BLOCK_RE.captures_iter(sd) {
            let content = &block[1];
            let mut parts = content.splitn(2, char::is_whitespace);
            let Some(sd_id) = parts.next() else { continue };
            let mut params = Map::new();
            if let Some(rest) = parts.next() {
                for param in SD_PARAM_RE.captures_iter(rest) {
                    params.insert(param[1].to_string(), Value::String(param[2].to_string()));
                }
            }
            result.insert(sd_id.to_string(), Value::Object(params));
        }
        result
    }
}

impl LogParser for Syslog5424Parser {
    fn name(&self) -> &'static str {
        "syslog_rfc5424"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["syslog_rfc5424"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let Some(caps) = RFC5424_RE.captures(line.trim()) else {
            return parser::error_record(self.name(), line, "line does not match RFC 5424 format");
        };

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "syslog_rfc5424".to_string();
        record.parser_confidence = 0.95;

        if let Ok(pri) = caps["pri"].parse::<u16>() {
            apply_pri(&mut record, pri);
        }

        let ts = &caps["timestamp"];
        if ts != "-" {
            if let Some(parsed) = parser::parse_timestamp(ts) {
                record.timestamp = Some(parsed);
                record.timestamp_precision = parser::detect_precision(ts);
            }
        }

        if &caps["hostname"] != "-" {
            record.source.hostname = Some(caps["hostname"].to_string());
        }
        if &caps["appname"] != "-" {
            record.source.service = Some(caps["appname"].to_string());
        }
        if &caps["procid"] != "-" {
            record
                .extra
                .insert("procid".to_string(), Value::String(caps["procid"].to_string()));
        }
        if &caps["msgid"] != "-" {
            record
                .extra
                .insert("msgid".to_string(), Value::String(caps["msgid"].to_string()));
        }

        let sd = &caps["sd"];
        if sd != "-" {
            record.structured_data = Self::parse_structured_data(sd);
        }

        record.message = caps
            .name("message")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let matches = sample
            .iter()
            .filter(|line| RFC5424_RE.is_match(line.trim()))
            .count();
        matches as f64 / sample.len() as f64
    }
}
