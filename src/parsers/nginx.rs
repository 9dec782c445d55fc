//! Nginx log parsers: the default access format and the error log.

use std::sync::LazyLock;

use regex::Regex;

use crate::parser::{self, LogParser};
use crate::parsers::http;
use crate::record::{HttpInfo, LogLevel, LogRecord, NetworkInfo, TimestampPrecision};

static ACCESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+\[(?P<timestamp>[^\]]+)\]\s+"(?P<request>[^"]*)"\s+(?P<status>\d+)\s+(?P<size>\S+)(?:\s+"(?P<referer>[^"]*)"\s+"(?P<user_agent>[^"]*)")?"#,
    )
    .unwrap()
});

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<timestamp>\d{4}/\d{2}/\d{2}\s+\d{2}:\d{2}:\d{2})\s+\[(?P<level>\w+)\]\s+(?P<pid>\d+)#(?P<tid>\d+):\s*(?:\*(?P<cid>\d+)\s+)?(?P<message>.*)",
    )
    .unwrap()
});

fn nginx_error_level(level: &str) -> LogLevel {
    match level {
        "emerg" => LogLevel::Emergency,
        "alert" => LogLevel::Alert,
        "crit" => LogLevel::Critical,
        "error" => LogLevel::Error,
        "warn" => LogLevel::Warning,
        "notice" => LogLevel::Notice,
        "info" => LogLevel::Info,
        "debug" => LogLevel::Debug,
        _ => LogLevel::Unknown,
    }
}

pub struct NginxAccessParser;

impl LogParser for NginxAccessParser {
    fn name(&self) -> &'static str {
        "nginx_access"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["nginx_access", "nginx_default", "nginx"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let Some(caps) = ACCESS_RE.captures(line.trim()) else {
            return parser::error_record(
                self.name(),
                line,
                "line does not match nginx access format",
            );
        };

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "nginx_access".to_string();
        record.parser_confidence = 0.95;

        if let Some(ts) = http::parse_clf_timestamp(&caps["timestamp"]) {
            record.timestamp = Some(ts);
            record.timestamp_precision = TimestampPrecision::Seconds;
        }

        let request = http::parse_request_line(&caps["request"]);
        let status: Option<u16> = caps["status"].parse().ok();
        record.http = Some(HttpInfo {
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query,
            status,
            response_size: caps["size"].parse().ok(),
            http_version: request.version,
            ..HttpInfo::default()
        });

        let referer = caps
            .name("referer")
            .map(|m| m.as_str())
            .filter(|r| !r.is_empty() && *r != "-")
            .map(String::from);
        let user_agent = caps
            .name("user_agent")
            .map(|m| m.as_str())
            .filter(|ua| !ua.is_empty() && *ua != "-")
            .map(String::from);
        record.network = Some(NetworkInfo {
            source_ip: Some(caps["ip"].to_string()),
            referer,
            user_agent,
            ..NetworkInfo::default()
        });

        record.level = status
            .map(parser::level_from_status)
            .unwrap_or(LogLevel::Unknown);
        record.message = format!(
            "{} {} -> {}",
            request.method.as_deref().unwrap_or("-"),
            request.path.as_deref().unwrap_or("-"),
            &caps["status"],
        );

        if &caps["user"] != "-" {
            record.correlation.user_id = Some(caps["user"].to_string());
        }

        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let matches = sample
            .iter()
            .filter(|line| ACCESS_RE.is_match(line.trim()))
            .count();
        matches as f64 / sample.len() as f64
    }
}

pub struct NginxErrorParser;

impl LogParser for NginxErrorParser {
    fn name(&self) -> &'static str {
        "nginx_error"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["nginx_error"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let Some(caps) = ERROR_RE.captures(line.trim()) else {
            return parser::error_record(
                self.name(),
                line,
                "line does not match nginx error format",
            );
        };

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "nginx_error".to_string();
        record.parser_confidence = 0.95;

        if let Some(ts) = parser::parse_timestamp(&caps["timestamp"]) {
            record.timestamp = Some(ts);
            record.timestamp_precision = TimestampPrecision::Seconds;
        }

        record.level = nginx_error_level(&caps["level"]);
        record.message = caps["message"].to_string();

        if let Ok(pid) = caps["pid"].parse::<u64>() {
            record.extra.insert("pid".to_string(), pid.into());
        }
        if let Ok(tid) = caps["tid"].parse::<u64>() {
            record.extra.insert("tid".to_string(), tid.into());
        }
        if let Some(cid) = caps.name("cid") {
            if let Ok(cid) = cid.as_str().parse::<u64>() {
                record.extra.insert("connection_id".to_string(), cid.into());
            }
        }

        record.source.service = Some("nginx".to_string());
        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let matches = sample
            .iter()
            .filter(|line| ERROR_RE.is_match(line.trim()))
            .count();
        matches as f64 / sample.len() as f64
    }
}
