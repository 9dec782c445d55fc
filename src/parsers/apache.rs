//! Apache access log parsers: Common Log Format and Combined Log Format.

use std::sync::LazyLock;

use regex::Regex;

use crate::parser::{self, LogParser};
use crate::record::{HttpInfo, LogRecord, NetworkInfo};
use crate::parsers::http;

static COMMON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+\[(?P<timestamp>[^\]]+)\]\s+"(?P<request>[^"]*)"\s+(?P<status>\d+)\s+(?P<size>\S+)"#,
    )
    .unwrap()
});

static COMBINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+)\s+(?P<ident>\S+)\s+(?P<user>\S+)\s+\[(?P<timestamp>[^\]]+)\]\s+"(?P<request>[^"]*)"\s+(?P<status>\d+)\s+(?P<size>\S+)\s+"(?P<referer>[^"]*)"\s+"(?P<user_agent>[^"]*)""#,
    )
    .unwrap()
});

fn build_access_record(
    parser_name: &'static str,
    format: &'static str,
    confidence: f64,
    caps: &regex::Captures<'_>,
    line: &str,
) -> LogRecord {
    let mut record = LogRecord::new(line);
    record.parser_name = parser_name.to_string();
    record.format_detected = format.to_string();
    record.parser_confidence = confidence;

    let ts = &caps["timestamp"];
    if let Some(parsed) = http::parse_clf_timestamp(ts) {
        record.timestamp = Some(parsed);
        record.timestamp_precision = crate::record::TimestampPrecision::Seconds;
    }

    let request = http::parse_request_line(&caps["request"]);
    let status: Option<u16> = caps["status"].parse().ok();
    let size: Option<u64> = caps["size"].parse().ok();

    record.http = Some(HttpInfo {
        method: request.method.clone(),
        path: request.path.clone(),
        query: request.query,
        status,
        response_size: size,
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
        .unwrap_or(crate::record::LogLevel::Unknown);

    record.message = format!(
        "{} {} -> {}",
        request.method.as_deref().unwrap_or("-"),
        request.path.as_deref().unwrap_or("-"),
        &caps["status"],
    );

    let user = &caps["user"];
    if user != "-" {
        record.correlation.user_id = Some(user.to_string());
    }

    record
}

pub struct ApacheCommonParser;

impl LogParser for ApacheCommonParser {
    fn name(&self) -> &'static str {
        "apache_common"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["apache_common", "clf"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        match COMMON_RE.captures(line.trim()) {
            Some(caps) => build_access_record(self.name(), "apache_common", 0.95, &caps, line),
            None => parser::error_record(
                self.name(),
                line,
                "line does not match Apache common format",
            ),
        }
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let matches = sample
            .iter()
            .filter(|line| COMMON_RE.is_match(line.trim()))
            .count();
        matches as f64 / sample.len() as f64
    }
}

pub struct ApacheCombinedParser;

impl LogParser for ApacheCombinedParser {
    fn name(&self) -> &'static str {
        "apache_combined"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["apache_combined", "combined"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        if let Some(caps) = COMBINED_RE.captures(line.trim()) {
            return build_access_record(self.name(), "apache_combined", 0.98, &caps, line);
        }
        // Fall back to the common shape under this parser's name.
        match COMMON_RE.captures(line.trim()) {
            Some(caps) => build_access_record(self.name(), "apache_common", 0.95, &caps, line),
            None => parser::error_record(
                self.name(),
                line,
                "line does not match Apache combined format",
            ),
        }
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let combined = sample
            .iter()
            .filter(|line| COMBINED_RE.is_match(line.trim()))
            .count();
        if combined > 0 {
            // Slight boost over the common parser for tie-breaking.
            return (combined as f64 / sample.len() as f64 * 1.1).min(1.0);
        }
        let common = sample
            .iter()
            .filter(|line| COMMON_RE.is_match(line.trim()))
            .count();
        common as f64 / sample.len() as f64 * 0.9
    }
}
