//! The parser contract and the helpers every format converter shares:
//! timestamp parsing over an ordered format ladder, precision inference,
//! keyword level inference, and HTTP status mapping.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc};

use crate::record::{LogLevel, LogRecord, TimestampPrecision};

/// A line-to-record converter with self-reported confidence.
///
/// `parse_line` must never panic or error out: a non-conforming line comes
/// back as a record carrying the raw line, `parser_confidence = 0` and a
/// non-empty `parse_errors`.
pub trait LogParser: Send + Sync {
    /// Unique parser name.
    fn name(&self) -> &'static str;

    /// Format aliases this parser claims.
    fn supported_formats(&self) -> &'static [&'static str];

    /// Convert one line into a normalized record.
    fn parse_line(&self, line: &str) -> LogRecord;

    /// Confidence in [0, 1] that this parser handles the sample.
    fn can_parse(&self, sample: &[String]) -> f64;

    /// Lazily parse a stream of lines, skipping empty ones.
    fn parse_stream<'a>(
        &'a self,
        lines: Box<dyn Iterator<Item = String> + 'a>,
    ) -> Box<dyn Iterator<Item = LogRecord> + 'a> {
        Box::new(lines.filter_map(move |line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(self.parse_line(trimmed))
            }
        }))
    }
}

/// Build the error-marked record for a line a parser could not handle.
pub fn error_record(parser_name: &str, line: &str, reason: impl Into<String>) -> LogRecord {
    let mut record = LogRecord::new(line);
    record.message = line.to_string();
    record.parser_name = parser_name.to_string();
    record.parser_confidence = 0.0;
    record.parse_errors.push(reason.into());
    record
}

fn naive_utc(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&naive).fixed_offset()
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%d/%b/%Y:%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

/// Try an ordered list of explicit timestamp formats, then fall back to the
/// RFC flavors. Zone-less values are stamped UTC. Returns `None` when nothing
/// matches.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    // Comma millisecond separators normalize to the dot form.
    let dotted = value.replacen(',', ".", 1);
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&dotted, fmt) {
            return Some(naive_utc(naive));
        }
    }

    if let Ok(dt) = DateTime::parse_from_str(value, "%d/%b/%Y:%H:%M:%S %z") {
        return Some(dt);
    }

    if let Some(dt) = parse_bsd_timestamp(value) {
        return Some(dt);
    }

    if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = value.parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.fixed_offset());
    }
    if value.len() == 13 && value.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = value.parse().ok()?;
        return DateTime::from_timestamp_millis(millis).map(|dt| dt.fixed_offset());
    }

    DateTime::parse_from_rfc2822(value).ok()
}

/// Parse a BSD syslog timestamp (`Oct 11 22:14:15`, no year). The year is
/// reconstructed as the current one, rolled back when the month is more than
/// one month ahead of now.
pub fn parse_bsd_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let now = Utc::now();
    let mut year = now.year();
    let naive =
        NaiveDateTime::parse_from_str(&format!("{collapsed} {year}"), "%b %d %H:%M:%S %Y").ok()?;
    if naive.month() > now.month() + 1 {
        year -= 1;
    }
    let naive =
        NaiveDateTime::parse_from_str(&format!("{collapsed} {year}"), "%b %d %H:%M:%S %Y").ok()?;
    Some(naive_utc(naive))
}

/// Reconstruct a timestamp from the klog `MMDD` and `HH:MM:SS.uuuuuu` pieces,
/// using the same year-rollback rule as BSD syslog.
pub fn parse_klog_timestamp(mmdd: &str, time: &str) -> Option<DateTime<FixedOffset>> {
    if mmdd.len() != 4 {
        return None;
    }
    let month: u32 = mmdd[..2].parse().ok()?;
    let day: u32 = mmdd[2..].parse().ok()?;
    let now = Utc::now();
    let mut year = now.year();
    if month > now.month() + 1 {
        year -= 1;
    }
    let naive = NaiveDateTime::parse_from_str(
        &format!("{year}-{month:02}-{day:02} {time}"),
        "%Y-%m-%d %H:%M:%S%.f",
    )
    .ok()?;
    Some(naive_utc(naive))
}

/// Infer precision from the length of the fractional-seconds field.
pub fn detect_precision(value: &str) -> TimestampPrecision {
    let Some(sep) = value.find(['.', ',']) else {
        return TimestampPrecision::Seconds;
    };
    let digits = value[sep + 1..]
        .bytes()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits >= 9 {
        TimestampPrecision::Nanos
    } else if digits >= 6 {
        TimestampPrecision::Micros
    } else if digits >= 3 {
        TimestampPrecision::Millis
    } else {
        TimestampPrecision::Seconds
    }
}

const ERROR_KEYWORDS: &[&str] = &["error", "exception", "failed", "failure", "fatal", "panic"];
const WARNING_KEYWORDS: &[&str] = &["warn", "warning", "deprecated", "caution"];
const DEBUG_KEYWORDS: &[&str] = &["debug", "trace", "verbose"];

/// Infer a level from message content by keyword scan; defaults to Info.
pub fn infer_level_from_message(message: &str) -> LogLevel {
    let lower = message.to_ascii_lowercase();
    if ERROR_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return LogLevel::Error;
    }
    if WARNING_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return LogLevel::Warning;
    }
    if DEBUG_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return LogLevel::Debug;
    }
    LogLevel::Info
}

/// Map an HTTP status code to a level: 5xx errors, 4xx warnings, rest info.
pub fn level_from_status(status: u16) -> LogLevel {
    if status >= 500 {
        LogLevel::Error
    } else if status >= 400 {
        LogLevel::Warning
    } else {
        LogLevel::Info
    }
}
