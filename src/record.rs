//! The normalized log record and its sub-records.
//!
//! Every parser converts its format-specific fields into [`LogRecord`], so
//! downstream stages (normalization, merging, correlation, rendering) only
//! ever deal with one shape.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Log severity, ordered so that `>=` means "at least as severe".
/// `Unknown` compares below every real level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Unknown,
    Trace,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    /// Parse a level from any of the representations seen in the wild:
    /// canonical names, common aliases (warn, err, fatal, emerg, panic),
    /// single-letter shortcuts, and the RFC 5424 numeric severities 0-7.
    /// Unrecognized input yields `Unknown`.
    pub fn parse(value: &str) -> LogLevel {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" | "information" | "informational" => LogLevel::Info,
            "notice" => LogLevel::Notice,
            "warn" | "warning" => LogLevel::Warning,
            "error" | "err" => LogLevel::Error,
            "critical" | "crit" | "fatal" => LogLevel::Critical,
            "alert" => LogLevel::Alert,
            "emergency" | "emerg" | "panic" => LogLevel::Emergency,
            // Single character abbreviations
            "t" => LogLevel::Trace,
            "d" => LogLevel::Debug,
            "i" => LogLevel::Info,
            "n" => LogLevel::Notice,
            "w" => LogLevel::Warning,
            "e" => LogLevel::Error,
            "c" | "f" => LogLevel::Critical,
            "a" => LogLevel::Alert,
            // Syslog numeric priorities (RFC 5424)
            "0" => LogLevel::Emergency,
            "1" => LogLevel::Alert,
            "2" => LogLevel::Critical,
            "3" => LogLevel::Error,
            "4" => LogLevel::Warning,
            "5" => LogLevel::Notice,
            "6" => LogLevel::Info,
            "7" => LogLevel::Debug,
            _ => LogLevel::Unknown,
        }
    }

    /// Map an RFC 5424 severity value (0-7) to a level.
    pub fn from_severity(severity: u8) -> LogLevel {
        match severity {
            0 => LogLevel::Emergency,
            1 => LogLevel::Alert,
            2 => LogLevel::Critical,
            3 => LogLevel::Error,
            4 => LogLevel::Warning,
            5 => LogLevel::Notice,
            6 => LogLevel::Info,
            7 => LogLevel::Debug,
            _ => LogLevel::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Notice => "NOTICE",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Alert => "ALERT",
            LogLevel::Emergency => "EMERGENCY",
            LogLevel::Unknown => "UNKNOWN",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Unknown
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for LogLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(LogLevel::parse(&s))
    }
}

/// Granularity of the fractional-seconds field the timestamp was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampPrecision {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "ms")]
    Millis,
    #[serde(rename = "us")]
    Micros,
    #[serde(rename = "ns")]
    Nanos,
    #[serde(rename = "unknown")]
    Unknown,
}

impl Default for TimestampPrecision {
    fn default() -> Self {
        TimestampPrecision::Unknown
    }
}

impl TimestampPrecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimestampPrecision::Seconds => "s",
            TimestampPrecision::Millis => "ms",
            TimestampPrecision::Micros => "us",
            TimestampPrecision::Nanos => "ns",
            TimestampPrecision::Unknown => "unknown",
        }
    }
}

/// Where a record came from. Absent fields are elided from serialized output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Network context for access logs, firewalls, and the like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
}

/// HTTP request context for web server logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_version: Option<String>,
}

/// Identifiers used to relate records across systems.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrelationIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl CorrelationIds {
    pub fn is_empty(&self) -> bool {
        self.request_id.is_none()
            && self.trace_id.is_none()
            && self.span_id.is_none()
            && self.correlation_id.is_none()
            && self.session_id.is_none()
            && self.user_id.is_none()
            && self.transaction_id.is_none()
    }

    /// First non-empty id in priority order, as `(field_name, value)`.
    pub fn primary_id(&self) -> Option<(&'static str, &str)> {
        [
            ("request_id", &self.request_id),
            ("trace_id", &self.trace_id),
            ("correlation_id", &self.correlation_id),
            ("transaction_id", &self.transaction_id),
            ("span_id", &self.span_id),
            ("session_id", &self.session_id),
            ("user_id", &self.user_id),
        ]
        .into_iter()
        .find_map(|(name, value)| value.as_deref().map(|v| (name, v)))
    }
}

/// The universal normalized log record.
///
/// All parsers produce this shape. Fields are optional to accommodate
/// different log types; serialization elides empty sub-records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub raw: String,

    #[serde(default)]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub timestamp_precision: TimestampPrecision,

    #[serde(default)]
    pub level: LogLevel,
    #[serde(default = "default_format")]
    pub format_detected: String,

    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub structured_data: Map<String, Value>,

    #[serde(default)]
    pub source: SourceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpInfo>,
    #[serde(default, skip_serializing_if = "CorrelationIds::is_empty")]
    pub correlation: CorrelationIds,

    #[serde(default)]
    pub parser_name: String,
    #[serde(default)]
    pub parser_confidence: f64,
    #[serde(default)]
    pub parse_errors: Vec<String>,

    #[serde(default)]
    pub extra: Map<String, Value>,
}

fn default_format() -> String {
    "unknown".to_string()
}

impl Default for LogRecord {
    fn default() -> Self {
        LogRecord {
            id: Uuid::new_v4(),
            raw: String::new(),
            timestamp: None,
            timestamp_precision: TimestampPrecision::Unknown,
            level: LogLevel::Unknown,
            format_detected: default_format(),
            message: String::new(),
            structured_data: Map::new(),
            source: SourceInfo::default(),
            network: None,
            http: None,
            correlation: CorrelationIds::default(),
            parser_name: String::new(),
            parser_confidence: 0.0,
            parse_errors: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl LogRecord {
    /// New record holding the original line; everything else defaulted.
    pub fn new(raw: impl Into<String>) -> LogRecord {
        LogRecord {
            raw: raw.into(),
            ..LogRecord::default()
        }
    }

    /// True when the record is at error severity or above.
    pub fn is_error(&self) -> bool {
        self.level >= LogLevel::Error
    }

    /// Timestamp rendered with a strftime format, or `-` when absent.
    pub fn formatted_timestamp(&self, fmt: &str) -> String {
        match self.timestamp {
            Some(ts) => ts.format(fmt).to_string(),
            None => "-".to_string(),
        }
    }

    /// Serialize to the documented JSON mapping.
    pub fn to_mapping(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Deserialize from the mapping produced by [`to_mapping`].
    /// Round-trip stable for all documented fields.
    pub fn from_mapping(value: &Value) -> Result<LogRecord, serde_json::Error> {
        serde_json::from_value(value.clone())
    }
}

/// Result of a batch parse over one source.
#[derive(Debug, Clone, Serialize)]
pub struct ParseSummary {
    pub entries: Vec<LogRecord>,
    pub format_detected: String,
    pub confidence: f64,
    pub entry_count: usize,
    pub error_count: usize,
    pub source_file: Option<String>,
}

impl ParseSummary {
    pub fn new(
        entries: Vec<LogRecord>,
        format_detected: impl Into<String>,
        confidence: f64,
        source_file: Option<String>,
    ) -> ParseSummary {
        let entry_count = entries.len();
        let error_count = entries.iter().filter(|e| !e.parse_errors.is_empty()).count();
        ParseSummary {
            entries,
            format_detected: format_detected.into(),
            confidence,
            entry_count,
            error_count,
            source_file,
        }
    }

    /// New summary keeping only entries at or above the given level.
    pub fn filter_level(&self, min: LogLevel) -> ParseSummary {
        let entries: Vec<LogRecord> = self
            .entries
            .iter()
            .filter(|e| e.level >= min)
            .cloned()
            .collect();
        ParseSummary::new(
            entries,
            self.format_detected.clone(),
            self.confidence,
            self.source_file.clone(),
        )
    }
}
