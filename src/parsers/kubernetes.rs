//! Kubernetes log parsers: container output, component (klog) lines, audit
//! events, and Event objects.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::parser::{self, LogParser};
use crate::parsers::json::JsonParser;
use crate::record::{LogLevel, LogRecord, TimestampPrecision};

/// `kubectl logs --timestamps` prefixes each line with a nanosecond RFC 3339
/// timestamp.
static TIMESTAMPED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+Z)\s+(.*)$").unwrap()
});

pub struct KubernetesContainerParser {
    json: JsonParser,
}

impl KubernetesContainerParser {
    pub fn new() -> Self {
        KubernetesContainerParser { json: JsonParser }
    }
}

impl Default for KubernetesContainerParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogParser for KubernetesContainerParser {
    fn name(&self) -> &'static str {
        "kubernetes_container"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["kubernetes_container", "kubectl_logs", "k8s_container"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let stripped = line.trim();

        let (timestamp, content) = match TIMESTAMPED_RE.captures(stripped) {
            Some(caps) => {
                let ts = parser::parse_timestamp(&caps[1]);
                (ts, caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default())
            }
            None => (None, stripped.to_string()),
        };

        let timestamped = timestamp.is_some();
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        if timestamped {
            record.timestamp = timestamp;
            record.timestamp_precision = TimestampPrecision::Nanos;
        }

        // JSON payloads delegate to the JSON parser and merge its view.
        if content.starts_with('{') {
            let inner = self.json.parse_line(&content);
            if inner.parse_errors.is_empty() {
                record.message = inner.message;
                record.level = inner.level;
                record.structured_data = inner.structured_data;
                record.correlation = inner.correlation;
                if record.timestamp.is_none() {
                    record.timestamp = inner.timestamp;
                    record.timestamp_precision = inner.timestamp_precision;
                }
                record.format_detected = "kubernetes_container_json".to_string();
                record.parser_confidence = 1.0;
                return record;
            }
        }

        record.message = content;
        record.level = parser::infer_level_from_message(&record.message);
        record.format_detected = "kubernetes_container".to_string();
        record.parser_confidence = if timestamped { 0.8 } else { 0.6 };
        record
    }

    fn can_parse(&self, sample: &[String]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let timestamped = sample
            .iter()
            .filter(|line| TIMESTAMPED_RE.is_match(line.trim()))
            .count();
        if timestamped > 0 {
            (0.6 + (timestamped as f64 / sample.len() as f64) * 0.4).min(1.0)
        } else {
            0.3
        }
    }
}

/// klog: `LMMDD HH:MM:SS.uuuuuu PID file:line] message` with L in I/W/E/F.
static KLOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([IWEF])(\d{4})\s+(\d{2}:\d{2}:\d{2}\.\d+)\s+(\d+)\s+(\S+):(\d+)\]\s*(.*)$")
        .unwrap()
});

static COMPONENT_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\{.*"ts".*"msg".*\}$"#).unwrap());

pub struct KubernetesComponentParser;

impl KubernetesComponentParser {
    fn parse_klog(&self, line: &str, caps: &regex::Captures<'_>) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "klog".to_string();
        record.parser_confidence = 1.0;

        record.level = match &caps[1] {
            "I" => LogLevel::Info,
            "W" => LogLevel::Warning,
            "E" => LogLevel::Error,
            "F" => LogLevel::Critical,
            _ => LogLevel::Info,
        };
        record.message = caps[7].to_string();

        if let Some(ts) = parser::parse_klog_timestamp(&caps[2], &caps[3]) {
            record.timestamp = Some(ts);
            record.timestamp_precision = TimestampPrecision::Micros;
        }

        record
            .structured_data
            .insert("pid".to_string(), Value::String(caps[4].to_string()));
        record
            .structured_data
            .insert("source_file".to_string(), Value::String(caps[5].to_string()));
        record
            .structured_data
            .insert("source_line".to_string(), Value::String(caps[6].to_string()));

        record
    }

    fn parse_json(&self, line: &str, data: Map<String, Value>) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "kubernetes_component_json".to_string();
        record.parser_confidence = 1.0;
        record.structured_data = data.clone();

        record.message = data
            .get("msg")
            .or_else(|| data.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or(line)
            .to_string();

        for ts_field in ["ts", "time", "timestamp"] {
            if let Some(value) = data.get(ts_field) {
                let ts_str = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if let Some(ts) = parser::parse_timestamp(&ts_str) {
                    record.timestamp = Some(ts);
                    break;
                }
            }
        }

        record.level = match data
            .get("level")
            .or_else(|| data.get("severity"))
            .and_then(|v| v.as_str())
        {
            Some(level) => LogLevel::parse(level),
            None => parser::infer_level_from_message(&record.message),
        };

        record
    }
}

impl LogParser for KubernetesComponentParser {
    fn name(&self) -> &'static str {
        "kubernetes_component"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["kubernetes_component", "klog", "k8s_klog"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let stripped = line.trim();

        if let Some(caps) = KLOG_RE.captures(stripped) {
            return self.parse_klog(line, &caps);
        }

        if stripped.starts_with('{') {
            if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(stripped) {
                return self.parse_json(line, data);
            }
        }

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "kubernetes_component".to_string();
        record.parser_confidence = 0.3;
        record.message = stripped.to_string();
        record.level = parser::infer_level_from_message(stripped);
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
                KLOG_RE.is_match(t) || COMPONENT_JSON_RE.is_match(t)
            })
            .count();
        matches as f64 / sample.len() as f64
    }
}

pub struct KubernetesAuditParser;

impl LogParser for KubernetesAuditParser {
    fn name(&self) -> &'static str {
        "kubernetes_audit"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["kubernetes_audit", "k8s_audit"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let data: Value = match serde_json::from_str(line.trim()) {
            Ok(v) => v,
            Err(e) => {
                return parser::error_record(self.name(), line, format!("JSON decode error: {e}"));
            }
        };
        let Value::Object(data) = data else {
            return parser::error_record(self.name(), line, "not a JSON object");
        };

        let api_version = data
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if !api_version.contains("audit.k8s.io") {
            return parser::error_record(self.name(), line, "not a Kubernetes audit log");
        }

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "kubernetes_audit".to_string();
        record.parser_confidence = 1.0;
        record.structured_data = data.clone();

        let verb = data.get("verb").and_then(|v| v.as_str()).unwrap_or("");
        let uri = data
            .get("requestURI")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        record.message = format!("{} {}", verb.to_uppercase(), uri);

        for ts_field in ["stageTimestamp", "requestReceivedTimestamp"] {
            if let Some(ts) = data.get(ts_field).and_then(|v| v.as_str()) {
                if let Some(parsed) = parser::parse_timestamp(ts) {
                    record.timestamp = Some(parsed);
                    record.timestamp_precision = parser::detect_precision(ts);
                    break;
                }
            }
        }

        let code = data
            .get("responseStatus")
            .and_then(|v| v.get("code"))
            .and_then(|v| v.as_u64())
            .unwrap_or(200) as u16;
        record.level = parser::level_from_status(code);

        record.correlation.request_id = data
            .get("auditID")
            .and_then(|v| v.as_str())
            .map(String::from);

        if let Some(user) = data.get("user").and_then(|v| v.as_object()) {
            record.correlation.user_id = user
                .get("username")
                .and_then(|v| v.as_str())
                .map(String::from);
            record.structured_data.insert(
                "user_groups".to_string(),
                user.get("groups").cloned().unwrap_or(Value::Array(vec![])),
            );
        }

        if let Some(ip) = data
            .get("sourceIPs")
            .and_then(|v| v.as_array())
            .and_then(|ips| ips.first())
        {
            record
                .structured_data
                .insert("source_ip".to_string(), ip.clone());
        }

        record
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
            if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(line) {
                let api = data
                    .get("apiVersion")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if api.contains("audit.k8s.io") {
                    score += 1.0;
                } else if data.get("kind").and_then(|v| v.as_str()) == Some("Event")
                    && data.contains_key("auditID")
                {
                    score += 0.8;
                }
            }
        }
        (score / sample.len() as f64).min(1.0)
    }
}

/// `kubectl get events` tabular output: AGE TYPE REASON OBJECT MESSAGE.
static EVENT_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+(Normal|Warning)\s+(\w+)\s+(\S+)\s+(.*)$").unwrap());

fn event_level(event_type: &str) -> LogLevel {
    match event_type {
        "Warning" => LogLevel::Warning,
        _ => LogLevel::Info,
    }
}

pub struct KubernetesEventParser;

impl KubernetesEventParser {
    fn parse_table(&self, line: &str, caps: &regex::Captures<'_>) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "kubernetes_event_table".to_string();
        record.parser_confidence = 0.9;

        let (age, event_type, reason, object, message) =
            (&caps[1], &caps[2], &caps[3], &caps[4], &caps[5]);
        record.level = event_level(event_type);
        record.message = format!("[{reason}] {object}: {message}");

        record.structured_data = Map::from_iter([
            ("age".to_string(), Value::String(age.to_string())),
            ("type".to_string(), Value::String(event_type.to_string())),
            ("reason".to_string(), Value::String(reason.to_string())),
            ("object".to_string(), Value::String(object.to_string())),
            ("message".to_string(), Value::String(message.to_string())),
        ]);

        if let Some((kind, name)) = object.split_once('/') {
            record
                .structured_data
                .insert("object_kind".to_string(), Value::String(kind.to_string()));
            record
                .structured_data
                .insert("object_name".to_string(), Value::String(name.to_string()));
        }

        record
    }

    fn parse_json(&self, line: &str, data: Map<String, Value>) -> LogRecord {
        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "kubernetes_event_json".to_string();
        record.parser_confidence = 1.0;
        record.structured_data = data.clone();

        let reason = data.get("reason").and_then(|v| v.as_str()).unwrap_or("");
        let message = data.get("message").and_then(|v| v.as_str()).unwrap_or("");
        let empty = Map::new();
        let obj = data
            .get("involvedObject")
            .and_then(|v| v.as_object())
            .unwrap_or(&empty);
        let kind = obj.get("kind").and_then(|v| v.as_str()).unwrap_or("");
        let name = obj.get("name").and_then(|v| v.as_str()).unwrap_or("");
        record.message = format!("[{reason}] {kind}/{name}: {message}");

        let event_type = data.get("type").and_then(|v| v.as_str()).unwrap_or("Normal");
        record.level = event_level(event_type);

        for ts_field in ["lastTimestamp", "firstTimestamp", "eventTime"] {
            if let Some(ts) = data.get(ts_field).and_then(|v| v.as_str()) {
                if let Some(parsed) = parser::parse_timestamp(ts) {
                    record.timestamp = Some(parsed);
                    break;
                }
            }
        }

        record.source.namespace = obj
            .get("namespace")
            .and_then(|v| v.as_str())
            .map(String::from);
        if kind == "Pod" {
            record.source.pod_name = Some(name.to_string());
        }

        record
    }
}

impl LogParser for KubernetesEventParser {
    fn name(&self) -> &'static str {
        "kubernetes_event"
    }

    fn supported_formats(&self) -> &'static [&'static str] {
        &["kubernetes_event", "k8s_event"]
    }

    fn parse_line(&self, line: &str) -> LogRecord {
        let stripped = line.trim();

        // Column headers from kubectl output.
        if stripped.starts_with("LAST SEEN") || stripped.starts_with("NAMESPACE") {
            let mut record = LogRecord::new(line);
            record.parser_name = self.name().to_string();
            record.format_detected = "kubernetes_event".to_string();
            record.message = stripped.to_string();
            record.level = LogLevel::Unknown;
            record.parser_confidence = 0.3;
            return record;
        }

        if stripped.starts_with('{') {
            if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(stripped) {
                return self.parse_json(line, data);
            }
        }

        if let Some(caps) = EVENT_TABLE_RE.captures(stripped) {
            return self.parse_table(line, &caps);
        }

        let mut record = LogRecord::new(line);
        record.parser_name = self.name().to_string();
        record.format_detected = "kubernetes_event".to_string();
        record.parser_confidence = 0.3;
        record.message = stripped.to_string();
        record.level = parser::infer_level_from_message(stripped);
        record
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
            if EVENT_TABLE_RE.is_match(line) {
                score += 1.0;
            } else if line.starts_with("LAST SEEN") {
                score += 0.5;
            }
            if let Ok(Value::Object(data)) = serde_json::from_str::<Value>(line) {
                if data.get("kind").and_then(|v| v.as_str()) == Some("Event")
                    || data.contains_key("involvedObject")
                {
                    score += 1.0;
                }
            }
        }
        (score / sample.len() as f64).min(1.0)
    }
}
