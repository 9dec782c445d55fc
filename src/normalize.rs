//! Record normalization: a chain of steps applied between parsing and
//! consumption, plus a predicate-gated variant.

use std::collections::HashMap;

use chrono::FixedOffset;
use serde_json::Value;
use thiserror::Error;

use crate::record::{LogLevel, LogRecord};

#[derive(Debug, Error)]
#[error("normalization step {step} failed: {message}")]
pub struct NormalizeError {
    pub step: &'static str,
    pub message: String,
}

/// One transformation over a record.
pub trait NormalizeStep {
    fn name(&self) -> &'static str;
    fn normalize(&mut self, record: LogRecord) -> Result<LogRecord, NormalizeError>;
}

/// Predicate gating a conditional step.
pub type StepPredicate = Box<dyn Fn(&LogRecord) -> bool>;

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineStats {
    pub processed: u64,
    pub errors: u64,
}

/// Ordered steps applied left-to-right. With `stop_on_error` unset (the
/// default) a failing record is passed through annotated with
/// `extra["normalization_error"]`; set, the error is surfaced to the caller.
pub struct Pipeline {
    steps: Vec<Box<dyn NormalizeStep>>,
    stop_on_error: bool,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn NormalizeStep>>) -> Pipeline {
        Pipeline {
            steps,
            stop_on_error: false,
            stats: PipelineStats::default(),
        }
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Pipeline {
        self.stop_on_error = stop;
        self
    }

    pub fn add_step(&mut self, step: Box<dyn NormalizeStep>) -> &mut Pipeline {
        self.steps.push(step);
        self
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = PipelineStats::default();
    }

    /// Apply every step to one record.
    pub fn process_one(&mut self, record: LogRecord) -> Result<LogRecord, NormalizeError> {
        let mut current = record;
        for step in &mut self.steps {
            current = step.normalize(current)?;
        }
        Ok(current)
    }

    /// Lazily process a stream. Per-record failures either surface as `Err`
    /// (stop_on_error) or yield the original record with an annotation.
    pub fn process<'a, I>(
        &'a mut self,
        records: I,
    ) -> impl Iterator<Item = Result<LogRecord, NormalizeError>> + 'a
    where
        I: Iterator<Item = LogRecord> + 'a,
    {
        records.map(move |record| {
            let original = record.clone();
            match self.process_one(record) {
                Ok(normalized) => {
                    self.stats.processed += 1;
                    Ok(normalized)
                }
                Err(e) => {
                    self.stats.errors += 1;
                    if self.stop_on_error {
                        Err(e)
                    } else {
                        let mut record = original;
                        record
                            .extra
                            .insert("normalization_error".to_string(), e.to_string().into());
                        Ok(record)
                    }
                }
            }
        })
    }
}

/// Pipeline variant with unconditional steps plus `(predicate, step)` pairs.
/// Always-steps run first; each conditional step sees the record as updated
/// by everything before it.
pub struct ConditionalPipeline {
    always: Vec<Box<dyn NormalizeStep>>,
    rules: Vec<(StepPredicate, Box<dyn NormalizeStep>)>,
}

impl ConditionalPipeline {
    pub fn new() -> ConditionalPipeline {
        ConditionalPipeline {
            always: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn always(mut self, step: Box<dyn NormalizeStep>) -> ConditionalPipeline {
        self.always.push(step);
        self
    }

    pub fn when(mut self, predicate: StepPredicate, step: Box<dyn NormalizeStep>) -> ConditionalPipeline {
        self.rules.push((predicate, step));
        self
    }

    pub fn process_one(&mut self, record: LogRecord) -> Result<LogRecord, NormalizeError> {
        let mut current = record;
        for step in &mut self.always {
            current = step.normalize(current)?;
        }
        for (predicate, step) in &mut self.rules {
            if predicate(&current) {
                current = step.normalize(current)?;
            }
        }
        Ok(current)
    }
}

impl Default for ConditionalPipeline {
    fn default() -> Self {
        ConditionalPipeline::new()
    }
}

/// Convert timestamps to a target zone. Zone-less inputs were stamped UTC at
/// parse time, so conversion is all that remains.
pub struct TimestampNormalizer {
    target: FixedOffset,
}

impl TimestampNormalizer {
    pub fn new(target: FixedOffset) -> TimestampNormalizer {
        TimestampNormalizer { target }
    }

    pub fn utc() -> TimestampNormalizer {
        TimestampNormalizer {
            target: FixedOffset::east_opt(0).expect("zero offset"),
        }
    }
}

impl NormalizeStep for TimestampNormalizer {
    fn name(&self) -> &'static str {
        "timestamp_normalizer"
    }

    fn normalize(&mut self, mut record: LogRecord) -> Result<LogRecord, NormalizeError> {
        if let Some(ts) = record.timestamp {
            record.timestamp = Some(ts.with_timezone(&self.target));
        }
        Ok(record)
    }
}

const LEVEL_HINT_FIELDS: &[&str] = &["level", "severity", "loglevel", "log_level", "priority"];

/// Recover a level for Unknown records from structured-data hints.
pub struct LevelNormalizer;

impl NormalizeStep for LevelNormalizer {
    fn name(&self) -> &'static str {
        "level_normalizer"
    }

    fn normalize(&mut self, mut record: LogRecord) -> Result<LogRecord, NormalizeError> {
        if record.level != LogLevel::Unknown {
            return Ok(record);
        }
        for field in LEVEL_HINT_FIELDS {
            if let Some(value) = record.structured_data.get(*field) {
                let hint = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                let level = LogLevel::parse(&hint);
                if level != LogLevel::Unknown {
                    record.level = level;
                    break;
                }
            }
        }
        Ok(record)
    }
}

/// Default canonical-name table: canonical key -> aliases.
fn default_field_mappings() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        ("timestamp", vec!["@timestamp", "time", "datetime", "ts", "date", "event_time"]),
        ("message", vec!["msg", "log", "text", "body", "content"]),
        ("level", vec!["severity", "loglevel", "log_level", "priority", "lvl"]),
        ("logger", vec!["logger_name", "name", "component", "module"]),
        ("thread", vec!["thread_name", "thread_id", "tid"]),
        ("host", vec!["hostname", "host_name", "server", "node"]),
        ("service", vec!["service_name", "app", "application", "app_name"]),
        ("request_id", vec!["requestId", "request-id", "x-request-id", "correlation_id"]),
        ("trace_id", vec!["traceId", "trace-id", "x-trace-id"]),
        ("user_id", vec!["userId", "user-id", "uid", "user"]),
        ("ip", vec!["client_ip", "clientip", "remote_addr", "source_ip", "src_ip"]),
        ("method", vec!["http_method", "request_method", "verb"]),
        ("path", vec!["url", "uri", "request_path", "endpoint"]),
        ("status", vec!["status_code", "http_status", "response_code", "code"]),
        ("duration", vec!["response_time", "latency", "elapsed", "took", "duration_ms"]),
    ]
}

/// Rewrite structured-data keys to canonical names.
pub struct FieldNormalizer {
    reverse: HashMap<String, String>,
    preserve_original: bool,
}

impl FieldNormalizer {
    pub fn new() -> FieldNormalizer {
        Self::with_mappings(Vec::new(), true)
    }

    /// Custom mappings merge over the defaults.
    pub fn with_mappings(
        custom: Vec<(String, Vec<String>)>,
        preserve_original: bool,
    ) -> FieldNormalizer {
        let mut reverse = HashMap::new();
        for (canonical, aliases) in default_field_mappings() {
            for alias in aliases {
                reverse.insert(alias.to_ascii_lowercase(), canonical.to_string());
            }
        }
        for (canonical, aliases) in custom {
            for alias in aliases {
                reverse.insert(alias.to_ascii_lowercase(), canonical.clone());
            }
        }
        FieldNormalizer {
            reverse,
            preserve_original,
        }
    }
}

impl Default for FieldNormalizer {
    fn default() -> Self {
        FieldNormalizer::new()
    }
}

impl NormalizeStep for FieldNormalizer {
    fn name(&self) -> &'static str {
        "field_normalizer"
    }

    fn normalize(&mut self, mut record: LogRecord) -> Result<LogRecord, NormalizeError> {
        if record.structured_data.is_empty() {
            return Ok(record);
        }
        let mut normalized = serde_json::Map::new();
        for (key, value) in std::mem::take(&mut record.structured_data) {
            match self.reverse.get(&key.to_ascii_lowercase()) {
                Some(canonical) => {
                    normalized.insert(canonical.clone(), value.clone());
                    if self.preserve_original && key != *canonical {
                        normalized.insert(format!("_original_{key}"), value);
                    }
                }
                None => {
                    normalized.insert(key, value);
                }
            }
        }
        record.structured_data = normalized;
        Ok(record)
    }
}
