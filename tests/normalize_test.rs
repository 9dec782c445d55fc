use chrono::FixedOffset;
use logweave::enrich::GeoEnricher;
use logweave::normalize::{
    ConditionalPipeline, FieldNormalizer, LevelNormalizer, NormalizeError, NormalizeStep,
    Pipeline, TimestampNormalizer,
};
use logweave::record::{LogLevel, LogRecord};
use std::io::Write;

use test_helpers::ts;

// ---------------------------------------------------------------------------
// Timestamp normalization
// ---------------------------------------------------------------------------

#[test]
fn test_timestamps_convert_to_utc() {
    let mut step = TimestampNormalizer::utc();
    let mut record = LogRecord::new("x");
    record.timestamp = Some(ts("2026-01-27T12:15:32+02:00"));

    let record = step.normalize(record).unwrap();
    let converted = record.timestamp.unwrap();
    assert_eq!(converted.offset().local_minus_utc(), 0);
    assert_eq!(converted, ts("2026-01-27T10:15:32Z"));
}

#[test]
fn test_timestamp_normalizer_custom_zone() {
    let plus_five = FixedOffset::east_opt(5 * 3600).unwrap();
    let mut step = TimestampNormalizer::new(plus_five);
    let mut record = LogRecord::new("x");
    record.timestamp = Some(ts("2026-01-27T10:00:00Z"));
    let record = step.normalize(record).unwrap();
    assert_eq!(record.timestamp.unwrap().offset().local_minus_utc(), 5 * 3600);
}

#[test]
fn test_missing_timestamp_passes_through() {
    let mut step = TimestampNormalizer::utc();
    let record = step.normalize(LogRecord::new("x")).unwrap();
    assert!(record.timestamp.is_none());
}

// ---------------------------------------------------------------------------
// Level normalization
// ---------------------------------------------------------------------------

#[test]
fn test_level_recovered_from_structured_data() {
    let mut step = LevelNormalizer;
    let mut record = LogRecord::new("x");
    record
        .structured_data
        .insert("severity".to_string(), "error".into());
    let record = step.normalize(record).unwrap();
    assert_eq!(record.level, LogLevel::Error);
}

#[test]
fn test_known_level_left_alone() {
    let mut step = LevelNormalizer;
    let mut record = LogRecord::new("x");
    record.level = LogLevel::Debug;
    record
        .structured_data
        .insert("severity".to_string(), "error".into());
    let record = step.normalize(record).unwrap();
    assert_eq!(record.level, LogLevel::Debug);
}

// ---------------------------------------------------------------------------
// Field normalization
// ---------------------------------------------------------------------------

#[test]
fn test_field_names_canonicalized() {
    let mut step = FieldNormalizer::new();
    let mut record = LogRecord::new("x");
    record.structured_data.insert("msg".to_string(), "hi".into());
    record
        .structured_data
        .insert("status_code".to_string(), 200.into());
    record
        .structured_data
        .insert("unrelated".to_string(), "kept".into());

    let record = step.normalize(record).unwrap();
    assert_eq!(record.structured_data["message"], "hi");
    assert_eq!(record.structured_data["_original_msg"], "hi");
    assert_eq!(record.structured_data["status"], 200);
    assert_eq!(record.structured_data["unrelated"], "kept");
}

#[test]
fn test_field_normalizer_without_preserve_original() {
    let mut step = FieldNormalizer::with_mappings(Vec::new(), false);
    let mut record = LogRecord::new("x");
    record.structured_data.insert("msg".to_string(), "hi".into());
    let record = step.normalize(record).unwrap();
    assert_eq!(record.structured_data["message"], "hi");
    assert!(!record.structured_data.contains_key("_original_msg"));
}

#[test]
fn test_field_normalizer_custom_mappings_merge() {
    let custom = vec![("tenant".to_string(), vec!["org".to_string()])];
    let mut step = FieldNormalizer::with_mappings(custom, false);
    let mut record = LogRecord::new("x");
    record.structured_data.insert("org".to_string(), "acme".into());
    record.structured_data.insert("msg".to_string(), "hi".into());
    let record = step.normalize(record).unwrap();
    assert_eq!(record.structured_data["tenant"], "acme");
    assert_eq!(record.structured_data["message"], "hi");
}

// ---------------------------------------------------------------------------
// Pipeline behavior
// ---------------------------------------------------------------------------

struct FailingStep;

impl NormalizeStep for FailingStep {
    fn name(&self) -> &'static str {
        "failing_step"
    }

    fn normalize(&mut self, _record: LogRecord) -> Result<LogRecord, NormalizeError> {
        Err(NormalizeError {
            step: self.name(),
            message: "synthetic failure".to_string(),
        })
    }
}

#[test]
fn test_pipeline_applies_steps_in_order() {
    let mut pipeline = Pipeline::new(vec![
        Box::new(TimestampNormalizer::utc()),
        Box::new(LevelNormalizer),
    ]);
    let mut record = LogRecord::new("x");
    record.timestamp = Some(ts("2026-01-27T12:00:00+02:00"));
    record
        .structured_data
        .insert("level".to_string(), "warn".into());

    let record = pipeline.process_one(record).unwrap();
    assert_eq!(record.timestamp.unwrap().offset().local_minus_utc(), 0);
    assert_eq!(record.level, LogLevel::Warning);
}

#[test]
fn test_pipeline_annotates_failures_by_default() {
    let mut pipeline = Pipeline::new(vec![Box::new(FailingStep)]);
    let records = vec![LogRecord::new("a"), LogRecord::new("b")];
    let output: Vec<LogRecord> = pipeline
        .process(records.into_iter())
        .map(Result::unwrap)
        .collect();

    assert_eq!(output.len(), 2);
    for record in &output {
        let note = record.extra["normalization_error"].as_str().unwrap();
        assert!(note.contains("synthetic failure"));
    }
    assert_eq!(pipeline.stats().errors, 2);
    assert_eq!(pipeline.stats().processed, 0);
}

#[test]
fn test_pipeline_stop_on_error_surfaces_failure() {
    let mut pipeline = Pipeline::new(vec![Box::new(FailingStep)]).with_stop_on_error(true);
    let records = vec![LogRecord::new("a")];
    let results: Vec<_> = pipeline.process(records.into_iter()).collect();
    assert!(results[0].is_err());
}

#[test]
fn test_pipeline_counts_processed_records() {
    let mut pipeline = Pipeline::new(vec![Box::new(LevelNormalizer)]);
    let records = vec![LogRecord::new("a"), LogRecord::new("b"), LogRecord::new("c")];
    let count = pipeline
        .process(records.into_iter())
        .filter(Result::is_ok)
        .count();
    assert_eq!(count, 3);
    assert_eq!(pipeline.stats().processed, 3);
    assert_eq!(pipeline.stats().errors, 0);
}

// ---------------------------------------------------------------------------
// Conditional pipeline
// ---------------------------------------------------------------------------

struct TagStep(&'static str);

impl NormalizeStep for TagStep {
    fn name(&self) -> &'static str {
        "tag_step"
    }

    fn normalize(&mut self, mut record: LogRecord) -> Result<LogRecord, NormalizeError> {
        record.extra.insert(self.0.to_string(), true.into());
        Ok(record)
    }
}

#[test]
fn test_conditional_pipeline_gates_on_predicate() {
    let mut pipeline = ConditionalPipeline::new()
        .always(Box::new(TagStep("seen")))
        .when(
            Box::new(|record: &LogRecord| record.level >= LogLevel::Error),
            Box::new(TagStep("errorish")),
        );

    let mut error_record = LogRecord::new("a");
    error_record.level = LogLevel::Critical;
    let out = pipeline.process_one(error_record).unwrap();
    assert_eq!(out.extra["seen"], true);
    assert_eq!(out.extra["errorish"], true);

    let mut info_record = LogRecord::new("b");
    info_record.level = LogLevel::Info;
    let out = pipeline.process_one(info_record).unwrap();
    assert_eq!(out.extra["seen"], true);
    assert!(!out.extra.contains_key("errorish"));
}

#[test]
fn test_conditional_predicate_sees_updated_record() {
    // The always-step tags the record, the predicate keys off that tag.
    let mut pipeline = ConditionalPipeline::new()
        .always(Box::new(TagStep("first")))
        .when(
            Box::new(|record: &LogRecord| record.extra.contains_key("first")),
            Box::new(TagStep("second")),
        );
    let out = pipeline.process_one(LogRecord::new("x")).unwrap();
    assert_eq!(out.extra["second"], true);
}

// ---------------------------------------------------------------------------
// Geo enrichment (offline database)
// ---------------------------------------------------------------------------

#[test]
fn test_geo_enricher_with_database() {
    let mut db = tempfile::NamedTempFile::new().unwrap();
    write!(
        db,
        r#"{{"8.8.8.8": {{"country": "US", "city": "Mountain View", "latitude": 37.4, "longitude": -122.1}}}}"#
    )
    .unwrap();
    db.flush().unwrap();

    let mut step = GeoEnricher::new(Some(db.path()));
    let mut record = LogRecord::new("x");
    record
        .structured_data
        .insert("client_ip".to_string(), "8.8.8.8".into());
    let record = step.normalize(record).unwrap();
    assert_eq!(record.structured_data["geo"]["country"], "US");
    assert_eq!(record.structured_data["geo"]["city"], "Mountain View");
}

#[test]
fn test_geo_enricher_without_database_is_inert() {
    let mut step = GeoEnricher::new(None);
    let mut record = LogRecord::new("x");
    record
        .structured_data
        .insert("client_ip".to_string(), "8.8.8.8".into());
    let record = step.normalize(record).unwrap();
    assert!(!record.structured_data.contains_key("geo"));
}
