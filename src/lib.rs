//! logweave: detect, parse, normalize, and correlate logs from any format.
//!
//! The pipeline: a [`source`] emits lines, the [`detect`] engine picks a
//! format from a sample, the matching [`parsers`] converter turns every line
//! into a [`record::LogRecord`], records flow through the [`normalize`]
//! pipeline, and multi-source work is merged and grouped by [`correlate`]
//! strategies.
//!
//! ```no_run
//! let (format, confidence) = logweave::detect_format("access.log");
//! let records = logweave::parse("access.log", Some(format.as_str())).unwrap();
//! for record in &records {
//!     if record.is_error() {
//!         println!("{}", record.message);
//!     }
//! }
//! ```

pub mod correlate;
pub mod detect;
pub mod enrich;
mod error;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod parsers;
pub mod record;
pub mod registry;
pub mod security;
pub mod source;

use std::path::Path;

pub use correlate::{
    CorrelationGroup, CorrelationResult, CorrelationStats, CorrelationStrategy,
    MultiStrategyCorrelation, SessionCorrelation, SharedIdCorrelation, TimestampMerge,
    WindowCorrelation, merge_by_timestamp,
};
pub use detect::{FormatDetector, Signature};
pub use error::Error;
pub use parser::LogParser;
pub use record::{
    CorrelationIds, HttpInfo, LogLevel, LogRecord, NetworkInfo, ParseSummary, SourceInfo,
    TimestampPrecision,
};
pub use registry::ParserRegistry;
pub use source::{
    ChunkedFileSource, FileSource, LargeFileSource, LineSource, PeekStdinSource, ProgressFn,
    SourceError, StdinSource,
};

use correlate::{DEFAULT_BUFFER_SIZE, RecordIter};

/// Detect the log format of a file. Confidence is in [0, 1].
pub fn detect_format(path: impl AsRef<Path>) -> (String, f64) {
    FormatDetector::new().detect_file(path)
}

fn resolve_parser(format: &str) -> Option<&'static dyn LogParser> {
    let registry = ParserRegistry::shared();
    registry
        .get_parser(format)
        .or_else(|| registry.get_parser("generic"))
}

/// Parse a log file into records, detecting the format when none is given.
/// Unknown format names fall back to the generic parser.
pub fn parse(path: impl AsRef<Path>, format: Option<&str>) -> Result<Vec<LogRecord>, Error> {
    let path = path.as_ref();
    let format_name = match format {
        Some(f) => f.to_string(),
        None => detect_format(path).0,
    };
    let parser =
        resolve_parser(&format_name).ok_or_else(|| Error::UnknownFormat(format_name.clone()))?;

    let source = FileSource::open(path)?;
    let file_path = path.display().to_string();
    let mut records = Vec::new();
    let mut line_number = 0u64;
    for line in Box::new(source).read_lines() {
        let line = line?;
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut record = parser.parse_line(trimmed);
        record.source.file_path = Some(file_path.clone());
        record.source.line_number = Some(line_number);
        records.push(record);
    }
    Ok(records)
}

/// Batch parse with detection metadata and error counts attached.
pub fn parse_summary(
    path: impl AsRef<Path>,
    format: Option<&str>,
) -> Result<ParseSummary, Error> {
    let path = path.as_ref();
    let (format_name, confidence) = match format {
        Some(f) => (f.to_string(), 1.0),
        None => detect_format(path),
    };
    let records = parse(path, Some(&format_name))?;
    Ok(ParseSummary::new(
        records,
        format_name,
        confidence,
        Some(path.display().to_string()),
    ))
}

/// Stream-parse a file with minimal memory. The format is required (no
/// detection, no generic fallback); a progress callback switches to the
/// chunked source, and files over the threshold read through a memory map.
pub fn stream_parse(
    path: impl AsRef<Path>,
    format: &str,
    progress: Option<ProgressFn>,
) -> Result<Box<dyn Iterator<Item = LogRecord>>, Error> {
    let path = path.as_ref();
    let parser = ParserRegistry::shared()
        .get_parser(format)
        .ok_or_else(|| Error::UnknownFormat(format.to_string()))?;

    let source: Box<dyn LineSource> = match progress {
        Some(callback) => Box::new(ChunkedFileSource::open(path, Some(callback))?),
        None => source::open_path_source(path)?,
    };

    let file_path = path.display().to_string();
    let iter = source
        .read_lines()
        .map_while(|result| match result {
            Ok(line) => Some(line),
            Err(e) => {
                tracing::warn!(error = %e, "stopping stream");
                None
            }
        })
        .enumerate()
        .filter_map(move |(index, line)| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            let mut record = parser.parse_line(trimmed);
            record.source.file_path = Some(file_path.clone());
            record.source.line_number = Some(index as u64 + 1);
            Some(record)
        });
    Ok(Box::new(iter))
}

fn build_strategies(
    strategy: &str,
    window_seconds: f64,
) -> Result<Vec<Box<dyn CorrelationStrategy>>, Error> {
    let mut strategies: Vec<Box<dyn CorrelationStrategy>> = Vec::new();
    if matches!(strategy, "request_id" | "all") {
        strategies.push(Box::new(SharedIdCorrelation::new()));
    }
    if matches!(strategy, "timestamp" | "all") {
        strategies.push(Box::new(WindowCorrelation::new(window_seconds)));
    }
    if matches!(strategy, "session" | "all") {
        strategies.push(Box::new(SessionCorrelation::new()));
    }
    if strategies.is_empty() {
        return Err(Error::Config(format!(
            "unknown correlation strategy: {strategy}"
        )));
    }
    Ok(strategies)
}

/// Correlate records across files: parse each source, merge by timestamp,
/// then run the selected strategies (`request_id`, `timestamp`, `session`,
/// or `all` in that order) with the claimed-record rule.
pub fn correlate(
    paths: &[impl AsRef<Path>],
    strategy: &str,
    format: Option<&str>,
    window_seconds: f64,
) -> Result<CorrelationResult, Error> {
    let strategies = build_strategies(strategy, window_seconds)?;
    if paths.is_empty() {
        return Ok(CorrelationResult::default());
    }

    let mut streams: Vec<RecordIter<'static>> = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let format_name = match format {
            Some(f) => f.to_string(),
            None => detect_format(path).0,
        };
        let parser = resolve_parser(&format_name)
            .ok_or_else(|| Error::UnknownFormat(format_name.clone()))?;

        let source = source::open_path_source(path)?;
        let file_path = path.display().to_string();
        let stream = source
            .read_lines()
            .map_while(|result| match result {
                Ok(line) => Some(line),
                Err(e) => {
                    tracing::warn!(error = %e, "stopping stream");
                    None
                }
            })
            .enumerate()
            .filter_map(move |(index, line)| {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let mut record = parser.parse_line(trimmed);
                record.source.file_path = Some(file_path.clone());
                record.source.line_number = Some(index as u64 + 1);
                Some(record)
            });
        streams.push(Box::new(stream));
    }

    let merged: Vec<LogRecord> = merge_by_timestamp(streams).collect();
    let mut orchestrator = MultiStrategyCorrelation::new(strategies);
    Ok(orchestrator.correlate(merged))
}

/// Correlation buffer size used by the orchestrator.
pub const CORRELATION_BUFFER_SIZE: usize = DEFAULT_BUFFER_SIZE;
