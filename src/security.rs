//! Resource limits and input validators.
//!
//! Every unbounded input has an explicit cap here, and every cap failure is a
//! typed [`SecurityError`] rather than a generic panic. The validators are
//! applied unconditionally at the documented boundaries (sources, the JSON
//! parser, the CLI grep flag, CSV rendering).

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Maximum accepted line length, in UTF-8 bytes.
pub const MAX_LINE_LENGTH: usize = 10 * 1024 * 1024;
/// Maximum nesting depth accepted from JSON input.
pub const MAX_JSON_DEPTH: usize = 50;
/// Maximum accepted user-supplied regex pattern length.
pub const MAX_REGEX_LENGTH: usize = 1000;
/// Orphan records retained by shared-id correlation before dropping.
pub const MAX_ORPHAN_ENTRIES: usize = 10_000;
/// Distinct sessions tracked by session correlation before dropping.
pub const MAX_SESSION_GROUPS: usize = 100_000;
/// Reverse-DNS results cached by the hostname enricher.
pub const DNS_CACHE_SIZE: usize = 1000;
/// Lines buffered by the peeking stdin source.
pub const PEEK_LINES: usize = 50;
/// Lines sampled by format detection.
pub const DETECT_SAMPLE_SIZE: usize = 50;

/// Cell prefixes that spreadsheets interpret as formulas.
pub const CSV_FORMULA_PREFIXES: [char; 6] = ['=', '+', '-', '@', '\t', '\r'];

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("line too long: {length} bytes (max {max})")]
    LineLength { length: usize, max: usize },

    #[error("JSON nesting too deep: {depth} levels (max {max})")]
    JsonDepth { depth: usize, max: usize },

    #[error("regex pattern too long: {length} chars (max {max})")]
    RegexLength { length: usize, max: usize },

    #[error("invalid regex pattern: {0}")]
    RegexSyntax(#[from] regex::Error),

    #[error("regex pattern rejected: nested quantifiers may cause catastrophic backtracking")]
    RegexRedos { pattern: String },
}

impl SecurityError {
    /// Stable tag for the validation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityError::LineLength { .. } => "line_length",
            SecurityError::JsonDepth { .. } => "json_depth",
            SecurityError::RegexLength { .. } => "regex_length",
            SecurityError::RegexSyntax(_) => "regex_syntax",
            SecurityError::RegexRedos { .. } => "regex_redos",
        }
    }
}

/// Accept a line only when its UTF-8 byte length is within `max`.
pub fn validate_line_length(line: &str, max: usize) -> Result<(), SecurityError> {
    let length = line.len();
    if length > max {
        return Err(SecurityError::LineLength { length, max });
    }
    Ok(())
}

/// Reject decoded JSON values nested deeper than `max` levels.
pub fn validate_json_depth(value: &serde_json::Value, max: usize) -> Result<(), SecurityError> {
    fn walk(value: &serde_json::Value, depth: usize, max: usize) -> Result<(), SecurityError> {
        if depth > max {
            return Err(SecurityError::JsonDepth { depth, max });
        }
        match value {
            serde_json::Value::Object(map) => {
                for child in map.values() {
                    walk(child, depth + 1, max)?;
                }
            }
            serde_json::Value::Array(items) => {
                for child in items {
                    walk(child, depth + 1, max)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
    walk(value, 1, max)
}

/// Heuristics for nested unbounded quantifiers inside groups, the shape that
/// drives catastrophic backtracking.
static REDOS_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\(\?.*\+.*\+",
        r"\(\?.*\*.*\*",
        r"\([^)]*\+\)[^)]*\+",
        r"\([^)]*\*\)[^)]*\*",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("builtin redos pattern"))
    .collect()
});

/// Vet and compile a user-supplied regex pattern.
///
/// Rejects over-length patterns and nested-quantifier shapes before
/// compiling case-insensitively.
pub fn validate_regex_pattern(pattern: &str, max_len: usize) -> Result<Regex, SecurityError> {
    if pattern.len() > max_len {
        return Err(SecurityError::RegexLength {
            length: pattern.len(),
            max: max_len,
        });
    }
    if REDOS_PATTERNS.iter().any(|re| re.is_match(pattern)) {
        return Err(SecurityError::RegexRedos {
            pattern: pattern.to_string(),
        });
    }
    let compiled = RegexBuilder::new(pattern).case_insensitive(true).build()?;
    Ok(compiled)
}

/// Neutralize spreadsheet formula injection by prefixing trigger cells
/// with a single quote. All other cells pass through unchanged.
pub fn sanitize_csv_cell(cell: &str) -> String {
    match cell.chars().next() {
        Some(first) if CSV_FORMULA_PREFIXES.contains(&first) => format!("'{cell}"),
        _ => cell.to_string(),
    }
}

/// Report whether `path` is a symbolic link, returning the resolved target.
/// When `warn` is set, a notice goes to the diagnostic channel.
pub fn check_symlink(path: &Path, warn: bool) -> std::io::Result<Option<PathBuf>> {
    let meta = std::fs::symlink_metadata(path)?;
    if !meta.file_type().is_symlink() {
        return Ok(None);
    }
    let target = std::fs::canonicalize(path)?;
    if warn {
        tracing::warn!(
            path = %path.display(),
            target = %target.display(),
            "input path is a symbolic link"
        );
    }
    Ok(Some(target))
}
