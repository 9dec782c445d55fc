//! Weighted-signature format detection.
//!
//! Each signature scores a sample of lines: JSON-structure ratio (for
//! JSON-shaped formats), anchored magic patterns, and looser secondary
//! patterns, all scaled by the signature weight. The best score wins and is
//! normalized to a confidence in [0, 1].

use std::path::Path;

use regex::Regex;
use serde_json::Value;

use crate::security::DETECT_SAMPLE_SIZE;
use crate::source::{FileSource, LineSource};

/// A format-recognition rule.
pub struct Signature {
    pub name: &'static str,
    pub description: &'static str,
    magic: Vec<Regex>,
    line: Vec<Regex>,
    pub is_json: bool,
    pub weight: f64,
    /// Advisory (min, max) line length for this format.
    pub typical_line_length: (usize, usize),
    /// Name of the parser bound to this format.
    pub parser: &'static str,
}

impl Signature {
    pub fn new(
        name: &'static str,
        description: &'static str,
        magic_patterns: &[&str],
        line_patterns: &[&str],
        is_json: bool,
        weight: f64,
        parser: &'static str,
    ) -> Signature {
        // Invalid patterns are skipped rather than failing construction.
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect::<Vec<_>>()
        };
        Signature {
            name,
            description,
            magic: compile(magic_patterns),
            line: compile(line_patterns),
            is_json,
            weight,
            typical_line_length: (50, 500),
            parser,
        }
    }
}

/// The builtin signature table, in priority order.
pub fn builtin_signatures() -> Vec<Signature> {
    vec![
        Signature::new(
            "json_structured",
            "JSON-formatted structured logs (JSONL/NDJSON)",
            &[r#"^\s*\{.*"(timestamp|time|@timestamp|ts|datetime|created|level|severity|msg|message)""#],
            &[r"^\s*\{.*\}\s*$"],
            true,
            1.5,
            "json",
        ),
        Signature::new(
            "apache_combined",
            "Apache Combined Log Format",
            &[r#"^\S+\s+\S+\s+\S+\s+\[[\d]{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}\s+[+-]\d{4}\]\s+"[A-Z]+\s+\S+.*"\s+\d{3}\s+\d+\s+"[^"]*"\s+"[^"]*""#],
            &[
                r"\[[\d]{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}\s+[+-]\d{4}\]",
                r#""[A-Z]+ .+ HTTP/[\d.]+""#,
            ],
            false,
            1.3,
            "apache_combined",
        ),
        Signature::new(
            "apache_common",
            "Apache Common Log Format (CLF)",
            &[r#"^\S+\s+\S+\s+\S+\s+\[[\d]{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}\s+[+-]\d{4}\]\s+"[A-Z]+\s+\S+.*"\s+\d{3}\s+\d+$"#],
            &[r"\[[\d]{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}"],
            false,
            1.2,
            "apache_common",
        ),
        Signature::new(
            "nginx_access",
            "Nginx default access log format",
            &[r#"^\S+\s+-\s+\S+\s+\[[\d]{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}\s+[+-]\d{4}\]\s+"[A-Z]+"#],
            &[
                r"\[[\d]{2}/\w{3}/\d{4}:\d{2}:\d{2}:\d{2}",
                r#""[A-Z]+ .+ HTTP/[\d.]+""#,
            ],
            false,
            1.2,
            "nginx_access",
        ),
        Signature::new(
            "nginx_error",
            "Nginx error log format",
            &[r"^\d{4}/\d{2}/\d{2}\s+\d{2}:\d{2}:\d{2}\s+\[(emerg|alert|crit|error|warn|notice|info|debug)\]"],
            &[
                r"^\d{4}/\d{2}/\d{2}\s+\d{2}:\d{2}:\d{2}",
                r"\[(emerg|alert|crit|error|warn|notice|info|debug)\]",
            ],
            false,
            1.3,
            "nginx_error",
        ),
        Signature::new(
            "syslog_rfc5424",
            "Syslog RFC 5424 format",
            &[r"^<\d{1,3}>1\s+\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}"],
            &[
                r"^<\d{1,3}>1\s+",
                r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?",
            ],
            false,
            1.4,
            "syslog_rfc5424",
        ),
        Signature::new(
            "syslog_rfc3164",
            "Syslog RFC 3164 (BSD) format",
            &[r"^<\d{1,3}>[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}"],
            &[
                r"^[A-Z][a-z]{2}\s+\d{1,2}\s+\d{2}:\d{2}:\d{2}\s+\S+",
                r"^<\d{1,3}>",
            ],
            false,
            1.2,
            "syslog_rfc3164",
        ),
        Signature::new(
            "python_logging",
            "Python logging default format",
            &[
                r"^\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2},\d{3}\s+-\s+\S+\s+-\s+(DEBUG|INFO|WARNING|ERROR|CRITICAL)",
                r"^\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2},\d{3}\s+\S+\s+(DEBUG|INFO|WARNING|ERROR|CRITICAL)",
            ],
            &[
                r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2},\d{3}",
                r"(DEBUG|INFO|WARNING|ERROR|CRITICAL)",
            ],
            false,
            1.3,
            "python_logging",
        ),
        Signature::new(
            "generic",
            "Generic log format (fallback)",
            &[],
            &[r"^\d{4}[-/]\d{2}[-/]\d{2}", r"\d{2}:\d{2}:\d{2}"],
            false,
            0.5,
            "generic",
        ),
    ]
}

/// Scores a sample of lines against every signature and reports the ranked
/// formats with normalized confidence.
pub struct FormatDetector {
    signatures: Vec<Signature>,
    sample_size: usize,
}

impl FormatDetector {
    pub fn new() -> FormatDetector {
        Self::with_signatures(builtin_signatures())
    }

    pub fn with_signatures(signatures: Vec<Signature>) -> FormatDetector {
        FormatDetector {
            signatures,
            sample_size: DETECT_SAMPLE_SIZE,
        }
    }

    fn sample<'a>(&self, lines: &'a [String]) -> Vec<&'a str> {
        lines
            .iter()
            .take(self.sample_size)
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect()
    }

    fn json_object_ratio(sample: &[&str]) -> f64 {
        if sample.is_empty() {
            return 0.0;
        }
        let count = sample
            .iter()
            .filter(|line| {
                line.starts_with('{')
                    && line.ends_with('}')
                    && serde_json::from_str::<Value>(line).is_ok()
            })
            .count();
        count as f64 / sample.len() as f64
    }

    fn score_signature(&self, sig: &Signature, sample: &[&str]) -> f64 {
        let mut score = 0.0;

        if sig.is_json {
            let json_ratio = Self::json_object_ratio(sample);
            if json_ratio <= 0.5 {
                // Claims to be JSON but the sample is not.
                return 0.0;
            }
            score += json_ratio * sig.weight * 2.0;
        }

        let magic_matches = sample
            .iter()
            .filter(|line| sig.magic.iter().any(|p| p.is_match(line)))
            .count();
        if magic_matches > 0 {
            score += magic_matches as f64 / sample.len() as f64 * sig.weight * 3.0;
        }

        let line_matches = sample
            .iter()
            .filter(|line| sig.line.iter().any(|p| p.is_match(line)))
            .count();
        if line_matches > 0 {
            score += line_matches as f64 / sample.len() as f64 * sig.weight * 1.0;
        }

        score
    }

    /// Best-matching format for the sample, with confidence in [0, 1].
    /// Ties between equal scores resolve to the earlier signature.
    pub fn detect(&self, lines: &[String]) -> (String, f64) {
        let ranked = self.detect_all(lines);
        ranked.into_iter().next().unwrap_or(("unknown".to_string(), 0.0))
    }

    /// All matching formats ranked by confidence, best first.
    pub fn detect_all(&self, lines: &[String]) -> Vec<(String, f64)> {
        let sample = self.sample(lines);
        if sample.is_empty() {
            return vec![("unknown".to_string(), 0.0)];
        }

        let scores: Vec<(&'static str, f64)> = self
            .signatures
            .iter()
            .filter_map(|sig| {
                let score = self.score_signature(sig, &sample);
                (score > 0.0).then_some((sig.name, score))
            })
            .collect();

        if scores.is_empty() {
            return vec![("generic".to_string(), 0.3)];
        }

        let max_score = scores.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);

        let mut ranked: Vec<(String, f64)> = scores
            .into_iter()
            .map(|(name, score)| (name.to_string(), (score / max_score).min(1.0)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Detect from the first lines of a file; I/O trouble reports unknown.
    pub fn detect_file(&self, path: impl AsRef<Path>) -> (String, f64) {
        let source = match FileSource::open(path) {
            Ok(source) => source,
            Err(_) => return ("unknown".to_string(), 0.0),
        };
        let lines: Vec<String> = Box::new(source)
            .read_lines()
            .take(self.sample_size)
            .filter_map(Result::ok)
            .collect();
        self.detect(&lines)
    }
}

impl Default for FormatDetector {
    fn default() -> Self {
        FormatDetector::new()
    }
}
