//! Parser registry: name and format-alias lookup, plus best-parser search.
//!
//! The registry is populated once at startup and read-only afterwards, so the
//! shared instance is safe to use from anywhere.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::parser::LogParser;
use crate::parsers;

pub struct ParserRegistry {
    parsers: Vec<Box<dyn LogParser>>,
    by_name: HashMap<&'static str, usize>,
    by_format: HashMap<&'static str, usize>,
}

impl ParserRegistry {
    pub fn new() -> ParserRegistry {
        ParserRegistry {
            parsers: Vec::new(),
            by_name: HashMap::new(),
            by_format: HashMap::new(),
        }
    }

    /// Registry populated with every builtin parser.
    pub fn with_builtins() -> ParserRegistry {
        let mut registry = ParserRegistry::new();
        for parser in parsers::builtin_parsers() {
            registry.register(parser);
        }
        registry
    }

    /// The process-wide registry, built on first use and immutable after.
    pub fn shared() -> &'static ParserRegistry {
        static SHARED: OnceLock<ParserRegistry> = OnceLock::new();
        SHARED.get_or_init(ParserRegistry::with_builtins)
    }

    /// Index a parser under its name and every alias it claims.
    pub fn register(&mut self, parser: Box<dyn LogParser>) {
        let index = self.parsers.len();
        self.by_name.insert(parser.name(), index);
        for format in parser.supported_formats() {
            self.by_format.insert(format, index);
        }
        self.parsers.push(parser);
    }

    /// Resolve a format alias or a parser name (alias wins first).
    pub fn get_parser(&self, key: &str) -> Option<&dyn LogParser> {
        self.by_format
            .get(key)
            .or_else(|| self.by_name.get(key))
            .map(|&index| self.parsers[index].as_ref())
    }

    /// The parser with the highest `can_parse` score over the sample.
    pub fn get_best_parser(&self, sample: &[String]) -> Option<(&dyn LogParser, f64)> {
        let mut best: Option<(&dyn LogParser, f64)> = None;
        for parser in &self.parsers {
            let confidence = parser.can_parse(sample);
            if best.map(|(_, c)| confidence > c).unwrap_or(true) {
                best = Some((parser.as_ref(), confidence));
            }
        }
        best
    }

    pub fn list_parsers(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    pub fn list_formats(&self) -> Vec<&'static str> {
        let mut formats: Vec<&'static str> = self.by_format.keys().copied().collect();
        formats.sort_unstable();
        formats
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        ParserRegistry::new()
    }
}
