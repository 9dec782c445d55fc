//! Cross-source correlation: timestamp-ordered k-way merging and the three
//! grouping strategies (shared identifier, sliding time window, session).

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use chrono::{DateTime, Duration, FixedOffset};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::record::LogRecord;
use crate::security::{MAX_ORPHAN_ENTRIES, MAX_SESSION_GROUPS};

/// Default cap on records buffered by a strategy before forced emission.
pub const DEFAULT_BUFFER_SIZE: usize = 10_000;

pub type RecordIter<'a> = Box<dyn Iterator<Item = LogRecord> + 'a>;
pub type GroupIter<'a> = Box<dyn Iterator<Item = CorrelationGroup> + 'a>;

/// Identifier used to attribute a record to a source stream.
fn record_source_id(record: &LogRecord) -> String {
    record
        .source
        .file_path
        .clone()
        .or_else(|| record.source.service.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

/// A set of records related under one strategy-assigned key.
/// Sources and time range derive from the members at construction.
#[derive(Debug, Clone)]
pub struct CorrelationGroup {
    pub id: Uuid,
    pub correlation_key: String,
    pub correlation_type: String,
    pub records: Vec<LogRecord>,
    pub sources: BTreeSet<String>,
    pub time_range: Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)>,
    pub metadata: Map<String, Value>,
}

impl CorrelationGroup {
    pub fn new(
        correlation_key: impl Into<String>,
        correlation_type: impl Into<String>,
        records: Vec<LogRecord>,
        metadata: Map<String, Value>,
    ) -> CorrelationGroup {
        let sources: BTreeSet<String> = records.iter().map(record_source_id).collect();
        let timestamps: Vec<_> = records.iter().filter_map(|r| r.timestamp).collect();
        let time_range = match (timestamps.iter().min(), timestamps.iter().max()) {
            (Some(min), Some(max)) => Some((*min, *max)),
            _ => None,
        };
        CorrelationGroup {
            id: Uuid::new_v4(),
            correlation_key: correlation_key.into(),
            correlation_type: correlation_type.into(),
            records,
            sources,
            time_range,
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Members with timestamps, sorted chronologically.
    pub fn timeline(&self) -> Vec<&LogRecord> {
        let mut timed: Vec<&LogRecord> =
            self.records.iter().filter(|r| r.timestamp.is_some()).collect();
        timed.sort_by_key(|r| r.timestamp);
        timed
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.time_range
            .map(|(start, end)| (end - start).num_milliseconds() as f64)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CorrelationStats {
    pub total_groups: usize,
    pub total_entries: usize,
    pub correlated_entries: usize,
    pub orphan_entries: usize,
    pub correlation_rate: f64,
    pub sources_covered: usize,
    pub avg_group_size: f64,
}

/// Groups plus the records no strategy claimed, with statistics computed at
/// construction.
#[derive(Debug)]
pub struct CorrelationResult {
    pub groups: Vec<CorrelationGroup>,
    pub orphans: Vec<LogRecord>,
    pub statistics: CorrelationStats,
}

impl CorrelationResult {
    pub fn new(groups: Vec<CorrelationGroup>, orphans: Vec<LogRecord>) -> CorrelationResult {
        let correlated_entries: usize = groups.iter().map(|g| g.len()).sum();
        let total_entries = correlated_entries + orphans.len();
        let sources_covered = groups
            .iter()
            .flat_map(|g| g.sources.iter())
            .collect::<BTreeSet<_>>()
            .len();
        let statistics = CorrelationStats {
            total_groups: groups.len(),
            total_entries,
            correlated_entries,
            orphan_entries: orphans.len(),
            correlation_rate: if total_entries > 0 {
                correlated_entries as f64 / total_entries as f64
            } else {
                0.0
            },
            sources_covered,
            avg_group_size: if groups.is_empty() {
                0.0
            } else {
                correlated_entries as f64 / groups.len() as f64
            },
        };
        CorrelationResult {
            groups,
            orphans,
            statistics,
        }
    }
}

impl Default for CorrelationResult {
    fn default() -> Self {
        CorrelationResult::new(Vec::new(), Vec::new())
    }
}

struct MergeEntry {
    key: (Option<DateTime<FixedOffset>>, usize),
    record: LogRecord,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for MergeEntry {}
impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// K-way merge of per-source record streams into non-decreasing timestamp
/// order. Ties break by source index; records without timestamps sort before
/// everything so they drain first. Holds one record per source.
pub struct TimestampMerge<'a> {
    heap: BinaryHeap<Reverse<MergeEntry>>,
    sources: Vec<RecordIter<'a>>,
}

impl<'a> TimestampMerge<'a> {
    pub fn new(mut sources: Vec<RecordIter<'a>>) -> TimestampMerge<'a> {
        let mut heap = BinaryHeap::with_capacity(sources.len());
        for (index, source) in sources.iter_mut().enumerate() {
            if let Some(record) = source.next() {
                heap.push(Reverse(MergeEntry {
                    key: (record.timestamp, index),
                    record,
                }));
            }
        }
        TimestampMerge { heap, sources }
    }
}

impl Iterator for TimestampMerge<'_> {
    type Item = LogRecord;

    fn next(&mut self) -> Option<LogRecord> {
        let Reverse(entry) = self.heap.pop()?;
        let index = entry.key.1;
        if let Some(next) = self.sources[index].next() {
            self.heap.push(Reverse(MergeEntry {
                key: (next.timestamp, index),
                record: next,
            }));
        }
        Some(entry.record)
    }
}

/// Merge per-source record iterators by timestamp.
pub fn merge_by_timestamp(sources: Vec<RecordIter<'_>>) -> TimestampMerge<'_> {
    TimestampMerge::new(sources)
}

/// A correlation strategy forms related-record groups from a record stream.
pub trait CorrelationStrategy {
    fn name(&self) -> &'static str;

    /// Whether groups can be emitted before the whole input is seen.
    fn supports_streaming(&self) -> bool;

    fn correlate<'a>(&'a mut self, records: RecordIter<'a>, buffer_size: usize) -> GroupIter<'a>;
}

const DEFAULT_ID_FIELDS: &[&str] = &[
    "request_id",
    "trace_id",
    "correlation_id",
    "span_id",
    "transaction_id",
    "x_request_id",
];

/// Group records sharing a request/trace/correlation identifier.
pub struct SharedIdCorrelation {
    id_fields: Vec<String>,
    max_orphans: usize,
    orphans: Vec<LogRecord>,
    orphan_overflow_warned: bool,
}

impl SharedIdCorrelation {
    pub fn new() -> SharedIdCorrelation {
        Self::with_fields(DEFAULT_ID_FIELDS.iter().map(|s| s.to_string()).collect())
    }

    pub fn with_fields(id_fields: Vec<String>) -> SharedIdCorrelation {
        SharedIdCorrelation {
            id_fields,
            max_orphans: MAX_ORPHAN_ENTRIES,
            orphans: Vec::new(),
            orphan_overflow_warned: false,
        }
    }

    /// Records that carried no identifier, up to the orphan cap.
    pub fn orphans(&self) -> &[LogRecord] {
        &self.orphans
    }

    fn extract_id(&self, record: &LogRecord) -> Option<String> {
        let ids = &record.correlation;
        for id in [
            &ids.request_id,
            &ids.trace_id,
            &ids.correlation_id,
            &ids.session_id,
        ] {
            if let Some(value) = id {
                return Some(value.clone());
            }
        }
        for field in &self.id_fields {
            if let Some(value) = record.structured_data.get(field) {
                return Some(match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            }
        }
        None
    }

    fn retain_orphan(&mut self, record: LogRecord) {
        if self.orphans.len() < self.max_orphans {
            self.orphans.push(record);
        } else if !self.orphan_overflow_warned {
            tracing::warn!(
                max = self.max_orphans,
                "orphan record limit exceeded, further unidentified records are dropped"
            );
            self.orphan_overflow_warned = true;
        }
    }
}

impl Default for SharedIdCorrelation {
    fn default() -> Self {
        SharedIdCorrelation::new()
    }
}

impl CorrelationStrategy for SharedIdCorrelation {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn supports_streaming(&self) -> bool {
        // Grouping by id needs the full input.
        false
    }

    fn correlate<'a>(&'a mut self, records: RecordIter<'a>, buffer_size: usize) -> GroupIter<'a> {
        let mut emitted: Vec<CorrelationGroup> = Vec::new();
        let mut order: Vec<String> = Vec::new();
        let mut by_id: HashMap<String, Vec<LogRecord>> = HashMap::new();
        let mut count = 0usize;

        let mut emit = |order: &mut Vec<String>,
                        by_id: &mut HashMap<String, Vec<LogRecord>>,
                        emitted: &mut Vec<CorrelationGroup>| {
            for key in order.drain(..) {
                let members = by_id.remove(&key).unwrap_or_default();
                if members.len() > 1 {
                    emitted.push(CorrelationGroup::new(key, "request_id", members, Map::new()));
                }
            }
        };

        for record in records {
            count += 1;
            if count > buffer_size {
                // Memory cap reached, flush formed groups and start over.
                emit(&mut order, &mut by_id, &mut emitted);
                count = 0;
            }
            match self.extract_id(&record) {
                Some(id) => {
                    if !by_id.contains_key(&id) {
                        order.push(id.clone());
                    }
                    by_id.entry(id).or_default().push(record);
                }
                None => self.retain_orphan(record),
            }
        }
        emit(&mut order, &mut by_id, &mut emitted);

        Box::new(emitted.into_iter())
    }
}

/// Group records landing within a sliding time window of the window start.
/// Assumes roughly timestamp-ordered input, which the merge guarantees.
pub struct WindowCorrelation {
    window_seconds: f64,
    window: Duration,
    min_group_size: usize,
    require_multiple_sources: bool,
}

impl WindowCorrelation {
    pub fn new(window_seconds: f64) -> WindowCorrelation {
        let window = Duration::from_std(std::time::Duration::from_secs_f64(
            window_seconds.max(0.0),
        ))
        .unwrap_or_else(|_| Duration::seconds(1));
        WindowCorrelation {
            window_seconds,
            window,
            min_group_size: 2,
            require_multiple_sources: true,
        }
    }

    pub fn min_group_size(mut self, size: usize) -> WindowCorrelation {
        self.min_group_size = size;
        self
    }

    pub fn require_multiple_sources(mut self, require: bool) -> WindowCorrelation {
        self.require_multiple_sources = require;
        self
    }

    fn maybe_group(&self, members: Vec<LogRecord>) -> Option<CorrelationGroup> {
        if members.len() < self.min_group_size {
            return None;
        }
        if self.require_multiple_sources {
            let sources: BTreeSet<String> = members.iter().map(record_source_id).collect();
            if sources.len() < 2 {
                return None;
            }
        }
        let start = members.iter().filter_map(|r| r.timestamp).min()?;
        let mut metadata = Map::new();
        metadata.insert("window_seconds".to_string(), self.window_seconds.into());
        Some(CorrelationGroup::new(
            start.to_rfc3339(),
            "timestamp_window",
            members,
            metadata,
        ))
    }
}

struct WindowIter<'a> {
    strategy: &'a WindowCorrelation,
    records: RecordIter<'a>,
    buffer_size: usize,
    current: Vec<LogRecord>,
    window_start: Option<DateTime<FixedOffset>>,
    done: bool,
}

impl Iterator for WindowIter<'_> {
    type Item = CorrelationGroup;

    fn next(&mut self) -> Option<CorrelationGroup> {
        if self.done {
            return None;
        }
        loop {
            let Some(record) = self.records.next() else {
                self.done = true;
                let members = std::mem::take(&mut self.current);
                return self.strategy.maybe_group(members);
            };
            let Some(ts) = record.timestamp else {
                continue; // no timestamp, cannot be windowed
            };

            let mut ready: Option<CorrelationGroup> = None;
            match self.window_start {
                None => {
                    self.window_start = Some(ts);
                    self.current.push(record);
                }
                Some(start) if ts - start <= self.strategy.window => {
                    self.current.push(record);
                }
                Some(_) => {
                    let members = std::mem::replace(&mut self.current, vec![record]);
                    self.window_start = Some(ts);
                    ready = self.strategy.maybe_group(members);
                }
            }

            if self.current.len() >= self.buffer_size {
                let members = std::mem::take(&mut self.current);
                self.window_start = None;
                if ready.is_none() {
                    ready = self.strategy.maybe_group(members);
                }
            }

            if ready.is_some() {
                return ready;
            }
        }
    }
}

impl CorrelationStrategy for WindowCorrelation {
    fn name(&self) -> &'static str {
        "timestamp_window"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn correlate<'a>(&'a mut self, records: RecordIter<'a>, buffer_size: usize) -> GroupIter<'a> {
        Box::new(WindowIter {
            strategy: self,
            records,
            buffer_size: buffer_size.max(1),
            current: Vec::new(),
            window_start: None,
            done: false,
        })
    }
}

const DEFAULT_SESSION_FIELDS: &[&str] = &["session_id", "user_id", "client_ip", "user_agent"];

/// Group records belonging to the same user session, splitting a session at
/// gaps longer than the timeout.
pub struct SessionCorrelation {
    session_fields: Vec<String>,
    session_timeout: Duration,
    max_sessions: usize,
    session_overflow_warned: bool,
}

struct SessionState {
    members: Vec<LogRecord>,
    last_seen: Option<DateTime<FixedOffset>>,
}

impl SessionCorrelation {
    pub fn new() -> SessionCorrelation {
        Self::with_timeout(Duration::minutes(30))
    }

    pub fn with_timeout(session_timeout: Duration) -> SessionCorrelation {
        SessionCorrelation {
            session_fields: DEFAULT_SESSION_FIELDS.iter().map(|s| s.to_string()).collect(),
            session_timeout,
            max_sessions: MAX_SESSION_GROUPS,
            session_overflow_warned: false,
        }
    }

    fn extract_session_key(&self, record: &LogRecord) -> Option<String> {
        if let Some(session) = &record.correlation.session_id {
            return Some(format!("session:{session}"));
        }
        if let Some(user) = &record.correlation.user_id {
            return Some(format!("user:{user}"));
        }
        for field in &self.session_fields {
            if let Some(value) = record.structured_data.get(field) {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Some(format!("{field}:{value}"));
            }
        }
        None
    }
}

impl Default for SessionCorrelation {
    fn default() -> Self {
        SessionCorrelation::new()
    }
}

impl CorrelationStrategy for SessionCorrelation {
    fn name(&self) -> &'static str {
        "session"
    }

    fn supports_streaming(&self) -> bool {
        // Session state spans the whole input.
        false
    }

    fn correlate<'a>(&'a mut self, records: RecordIter<'a>, _buffer_size: usize) -> GroupIter<'a> {
        let mut emitted: Vec<CorrelationGroup> = Vec::new();
        let mut order: Vec<String> = Vec::new();
        let mut sessions: HashMap<String, SessionState> = HashMap::new();

        for record in records {
            let Some(key) = self.extract_session_key(&record) else {
                continue;
            };

            if !sessions.contains_key(&key) {
                if sessions.len() >= self.max_sessions {
                    if !self.session_overflow_warned {
                        tracing::warn!(
                            max = self.max_sessions,
                            "session group limit exceeded, further sessions are dropped"
                        );
                        self.session_overflow_warned = true;
                    }
                    continue;
                }
                order.push(key.clone());
                sessions.insert(
                    key.clone(),
                    SessionState {
                        members: Vec::new(),
                        last_seen: None,
                    },
                );
            }

            let state = sessions.get_mut(&key).expect("session state just ensured");
            let timed_out = matches!(
                (state.last_seen, record.timestamp),
                (Some(last), Some(ts)) if ts - last > self.session_timeout
            );
            if timed_out {
                let members = std::mem::take(&mut state.members);
                if members.len() >= 2 {
                    emitted.push(CorrelationGroup::new(
                        key.clone(),
                        "session",
                        members,
                        Map::new(),
                    ));
                }
                state.last_seen = record.timestamp;
                state.members.push(record);
            } else {
                state.last_seen = record.timestamp.or(state.last_seen);
                state.members.push(record);
            }
        }

        for key in order {
            if let Some(state) = sessions.remove(&key) {
                if state.members.len() >= 2 {
                    emitted.push(CorrelationGroup::new(key, "session", state.members, Map::new()));
                }
            }
        }

        Box::new(emitted.into_iter())
    }
}

/// Run strategies in order; each sees only the records earlier strategies
/// did not claim (claim identity is the record id). Orphans are exactly the
/// records no strategy grouped.
pub struct MultiStrategyCorrelation {
    strategies: Vec<Box<dyn CorrelationStrategy>>,
}

impl MultiStrategyCorrelation {
    pub fn new(strategies: Vec<Box<dyn CorrelationStrategy>>) -> MultiStrategyCorrelation {
        MultiStrategyCorrelation { strategies }
    }

    pub fn correlate(&mut self, records: Vec<LogRecord>) -> CorrelationResult {
        let mut groups: Vec<CorrelationGroup> = Vec::new();
        let mut remaining = records;

        for strategy in &mut self.strategies {
            if remaining.is_empty() {
                break;
            }
            let input: Vec<LogRecord> = remaining.clone();
            let found: Vec<CorrelationGroup> = strategy
                .correlate(Box::new(input.into_iter()), DEFAULT_BUFFER_SIZE)
                .collect();
            if found.is_empty() {
                continue;
            }
            let claimed: HashSet<Uuid> = found
                .iter()
                .flat_map(|g| g.records.iter().map(|r| r.id))
                .collect();
            groups.extend(found);
            remaining.retain(|r| !claimed.contains(&r.id));
        }

        CorrelationResult::new(groups, remaining)
    }
}
