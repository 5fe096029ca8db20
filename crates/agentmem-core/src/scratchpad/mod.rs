//! Bounded, thread-safe ring buffer of recent agent activity.
//!
//! The whole buffer sits behind one `std::sync::Mutex`, which is not
//! re-entrant. Composite operations still never deadlock because every public
//! operation takes the lock exactly once and hands the guarded
//! `ScratchpadState` to private helpers; [`Scratchpad::read_all`] and
//! [`Scratchpad::read_recent`] share `ScratchpadState::collect` rather than
//! calling each other. Code holding the guard must only call methods on
//! `ScratchpadState`, never public `Scratchpad` methods such as
//! [`Scratchpad::len`]. Tracing events are emitted after the guard is dropped.
//!
//! Nothing here is persisted. Share a scratchpad by wrapping it in an `Arc`
//! and handing it to whoever needs it; tests simply build a fresh one.

pub mod entry;

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ScratchpadConfig;
use crate::obs;

pub use entry::{AgeLimit, ReadQuery, ScratchpadEntry};

/// Point-in-time view of the buffer and its lifetime counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadSummary {
    pub total_entries: usize,
    pub capacity: usize,
    /// `total_entries / capacity`, in `[0, 1]`.
    pub capacity_utilization: f64,
    pub agent_counts: BTreeMap<String, usize>,
    pub entry_type_counts: BTreeMap<String, usize>,
    pub oldest_ts: Option<DateTime<Utc>>,
    pub newest_ts: Option<DateTime<Utc>>,
    /// Seconds between the oldest and newest entry.
    pub age_range_seconds: Option<f64>,
    pub total_writes: u64,
    pub total_reads: u64,
    pub total_overflows: u64,
}

#[derive(Debug)]
struct ScratchpadState {
    entries: VecDeque<ScratchpadEntry>,
    next_sequence: u64,
    total_writes: u64,
    total_reads: u64,
    total_overflows: u64,
}

impl ScratchpadState {
    fn collect(
        &self,
        limit: usize,
        agent: Option<&str>,
        entry_type: Option<&str>,
        cutoff: Option<DateTime<Utc>>,
    ) -> Vec<ScratchpadEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.matches(agent, entry_type))
            .filter(|e| cutoff.map_or(true, |c| e.timestamp() >= c))
            .take(limit)
            .cloned()
            .collect()
    }

    fn retain(&mut self, keep: impl FnMut(&ScratchpadEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(keep);
        before - self.entries.len()
    }
}

/// Fixed-capacity, age-aware log shared by concurrent agents.
#[derive(Debug)]
pub struct Scratchpad {
    capacity: usize,
    max_age: Duration,
    state: Mutex<ScratchpadState>,
}

impl Scratchpad {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            max_age,
            state: Mutex::new(ScratchpadState {
                entries: VecDeque::with_capacity(capacity),
                next_sequence: 1,
                total_writes: 0,
                total_reads: 0,
                total_overflows: 0,
            }),
        }
    }

    pub fn from_config(config: &ScratchpadConfig) -> Self {
        let secs = i64::try_from(config.max_age_seconds).unwrap_or(i64::MAX);
        let max_age = Duration::try_seconds(secs).unwrap_or(Duration::MAX);
        Self::new(config.capacity, max_age)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Not re-entrant: never call a public method while holding the returned guard.
    // Every mutation is a single VecDeque call, so a poisoned buffer is still consistent.
    fn lock(&self) -> MutexGuard<'_, ScratchpadState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry, dropping the oldest one when the buffer is full.
    pub fn write(
        &self,
        content: Value,
        entry_type: &str,
        agent: &str,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> ScratchpadEntry {
        let (entry, evicted, total_overflows) = {
            let mut state = self.lock();
            let entry = ScratchpadEntry::new(
                state.next_sequence,
                content,
                entry_type,
                agent,
                metadata.unwrap_or_default(),
            );
            state.next_sequence += 1;

            let evicted = if state.entries.len() >= self.capacity {
                state.total_overflows += 1;
                state.entries.pop_front()
            } else {
                None
            };
            state.entries.push_back(entry.clone());
            state.total_writes += 1;
            (entry, evicted, state.total_overflows)
        };

        obs::emit_scratchpad_write(agent, entry_type, entry.sequence());
        if let Some(evicted) = evicted {
            obs::emit_scratchpad_overflow(evicted.agent(), evicted.entry_type(), total_overflows);
        }
        entry
    }

    /// Newest-first entries matching `query`. Never mutates the buffer.
    pub fn read_recent(&self, query: &ReadQuery) -> Vec<ScratchpadEntry> {
        let cutoff = match query.max_age {
            AgeLimit::Configured => cutoff_for(self.max_age),
            AgeLimit::Within(age) => cutoff_for(age),
            AgeLimit::Unbounded => None,
        };
        let mut state = self.lock();
        state.total_reads += 1;
        state.collect(
            query.limit,
            query.agent.as_deref(),
            query.entry_type.as_deref(),
            cutoff,
        )
    }

    /// Every entry still in the buffer, newest first, regardless of age.
    pub fn read_all(&self, agent: Option<&str>, entry_type: Option<&str>) -> Vec<ScratchpadEntry> {
        let mut state = self.lock();
        state.total_reads += 1;
        state.collect(self.capacity, agent, entry_type, None)
    }

    /// Remove every entry, or only those written by `agent`.
    pub fn clear(&self, agent: Option<&str>) -> usize {
        let removed = {
            let mut state = self.lock();
            match agent {
                None => {
                    let n = state.entries.len();
                    state.entries.clear();
                    n
                }
                Some(a) => state.retain(|e| e.agent() != a),
            }
        };
        obs::emit_scratchpad_cleared(agent, removed);
        removed
    }

    /// Physically drop entries older than the configured max age.
    pub fn cleanup_old_entries(&self) -> usize {
        let Some(cutoff) = cutoff_for(self.max_age) else {
            return 0;
        };
        let removed = self.lock().retain(|e| e.timestamp() >= cutoff);
        if removed > 0 {
            obs::emit_scratchpad_cleanup(removed);
        }
        removed
    }

    pub fn get_summary(&self) -> ScratchpadSummary {
        let state = self.lock();
        let mut agent_counts = BTreeMap::new();
        let mut entry_type_counts = BTreeMap::new();
        for e in &state.entries {
            *agent_counts.entry(e.agent().to_string()).or_insert(0) += 1;
            *entry_type_counts.entry(e.entry_type().to_string()).or_insert(0) += 1;
        }
        let oldest_ts = state.entries.iter().map(|e| e.timestamp()).min();
        let newest_ts = state.entries.iter().map(|e| e.timestamp()).max();
        let age_range_seconds = match (oldest_ts, newest_ts) {
            (Some(o), Some(n)) => Some((n - o).num_milliseconds() as f64 / 1000.0),
            _ => None,
        };

        ScratchpadSummary {
            total_entries: state.entries.len(),
            capacity: self.capacity,
            capacity_utilization: state.entries.len() as f64 / self.capacity as f64,
            agent_counts,
            entry_type_counts,
            oldest_ts,
            newest_ts,
            age_range_seconds,
            total_writes: state.total_writes,
            total_reads: state.total_reads,
            total_overflows: state.total_overflows,
        }
    }
}

/// Oldest timestamp still considered fresh, or `None` when `max_age` reaches
/// past the representable range.
fn cutoff_for(max_age: Duration) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(max_age)
}

impl Default for Scratchpad {
    fn default() -> Self {
        Self::from_config(&ScratchpadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pad(capacity: usize) -> Scratchpad {
        Scratchpad::new(capacity, Duration::hours(1))
    }

    fn contents(entries: &[ScratchpadEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.content().as_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_overflow_keeps_most_recent() {
        let sp = pad(3);
        sp.write(json!("a"), "cmd", "agentX", None);
        sp.write(json!("b"), "cmd", "agentX", None);
        sp.write(json!("c"), "cmd", "agentY", None);
        sp.write(json!("d"), "cmd", "agentX", None);

        assert_eq!(contents(&sp.read_all(None, None)), vec!["d", "c", "b"]);
        let summary = sp.get_summary();
        assert_eq!(summary.total_overflows, 1);
        assert_eq!(summary.total_writes, 4);
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.capacity_utilization, 1.0);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let sp = pad(2);
        let a = sp.write(json!(1), "t", "x", None);
        let b = sp.write(json!(2), "t", "x", None);
        let c = sp.write(json!(3), "t", "x", None);
        assert_eq!((a.sequence(), b.sequence(), c.sequence()), (1, 2, 3));
    }

    #[test]
    fn test_read_recent_limit_and_filters() {
        let sp = pad(10);
        sp.write(json!("a"), "thought", "planner", None);
        sp.write(json!("b"), "command", "planner", None);
        sp.write(json!("c"), "thought", "coder", None);
        sp.write(json!("d"), "thought", "planner", None);

        let recent = sp.read_recent(&ReadQuery::recent(1));
        assert_eq!(contents(&recent), vec!["d"]);

        let planner_thoughts = sp.read_recent(
            &ReadQuery::recent(10)
                .with_agent("planner")
                .with_entry_type("thought"),
        );
        assert_eq!(contents(&planner_thoughts), vec!["d", "a"]);
    }

    #[test]
    fn test_metadata_is_kept() {
        let sp = pad(2);
        let mut meta = BTreeMap::new();
        meta.insert("step".to_string(), json!(4));
        let e = sp.write(json!({"k": "v"}), "obs", "a", Some(meta));
        assert_eq!(e.metadata().get("step"), Some(&json!(4)));
        assert_eq!(sp.read_all(None, None)[0].metadata().len(), 1);
    }

    #[test]
    fn test_clear_by_agent() {
        let sp = pad(10);
        sp.write(json!("a"), "t", "x", None);
        sp.write(json!("b"), "t", "y", None);
        sp.write(json!("c"), "t", "x", None);

        assert_eq!(sp.clear(Some("x")), 2);
        assert_eq!(contents(&sp.read_all(None, None)), vec!["b"]);
        assert_eq!(sp.clear(None), 1);
        assert!(sp.is_empty());
    }

    #[test]
    fn test_summary_does_not_touch_counters() {
        let sp = pad(4);
        sp.write(json!("a"), "t", "x", None);
        sp.read_recent(&ReadQuery::recent(4));
        let first = sp.get_summary();
        let second = sp.get_summary();
        assert_eq!(first.total_reads, 1);
        assert_eq!(first.total_writes, second.total_writes);
        assert_eq!(first.total_reads, second.total_reads);
        assert_eq!(first.total_overflows, second.total_overflows);
        assert_eq!(first.agent_counts.get("x"), Some(&1));
    }

    #[test]
    fn test_empty_summary() {
        let summary = pad(5).get_summary();
        assert_eq!(summary.total_entries, 0);
        assert!(summary.oldest_ts.is_none());
        assert!(summary.age_range_seconds.is_none());
        assert_eq!(summary.capacity_utilization, 0.0);
    }

    #[test]
    fn test_operations_compose_without_self_deadlock() {
        let sp = pad(3);
        for i in 0..5 {
            sp.write(json!(i), "t", "x", None);
            assert_eq!(sp.read_all(Some("x"), None).len(), sp.len());
            assert_eq!(sp.get_summary().total_entries, sp.len());
        }
        sp.cleanup_old_entries();
        assert_eq!(sp.clear(Some("x")), 3);
        assert!(sp.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let sp = Scratchpad::new(0, Duration::hours(1));
        assert_eq!(sp.capacity(), 1);
        sp.write(json!("a"), "t", "x", None);
        sp.write(json!("b"), "t", "x", None);
        assert_eq!(contents(&sp.read_all(None, None)), vec!["b"]);
    }
}
