//! Immutable scratchpad records and read queries.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One timestamped record in the scratchpad.
///
/// Fields are only readable; the timestamp is fixed when the entry is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScratchpadEntry {
    sequence: u64,
    content: Value,
    entry_type: String,
    agent: String,
    timestamp: DateTime<Utc>,
    metadata: BTreeMap<String, Value>,
}

impl ScratchpadEntry {
    pub(crate) fn new(
        sequence: u64,
        content: Value,
        entry_type: &str,
        agent: &str,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            sequence,
            content,
            entry_type: entry_type.to_string(),
            agent: agent.to_string(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Write ordinal within the owning scratchpad, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn entry_type(&self) -> &str {
        &self.entry_type
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    /// Age relative to `now`. Never negative.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.timestamp).max(Duration::zero())
    }

    pub(crate) fn matches(&self, agent: Option<&str>, entry_type: Option<&str>) -> bool {
        agent.map_or(true, |a| self.agent == a)
            && entry_type.map_or(true, |t| self.entry_type == t)
    }
}

/// Age ceiling applied by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgeLimit {
    /// Use the scratchpad's configured max age.
    #[default]
    Configured,
    Within(Duration),
    Unbounded,
}

/// Parameters for [`super::Scratchpad::read_recent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadQuery {
    pub limit: usize,
    pub agent: Option<String>,
    pub entry_type: Option<String>,
    pub max_age: AgeLimit,
}

impl ReadQuery {
    /// At most `limit` entries, newest first, within the configured max age.
    pub fn recent(limit: usize) -> Self {
        Self {
            limit,
            agent: None,
            entry_type: None,
            max_age: AgeLimit::Configured,
        }
    }

    pub fn with_agent(mut self, agent: &str) -> Self {
        self.agent = Some(agent.to_string());
        self
    }

    pub fn with_entry_type(mut self, entry_type: &str) -> Self {
        self.entry_type = Some(entry_type.to_string());
        self
    }

    pub fn within(mut self, max_age: Duration) -> Self {
        self.max_age = AgeLimit::Within(max_age);
        self
    }

    pub fn unbounded_age(mut self) -> Self {
        self.max_age = AgeLimit::Unbounded;
        self
    }
}
