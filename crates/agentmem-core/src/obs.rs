//! Structured observability hooks for scratchpad and ingestion events.
//!
//! Every event carries a stable `event` field so log pipelines can filter on
//! it. Verbosity is controlled through `RUST_LOG`; see
//! [`crate::telemetry::init_tracing`].

use tracing::{debug, info, trace, warn};

/// RAII guard that scopes tracing output to one ingestion.
///
/// ```ignore
/// let _span = IngestSpan::enter("traj_0192…");
/// // events emitted here carry trajectory_id
/// ```
pub struct IngestSpan {
    _span: tracing::span::EnteredSpan,
}

impl IngestSpan {
    pub fn enter(trajectory_id: &str) -> Self {
        let span = tracing::info_span!("agentmem.ingest", trajectory_id = %trajectory_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Per-write counter tagged by agent and entry type.
pub fn emit_scratchpad_write(agent: &str, entry_type: &str, sequence: u64) {
    trace!(
        event = "scratchpad.write",
        agent = %agent,
        entry_type = %entry_type,
        sequence = sequence,
    );
}

/// The oldest entry was dropped to make room.
pub fn emit_scratchpad_overflow(evicted_agent: &str, evicted_entry_type: &str, total_overflows: u64) {
    debug!(
        event = "scratchpad.overflow",
        evicted_agent = %evicted_agent,
        evicted_entry_type = %evicted_entry_type,
        total_overflows = total_overflows,
    );
}

pub fn emit_scratchpad_cleared(agent: Option<&str>, removed: usize) {
    debug!(
        event = "scratchpad.cleared",
        agent = agent.unwrap_or("*"),
        removed = removed,
    );
}

pub fn emit_scratchpad_cleanup(removed: usize) {
    info!(event = "scratchpad.cleanup", removed = removed);
}

pub fn emit_scenario_accepted(trajectory_id: &str, success_score: f64, ingest_seq: u64) {
    info!(
        event = "scenario.accepted",
        trajectory_id = %trajectory_id,
        success_score = success_score,
        ingest_seq = ingest_seq,
    );
}

/// A quality gate rejected the scenario.
pub fn emit_scenario_rejected(criterion: &str, value: f64, threshold: &str) {
    info!(
        event = "scenario.rejected",
        criterion = %criterion,
        value = value,
        threshold = %threshold,
    );
}

/// The scenario failed the structural check.
pub fn emit_scenario_malformed(error: &dyn std::fmt::Display) {
    warn!(event = "scenario.malformed", error = %error);
}

pub fn emit_pool_evicted(owner: &str, trajectory_id: &str) {
    debug!(event = "pool.evicted", owner = %owner, trajectory_id = %trajectory_id);
}

pub fn emit_archive_trimmed(removed: usize, remaining: usize) {
    info!(event = "archive.trimmed", removed = removed, remaining = remaining);
}

/// Archival trim failed after a successful ingestion (warning level).
pub fn emit_archive_trim_failed(error: &dyn std::fmt::Display) {
    warn!(event = "archive.trim_failed", error = %error);
}

/// A file in the storage directory could not be used as a trajectory.
pub fn emit_archive_file_skipped(path: &std::path::Path, reason: &dyn std::fmt::Display) {
    warn!(event = "archive.file_skipped", path = %path.display(), reason = %reason);
}
