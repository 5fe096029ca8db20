//! Quality-gated ingestion of scenarios into the trajectory pool and archive.
//!
//! Gates run in order and stop at the first failure:
//! 1. structure: a name or description, `business_type` and `novelty_score` present
//! 2. `novelty_score >= novelty_threshold`
//! 3. `difficulty_score`, when given, inside the inclusive difficulty range
//!
//! An accepted scenario is written to disk first and only then added to the
//! pool, so a failed write never leaves the pool ahead of the archive. The
//! archival cap is applied last and is best-effort: a failed delete is logged
//! and retried on the next ingestion, and the new trajectory stays ingested.

pub mod archive;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::IngestionConfig;
use crate::error::{
    IngestError, IngestResult, ScenarioValidationError, StorageIoError, StructuralInputError,
};
use crate::metrics::IngestionMetrics;
use crate::obs::{self, IngestSpan};
use crate::trajectory::{success_score, Scenario, Trajectory, TrajectoryPool};

pub use archive::TrajectoryArchive;

/// Fields extracted from a scenario that passed every gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub problem_diagnosis: String,
    pub success_score: f64,
}

/// One accepted item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedScenario {
    pub index: usize,
    pub trajectory_id: String,
    pub success_score: f64,
}

/// One skipped item of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedScenario {
    pub index: usize,
    /// Gate name, or `"structure"` for malformed input.
    pub criterion: String,
    pub reason: String,
}

/// Outcome of [`ScenarioIngestionPipeline::ingest_batch`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub accepted: Vec<AcceptedScenario>,
    pub rejected: Vec<RejectedScenario>,
}

/// Gatekeeper between scenario producers and durable trajectory storage.
///
/// Add, evict, file create and file delete are serialised per instance; any
/// number of independently configured pipelines may coexist.
#[derive(Debug)]
pub struct ScenarioIngestionPipeline {
    config: IngestionConfig,
    pool: Arc<TrajectoryPool>,
    archive: Mutex<TrajectoryArchive>,
    metrics: IngestionMetrics,
}

impl ScenarioIngestionPipeline {
    /// Validate `config` and open its storage directory.
    pub fn new(config: IngestionConfig, pool: Arc<TrajectoryPool>) -> IngestResult<Self> {
        config.validate()?;
        let archive = TrajectoryArchive::open(&config.storage_dir)?;
        tracing::info!(
            storage_dir = %config.storage_dir.display(),
            archived = archive.len(),
            pool_owner = %pool.owner(),
            "ingestion pipeline ready"
        );
        Ok(Self {
            config,
            pool,
            archive: Mutex::new(archive),
            metrics: IngestionMetrics::new(),
        })
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<TrajectoryPool> {
        &self.pool
    }

    pub fn metrics(&self) -> &IngestionMetrics {
        &self.metrics
    }

    // Index updates follow the disk operation they describe, so a poisoned
    // archive still matches disk.
    fn lock_archive(&self) -> MutexGuard<'_, TrajectoryArchive> {
        self.archive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run every gate without side effects.
    pub fn check(&self, scenario: &Scenario) -> IngestResult<GateOutcome> {
        let problem_diagnosis = scenario
            .diagnosis()
            .ok_or(StructuralInputError::MissingField { field: "name" })?;
        if scenario
            .business_type
            .as_deref()
            .map_or(true, |b| b.trim().is_empty())
        {
            return Err(StructuralInputError::MissingField {
                field: "business_type",
            }
            .into());
        }
        let novelty = scenario
            .novelty_score
            .ok_or(StructuralInputError::MissingField {
                field: "novelty_score",
            })?;
        if !novelty.is_finite() {
            return Err(StructuralInputError::NonFiniteScore {
                field: "novelty_score",
                value: novelty,
            }
            .into());
        }
        if let Some(d) = scenario.difficulty_score.filter(|d| !d.is_finite()) {
            return Err(StructuralInputError::NonFiniteScore {
                field: "difficulty_score",
                value: d,
            }
            .into());
        }

        if novelty < self.config.novelty_threshold {
            return Err(ScenarioValidationError::NoveltyBelowThreshold {
                value: novelty,
                threshold: self.config.novelty_threshold,
            }
            .into());
        }
        let range = self.config.difficulty_range;
        if let Some(d) = scenario.difficulty_score {
            if !range.contains(d) {
                return Err(ScenarioValidationError::DifficultyOutOfRange {
                    value: d,
                    low: range.low,
                    high: range.high,
                }
                .into());
            }
        }

        Ok(GateOutcome {
            problem_diagnosis,
            success_score: success_score(novelty, scenario.difficulty_score),
        })
    }

    /// Validate, persist and pool one scenario.
    pub fn ingest_scenario(&self, scenario: Scenario) -> IngestResult<Trajectory> {
        let outcome = match self.check(&scenario) {
            Ok(o) => o,
            Err(e) => {
                self.record_rejection(&e);
                return Err(e);
            }
        };

        let trajectory = {
            let mut archive = self.lock_archive();
            let seq = archive.allocate_seq();
            let trajectory = Trajectory::new(
                &self.config.agent_name,
                outcome.problem_diagnosis,
                outcome.success_score,
                seq,
                scenario,
            )
            .map_err(StorageIoError::from)?;
            let _span = IngestSpan::enter(&trajectory.trajectory_id);

            archive.persist(&trajectory)?;
            if self.pool.add(trajectory.clone()).is_some() {
                self.metrics.inc_pool_evictions();
            }

            match archive.trim(self.config.max_scenarios) {
                Ok(removed) if !removed.is_empty() => {
                    self.metrics.add_archive_evictions(removed.len() as u64);
                    obs::emit_archive_trimmed(removed.len(), archive.len());
                }
                Ok(_) => {}
                Err(e) => {
                    self.metrics.inc_trim_failures();
                    obs::emit_archive_trim_failed(&e);
                }
            }
            trajectory
        };

        self.metrics.inc_accepted();
        obs::emit_scenario_accepted(
            &trajectory.trajectory_id,
            trajectory.success_score,
            trajectory.ingest_seq,
        );
        Ok(trajectory)
    }

    /// Like [`Self::ingest_scenario`] for untyped JSON input.
    pub fn ingest_value(&self, value: Value) -> IngestResult<Trajectory> {
        let scenario = match Scenario::from_value(value) {
            Ok(s) => s,
            Err(e) => {
                let e = IngestError::from(e);
                self.record_rejection(&e);
                return Err(e);
            }
        };
        self.ingest_scenario(scenario)
    }

    /// Ingest every item, skipping rejected ones. Any other failure stops the
    /// batch and is returned; items accepted before it stay ingested.
    pub fn ingest_batch<I>(&self, items: I) -> IngestResult<BatchReport>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut report = BatchReport::default();
        for (index, value) in items.into_iter().enumerate() {
            match self.ingest_value(value) {
                Ok(t) => report.accepted.push(AcceptedScenario {
                    index,
                    trajectory_id: t.trajectory_id,
                    success_score: t.success_score,
                }),
                Err(IngestError::Structural(e)) => report.rejected.push(RejectedScenario {
                    index,
                    criterion: "structure".to_string(),
                    reason: e.to_string(),
                }),
                Err(IngestError::Validation(e)) => report.rejected.push(RejectedScenario {
                    index,
                    criterion: e.criterion().to_string(),
                    reason: e.to_string(),
                }),
                Err(e) => return Err(e),
            }
        }
        self.metrics.flush();
        Ok(report)
    }

    /// Run [`Self::ingest_scenario`] on tokio's blocking pool.
    pub async fn spawn_ingest(self: Arc<Self>, scenario: Scenario) -> IngestResult<Trajectory> {
        tokio::task::spawn_blocking(move || self.ingest_scenario(scenario)).await?
    }

    /// Up to `limit` archived trajectories, newest first.
    pub fn stored_scenarios(&self, limit: usize) -> Result<Vec<Trajectory>, StorageIoError> {
        self.lock_archive().load_recent(limit)
    }

    /// Number of trajectory files in the storage directory.
    pub fn stored_count(&self) -> usize {
        self.lock_archive().len()
    }

    fn record_rejection(&self, error: &IngestError) {
        match error {
            IngestError::Structural(e) => {
                self.metrics.inc_rejected_structural();
                obs::emit_scenario_malformed(e);
            }
            IngestError::Validation(e) => {
                self.metrics.inc_rejected_quality();
                obs::emit_scenario_rejected(e.criterion(), e.value(), &e.threshold());
            }
            _ => {}
        }
    }
}
