//! Agent memory: a hot-path scratchpad and a quality-gated trajectory store.
//!
//! - [`Scratchpad`]: bounded, thread-safe ring buffer of recent agent activity
//!   with age-aware reads. Purely in memory.
//! - [`TrajectoryPool`]: FIFO-bounded collection of accepted trajectories for
//!   one owner.
//! - [`ScenarioIngestionPipeline`]: validates scenario proposals against
//!   novelty and difficulty gates, writes each accepted trajectory to its own
//!   file, adds it to a pool, and caps the number of files kept on disk.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod metrics;
pub mod obs;
pub mod scratchpad;
pub mod telemetry;
pub mod trajectory;

pub use config::{
    DifficultyRange, IngestionConfig, MemoryConfig, PoolConfig, ScratchpadConfig,
};
pub use error::{
    ConfigError, IngestError, IngestResult, ScenarioValidationError, StorageIoError,
    StructuralInputError,
};
pub use ingestion::{
    AcceptedScenario, BatchReport, GateOutcome, RejectedScenario, ScenarioIngestionPipeline,
    TrajectoryArchive,
};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use scratchpad::{AgeLimit, ReadQuery, Scratchpad, ScratchpadEntry, ScratchpadSummary};
pub use telemetry::init_tracing;
pub use trajectory::{success_score, Scenario, Trajectory, TrajectoryPool};
