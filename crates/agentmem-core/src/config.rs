//! Configuration for the scratchpad, trajectory pool and ingestion pipeline.
//!
//! Values come from built-in defaults, an optional TOML file, and
//! `AGENTMEM_*` environment variables, applied in that order.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub scratchpad: ScratchpadConfig,
    pub pool: PoolConfig,
    pub ingestion: IngestionConfig,
}

/// Ring buffer sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchpadConfig {
    /// Maximum number of entries held before the oldest is overwritten.
    pub capacity: usize,
    /// Entries older than this are hidden from recent reads and pruned by cleanup.
    pub max_age_seconds: u64,
}

impl Default for ScratchpadConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_age_seconds: 3600,
        }
    }
}

/// Trajectory pool sizing and scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub owner: String,
    pub max_trajectories: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            owner: "default".to_string(),
            max_trajectories: 1000,
        }
    }
}

/// Inclusive `[low, high]` bounds for `difficulty_score`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRange {
    pub low: f64,
    pub high: f64,
}

impl DifficultyRange {
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

impl Default for DifficultyRange {
    fn default() -> Self {
        Self::new(30.0, 90.0)
    }
}

/// Quality gates and archival cap for scenario ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub novelty_threshold: f64,
    pub difficulty_range: DifficultyRange,
    /// Maximum number of trajectory files kept in `storage_dir`.
    pub max_scenarios: usize,
    /// Source tag written into every trajectory's `agent_name`.
    pub agent_name: String,
    pub storage_dir: PathBuf,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            novelty_threshold: 70.0,
            difficulty_range: DifficultyRange::default(),
            max_scenarios: 1000,
            agent_name: "external_scenarios".to_string(),
            storage_dir: PathBuf::from(".agentmem/trajectories"),
        }
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.novelty_threshold.is_finite() || self.novelty_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "novelty_threshold must be a positive number, got {}",
                self.novelty_threshold
            )));
        }
        let range = self.difficulty_range;
        if !range.low.is_finite() || !range.high.is_finite() || range.low > range.high {
            return Err(ConfigError::Invalid(format!(
                "difficulty_range must satisfy low <= high, got [{}, {}]",
                range.low, range.high
            )));
        }
        if self.max_scenarios == 0 {
            return Err(ConfigError::Invalid(
                "max_scenarios must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl MemoryConfig {
    /// Parse a TOML document. Missing sections and keys fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, env_lookup)
    }

    /// Load a TOML file, then apply overrides resolved through `lookup`.
    pub fn load_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut cfg: Self = toml::from_str(&text)?;
        cfg.apply_overrides(lookup);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overwrite fields from `AGENTMEM_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(env_lookup);
    }

    /// Overwrite fields from `AGENTMEM_*` keys resolved through `lookup`.
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = override_value(&lookup, "AGENTMEM_SCRATCHPAD_CAPACITY") {
            self.scratchpad.capacity = v;
        }
        if let Some(v) = override_value(&lookup, "AGENTMEM_SCRATCHPAD_MAX_AGE_SECONDS") {
            self.scratchpad.max_age_seconds = v;
        }
        if let Some(owner) = lookup("AGENTMEM_POOL_OWNER") {
            self.pool.owner = owner;
        }
        if let Some(v) = override_value(&lookup, "AGENTMEM_POOL_MAX_TRAJECTORIES") {
            self.pool.max_trajectories = v;
        }
        if let Some(v) = override_value(&lookup, "AGENTMEM_NOVELTY_THRESHOLD") {
            self.ingestion.novelty_threshold = v;
        }
        if let Some(v) = override_value(&lookup, "AGENTMEM_DIFFICULTY_LOW") {
            self.ingestion.difficulty_range.low = v;
        }
        if let Some(v) = override_value(&lookup, "AGENTMEM_DIFFICULTY_HIGH") {
            self.ingestion.difficulty_range.high = v;
        }
        if let Some(v) = override_value(&lookup, "AGENTMEM_MAX_SCENARIOS") {
            self.ingestion.max_scenarios = v;
        }
        if let Some(dir) = lookup("AGENTMEM_STORAGE_DIR") {
            self.ingestion.storage_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scratchpad.capacity == 0 {
            return Err(ConfigError::Invalid(
                "scratchpad.capacity must be at least 1".to_string(),
            ));
        }
        if self.pool.max_trajectories == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_trajectories must be at least 1".to_string(),
            ));
        }
        self.ingestion.validate()
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn override_value<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key = key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}
