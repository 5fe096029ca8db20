//! Trajectories: accepted scenarios kept as reusable agent experience.

pub mod pool;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::StructuralInputError;

pub use pool::TrajectoryPool;

/// Weight of the novelty signal when a difficulty score is also present.
pub const NOVELTY_WEIGHT: f64 = 0.7;
/// Weight of the difficulty signal.
pub const DIFFICULTY_WEIGHT: f64 = 0.3;

/// A candidate task proposal as submitted by a scenario producer.
///
/// Only the fields the gates read are typed. Everything else is opaque: the
/// descriptive fields accept any JSON shape, unknown keys land in `extra`, and
/// absent keys stay absent when the payload is written back out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novelty_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mvp_features: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domains: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Scenario {
    /// Decode an arbitrary JSON value. Fields with the wrong type are a
    /// structural failure, not a quality rejection.
    pub fn from_value(value: Value) -> Result<Self, StructuralInputError> {
        if !value.is_object() {
            return Err(StructuralInputError::Malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| StructuralInputError::Malformed(e.to_string()))
    }

    /// Human-readable task description: `"name: description"`, or whichever is present.
    pub fn diagnosis(&self) -> Option<String> {
        let name = self.name.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match (name, description) {
            (Some(n), Some(d)) => Some(format!("{n}: {d}")),
            (Some(n), None) => Some(n.to_string()),
            (None, Some(d)) => Some(d.to_string()),
            (None, None) => None,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Map novelty (and difficulty, when given) on a 0–100 scale to a score in `(0, 1]`.
///
/// Callers only pass novelty values that cleared a positive threshold, so the
/// result is always strictly positive.
pub fn success_score(novelty: f64, difficulty: Option<f64>) -> f64 {
    let novelty = normalize(novelty);
    match difficulty {
        Some(d) => NOVELTY_WEIGHT * novelty + DIFFICULTY_WEIGHT * normalize(d),
        None => novelty,
    }
}

fn normalize(score: f64) -> f64 {
    (score / 100.0).clamp(0.0, 1.0)
}

/// Durable record of one accepted scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub trajectory_id: String,
    pub agent_name: String,
    pub problem_diagnosis: String,
    pub success_score: f64,
    /// Wall-clock ingestion time. Informational; clocks can step backwards.
    pub ingested_at: DateTime<Utc>,
    /// Per-archive ingestion ordinal; defines archival order.
    pub ingest_seq: u64,
    /// SHA-256 of the canonical JSON encoding of `raw_payload`.
    pub payload_digest: String,
    pub raw_payload: Scenario,
}

impl Trajectory {
    pub fn new(
        agent_name: &str,
        problem_diagnosis: String,
        success_score: f64,
        ingest_seq: u64,
        raw_payload: Scenario,
    ) -> Result<Self, serde_json::Error> {
        let payload_digest = payload_digest(&raw_payload)?;
        Ok(Self {
            trajectory_id: new_trajectory_id(),
            agent_name: agent_name.to_string(),
            problem_diagnosis,
            success_score,
            ingested_at: Utc::now(),
            ingest_seq,
            payload_digest,
            raw_payload,
        })
    }

    /// Recompute the payload digest and compare with the stored one.
    pub fn verify_digest(&self) -> bool {
        payload_digest(&self.raw_payload)
            .map(|d| d == self.payload_digest)
            .unwrap_or(false)
    }

    /// Key used to order trajectories oldest-first.
    pub fn creation_key(&self) -> (u64, DateTime<Utc>) {
        (self.ingest_seq, self.ingested_at)
    }
}

fn new_trajectory_id() -> String {
    format!("traj_{}", Uuid::new_v4().simple())
}

fn payload_digest(payload: &Scenario) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
