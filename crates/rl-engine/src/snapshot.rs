//! Versioned, self-describing policy snapshots.
//!
//! A snapshot is plain data: hyperparameters tagged with the policy kind,
//! every action's design matrix (row-major) and response vector, and the
//! diagnostic counters. Restoring validates everything the engine's
//! invariants rely on before a policy is rebuilt from it.

use crate::linalg::{is_symmetric, Cholesky};
use crate::stats::ActionStatistics;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use reco_core::{BanditError, BanditResult, PolicyKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

const SYMMETRY_TOLERANCE: f64 = 1e-9;
const REWARD_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy_kind", rename_all = "snake_case")]
pub enum Hyperparameters {
    LinUcb { alpha: f64, lambda: f64 },
    ThompsonSampling { nu: f64, lambda: f64 },
}

impl Hyperparameters {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Hyperparameters::LinUcb { .. } => PolicyKind::LinUcb,
            Hyperparameters::ThompsonSampling { .. } => PolicyKind::ThompsonSampling,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// `d×d` design matrix, row-major.
    pub design: Vec<f64>,
    pub response: Vec<f64>,
    pub observations: u64,
    pub cumulative_reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCounters {
    pub iterations: u64,
    pub total_reward: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub version: u32,
    pub feature_dim: usize,
    pub action_count: usize,
    pub hyperparameters: Hyperparameters,
    pub actions: Vec<ActionRecord>,
    pub counters: SnapshotCounters,
    pub created_at: DateTime<Utc>,
}

impl PolicySnapshot {
    pub(crate) fn capture(
        hyperparameters: Hyperparameters,
        feature_dim: usize,
        statistics: &[ActionStatistics],
    ) -> Self {
        let actions: Vec<ActionRecord> = statistics
            .iter()
            .map(|s| ActionRecord {
                design: s.design().iter().copied().collect(),
                response: s.response().to_vec(),
                observations: s.observations(),
                cumulative_reward: s.cumulative_reward(),
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            feature_dim,
            action_count: actions.len(),
            hyperparameters,
            counters: SnapshotCounters {
                iterations: actions.iter().map(|a| a.observations).sum(),
                total_reward: actions.iter().map(|a| a.cumulative_reward).sum(),
            },
            actions,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        self.hyperparameters.kind()
    }

    /// Check the snapshot against the caller's expected shape and the
    /// positive-definiteness invariant, returning the decoded statistics.
    pub fn validate(
        &self,
        expected_feature_dim: usize,
        expected_action_count: usize,
    ) -> BanditResult<Vec<ActionStatistics>> {
        if self.version == 0 || self.version > SNAPSHOT_VERSION {
            return Err(corrupt(format!(
                "unsupported snapshot version {} (supported: 1..={SNAPSHOT_VERSION})",
                self.version
            )));
        }
        if self.feature_dim != expected_feature_dim {
            return Err(corrupt(format!(
                "feature dimension {} does not match expected {expected_feature_dim}",
                self.feature_dim
            )));
        }
        if self.action_count != expected_action_count {
            return Err(corrupt(format!(
                "action count {} does not match expected {expected_action_count}",
                self.action_count
            )));
        }
        if self.actions.len() != self.action_count {
            return Err(corrupt(format!(
                "snapshot declares {} actions but stores {}",
                self.action_count,
                self.actions.len()
            )));
        }
        self.validate_hyperparameters()?;

        let d = self.feature_dim;
        let statistics = self
            .actions
            .iter()
            .enumerate()
            .map(|(i, record)| decode_record(i, record, d))
            .collect::<BanditResult<Vec<_>>>()?;

        let iterations = self
            .actions
            .iter()
            .try_fold(0u64, |acc, a| acc.checked_add(a.observations))
            .ok_or_else(|| corrupt("observation counters overflow".to_string()))?;
        if iterations != self.counters.iterations {
            return Err(corrupt(format!(
                "iteration counter {} disagrees with per-action observations {iterations}",
                self.counters.iterations
            )));
        }

        let total_reward: f64 = self.actions.iter().map(|a| a.cumulative_reward).sum();
        let tolerance = REWARD_TOLERANCE * total_reward.abs().max(1.0);
        if !self.counters.total_reward.is_finite()
            || (self.counters.total_reward - total_reward).abs() > tolerance
        {
            return Err(corrupt(format!(
                "total reward counter {} disagrees with per-action rewards {total_reward}",
                self.counters.total_reward
            )));
        }

        Ok(statistics)
    }

    fn validate_hyperparameters(&self) -> BanditResult<()> {
        let (lambda, scale, name) = match self.hyperparameters {
            Hyperparameters::LinUcb { alpha, lambda } => (lambda, alpha, "alpha"),
            Hyperparameters::ThompsonSampling { nu, lambda } => (lambda, nu, "nu"),
        };
        if !lambda.is_finite() || lambda <= 0.0 {
            return Err(corrupt(format!("invalid lambda {lambda}")));
        }
        if !scale.is_finite() || scale < 0.0 {
            return Err(corrupt(format!("invalid {name} {scale}")));
        }
        Ok(())
    }

    pub fn to_json(&self) -> BanditResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot blob; malformed input is a persistence error.
    pub fn from_json(raw: &str) -> BanditResult<Self> {
        serde_json::from_str(raw).map_err(|e| corrupt(format!("malformed snapshot: {e}")))
    }

    /// As [`from_json`](Self::from_json) for raw file bytes, which may not
    /// be UTF-8.
    pub fn from_slice(raw: &[u8]) -> BanditResult<Self> {
        serde_json::from_slice(raw).map_err(|e| corrupt(format!("malformed snapshot: {e}")))
    }

    /// Write the snapshot next to `path` and rename it into place.
    pub fn save(&self, path: impl AsRef<Path>) -> BanditResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_json()?)?;
        fs::rename(&tmp, path)?;

        info!(
            path = %path.display(),
            kind = %self.kind(),
            action_count = self.action_count,
            iterations = self.counters.iterations,
            "Policy snapshot saved"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> BanditResult<Self> {
        let path = path.as_ref();
        let raw = fs::read(path)?;
        let snapshot = Self::from_slice(&raw).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Rejected policy snapshot");
            e
        })?;
        info!(path = %path.display(), kind = %snapshot.kind(), "Policy snapshot loaded");
        Ok(snapshot)
    }
}

fn corrupt(message: String) -> BanditError {
    BanditError::Persistence(message)
}

fn decode_record(index: usize, record: &ActionRecord, d: usize) -> BanditResult<ActionStatistics> {
    if record.design.len() != d * d || record.response.len() != d {
        return Err(corrupt(format!(
            "action {index}: expected {d}x{d} design and length-{d} response, got {} and {}",
            record.design.len(),
            record.response.len()
        )));
    }
    if record.design.iter().chain(record.response.iter()).any(|v| !v.is_finite())
        || !record.cumulative_reward.is_finite()
    {
        return Err(corrupt(format!("action {index}: non-finite statistics")));
    }

    let design = Array2::from_shape_vec((d, d), record.design.clone())
        .map_err(|e| corrupt(format!("action {index}: {e}")))?;
    if !is_symmetric(&design, SYMMETRY_TOLERANCE) {
        return Err(corrupt(format!("action {index}: design matrix is not symmetric")));
    }
    Cholesky::factor(&design)
        .map_err(|_| corrupt(format!("action {index}: design matrix is not positive-definite")))?;

    Ok(ActionStatistics::from_parts(
        design,
        Array1::from_vec(record.response.clone()),
        record.observations,
        record.cumulative_reward,
    ))
}
