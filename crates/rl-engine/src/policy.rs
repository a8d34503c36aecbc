//! Shared policy contract and the tagged `Policy` variant.
//!
//! Everything outside this crate talks to a policy through [`BanditPolicy`];
//! [`Policy`] is the concrete owned value the registry holds and the
//! snapshot layer restores into.

use crate::linucb::{LinUcb, LinUcbConfig};
use crate::snapshot::{Hyperparameters, PolicySnapshot};
use crate::stats::ActionStatistics;
use crate::thompson::{ThompsonConfig, ThompsonSampling};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reco_core::config::BanditConfig;
use reco_core::{BanditError, BanditResult, PolicyKind};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Winning action and its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub action: usize,
    pub score: f64,
}

/// Diagnostic counters. Never consulted by selection or update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTelemetry {
    pub kind: PolicyKind,
    pub feature_dim: usize,
    pub action_count: usize,
    pub iterations: u64,
    pub total_reward: f64,
    pub action_counts: Vec<u64>,
}

impl PolicyTelemetry {
    pub(crate) fn from_statistics(
        kind: PolicyKind,
        feature_dim: usize,
        statistics: &[ActionStatistics],
    ) -> Self {
        let action_counts: Vec<u64> = statistics.iter().map(|s| s.observations()).collect();
        Self {
            kind,
            feature_dim,
            action_count: statistics.len(),
            iterations: action_counts.iter().sum(),
            total_reward: statistics.iter().map(|s| s.cumulative_reward()).sum(),
            action_counts,
        }
    }
}

/// Capabilities common to every contextual bandit policy.
///
/// All methods take `&self`: a policy is shared across request tasks behind
/// an `Arc` and synchronises per action internally.
pub trait BanditPolicy: Send + Sync {
    fn kind(&self) -> PolicyKind;

    fn feature_dim(&self) -> usize;

    fn action_count(&self) -> usize;

    /// Pick the best-scoring action among `candidates` (all actions when
    /// `None`). Ties go to the first candidate in iteration order.
    fn select_action(&self, context: &[f64], candidates: Option<&[usize]>) -> BanditResult<Selection>;

    /// Rank-1 update of one action's statistics. Rewards are not clipped.
    fn update(&self, action: usize, context: &[f64], reward: f64) -> BanditResult<()>;

    /// Point estimate per action, without exploration.
    fn expected_rewards(&self, context: &[f64]) -> BanditResult<Vec<f64>>;

    /// Consistent copy of the full state.
    fn snapshot(&self) -> PolicySnapshot;

    fn telemetry(&self) -> PolicyTelemetry;
}

impl BanditPolicy for LinUcb {
    fn kind(&self) -> PolicyKind {
        PolicyKind::LinUcb
    }

    fn feature_dim(&self) -> usize {
        LinUcb::feature_dim(self)
    }

    fn action_count(&self) -> usize {
        LinUcb::action_count(self)
    }

    fn select_action(&self, context: &[f64], candidates: Option<&[usize]>) -> BanditResult<Selection> {
        LinUcb::select_action(self, context, candidates)
    }

    fn update(&self, action: usize, context: &[f64], reward: f64) -> BanditResult<()> {
        LinUcb::update(self, action, context, reward)
    }

    fn expected_rewards(&self, context: &[f64]) -> BanditResult<Vec<f64>> {
        LinUcb::expected_rewards(self, context)
    }

    fn snapshot(&self) -> PolicySnapshot {
        LinUcb::snapshot(self)
    }

    fn telemetry(&self) -> PolicyTelemetry {
        LinUcb::telemetry(self)
    }
}

impl BanditPolicy for ThompsonSampling {
    fn kind(&self) -> PolicyKind {
        PolicyKind::ThompsonSampling
    }

    fn feature_dim(&self) -> usize {
        ThompsonSampling::feature_dim(self)
    }

    fn action_count(&self) -> usize {
        ThompsonSampling::action_count(self)
    }

    fn select_action(&self, context: &[f64], candidates: Option<&[usize]>) -> BanditResult<Selection> {
        ThompsonSampling::select_action(self, context, candidates)
    }

    fn update(&self, action: usize, context: &[f64], reward: f64) -> BanditResult<()> {
        ThompsonSampling::update(self, action, context, reward)
    }

    fn expected_rewards(&self, context: &[f64]) -> BanditResult<Vec<f64>> {
        ThompsonSampling::expected_rewards(self, context)
    }

    fn snapshot(&self) -> PolicySnapshot {
        ThompsonSampling::snapshot(self)
    }

    fn telemetry(&self) -> PolicyTelemetry {
        ThompsonSampling::telemetry(self)
    }
}

/// Owned policy of either algorithm.
pub enum Policy {
    LinUcb(LinUcb),
    ThompsonSampling(ThompsonSampling),
}

impl Policy {
    /// Build a fresh policy from application config for `action_count` actions.
    pub fn from_config(config: &BanditConfig, action_count: usize) -> BanditResult<Self> {
        match config.algorithm {
            PolicyKind::LinUcb => Ok(Policy::LinUcb(LinUcb::new(LinUcbConfig {
                feature_dim: config.feature_dim,
                action_count,
                alpha: config.alpha,
                lambda: config.lambda,
            })?)),
            PolicyKind::ThompsonSampling => {
                Ok(Policy::ThompsonSampling(ThompsonSampling::new(ThompsonConfig {
                    feature_dim: config.feature_dim,
                    action_count,
                    nu: config.nu,
                    lambda: config.lambda,
                    seed: config.seed,
                })?))
            }
        }
    }

    /// Restore a policy, checking the snapshot against the caller's expected
    /// shape. Thompson Sampling gets an entropy-seeded random source.
    pub fn restore(
        snapshot: &PolicySnapshot,
        expected_feature_dim: usize,
        expected_action_count: usize,
    ) -> BanditResult<Self> {
        Self::restore_with_rng(
            snapshot,
            expected_feature_dim,
            expected_action_count,
            StdRng::from_entropy(),
        )
    }

    /// As [`Policy::restore`], with an explicit random source for Thompson
    /// Sampling (ignored by LinUCB).
    pub fn restore_with_rng(
        snapshot: &PolicySnapshot,
        expected_feature_dim: usize,
        expected_action_count: usize,
        rng: StdRng,
    ) -> BanditResult<Self> {
        let statistics = snapshot.validate(expected_feature_dim, expected_action_count)?;
        let persistence = |e: BanditError| BanditError::Persistence(e.to_string());

        let policy = match snapshot.hyperparameters {
            Hyperparameters::LinUcb { alpha, lambda } => Policy::LinUcb(
                LinUcb::from_statistics(
                    LinUcbConfig {
                        feature_dim: snapshot.feature_dim,
                        action_count: snapshot.action_count,
                        alpha,
                        lambda,
                    },
                    statistics,
                )
                .map_err(persistence)?,
            ),
            Hyperparameters::ThompsonSampling { nu, lambda } => Policy::ThompsonSampling(
                ThompsonSampling::from_statistics(
                    ThompsonConfig {
                        feature_dim: snapshot.feature_dim,
                        action_count: snapshot.action_count,
                        nu,
                        lambda,
                        seed: None,
                    },
                    statistics,
                    rng,
                )
                .map_err(persistence)?,
            ),
        };

        info!(
            kind = %policy.kind(),
            feature_dim = snapshot.feature_dim,
            action_count = snapshot.action_count,
            iterations = snapshot.counters.iterations,
            "Policy restored from snapshot"
        );
        Ok(policy)
    }

    fn inner(&self) -> &dyn BanditPolicy {
        match self {
            Policy::LinUcb(p) => p,
            Policy::ThompsonSampling(p) => p,
        }
    }
}

impl From<LinUcb> for Policy {
    fn from(policy: LinUcb) -> Self {
        Policy::LinUcb(policy)
    }
}

impl From<ThompsonSampling> for Policy {
    fn from(policy: ThompsonSampling) -> Self {
        Policy::ThompsonSampling(policy)
    }
}

impl BanditPolicy for Policy {
    fn kind(&self) -> PolicyKind {
        self.inner().kind()
    }

    fn feature_dim(&self) -> usize {
        self.inner().feature_dim()
    }

    fn action_count(&self) -> usize {
        self.inner().action_count()
    }

    fn select_action(&self, context: &[f64], candidates: Option<&[usize]>) -> BanditResult<Selection> {
        self.inner().select_action(context, candidates)
    }

    fn update(&self, action: usize, context: &[f64], reward: f64) -> BanditResult<()> {
        self.inner().update(action, context, reward)
    }

    fn expected_rewards(&self, context: &[f64]) -> BanditResult<Vec<f64>> {
        self.inner().expected_rewards(context)
    }

    fn snapshot(&self) -> PolicySnapshot {
        self.inner().snapshot()
    }

    fn telemetry(&self) -> PolicyTelemetry {
        self.inner().telemetry()
    }
}
