//! Thompson Sampling for linear contextual bandits.
//!
//! Each action carries a Gaussian posterior `N(μᵢ, ν·Bᵢ⁻¹)` with
//! `μᵢ = Bᵢ⁻¹ fᵢ`. Selection draws one parameter vector per candidate and
//! scores it against the context. `μᵢ` is refreshed on every update so the
//! posterior-mean reads in [`ThompsonSampling::expected_rewards`] stay `O(d)`.

use crate::linalg::{ensure_finite, ensure_finite_scalar};
use crate::linucb::validate_shape;
use crate::policy::{PolicyTelemetry, Selection};
use crate::snapshot::{Hyperparameters, PolicySnapshot};
use crate::stats::{check_observation, ActionStatistics, ArmState, StatisticsStore};
use ndarray::{Array1, ArrayView1};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use reco_core::{BanditError, BanditResult, PolicyKind};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThompsonConfig {
    pub feature_dim: usize,
    pub action_count: usize,
    /// Posterior noise scale; `0` collapses sampling onto the posterior mean.
    pub nu: f64,
    pub lambda: f64,
    /// Seed for the owned random source. Entropy-seeded when `None`.
    pub seed: Option<u64>,
}

impl ThompsonConfig {
    pub fn validate(&self) -> BanditResult<()> {
        validate_shape(self.feature_dim, self.action_count, self.lambda)?;
        if !self.nu.is_finite() || self.nu < 0.0 {
            return Err(BanditError::Configuration(format!(
                "nu must be finite and >= 0, got {}",
                self.nu
            )));
        }
        Ok(())
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

#[derive(Debug, Clone)]
struct ThompsonArm {
    stats: ActionStatistics,
    mean: Array1<f64>,
}

impl ThompsonArm {
    fn new(stats: ActionStatistics) -> BanditResult<Self> {
        let mean = stats.point_estimate()?;
        Ok(Self { stats, mean })
    }

    /// Map standard-normal noise `z` to `θ̃ = μ + sqrt(ν)·L⁻ᵀz` with
    /// `B = L Lᵀ`; its covariance is `ν·B⁻¹`.
    fn sample(&self, nu: f64, z: ArrayView1<f64>) -> BanditResult<Array1<f64>> {
        let chol = self.stats.factor()?;
        let mut theta = chol.solve_upper(z);
        theta *= nu.sqrt();
        theta += &self.mean;
        ensure_finite(theta.view(), "posterior sample")?;
        Ok(theta)
    }

    fn observe(&mut self, x: ArrayView1<f64>, reward: f64) -> BanditResult<()> {
        let mut stats = self.stats.clone();
        stats.observe(x, reward);
        stats.check_finite()?;
        let mean = stats.point_estimate()?;
        self.stats = stats;
        self.mean = mean;
        Ok(())
    }
}

impl ArmState for ThompsonArm {
    fn statistics(&self) -> &ActionStatistics {
        &self.stats
    }
}

/// Linear Thompson Sampling policy with an injectable random source.
pub struct ThompsonSampling {
    config: ThompsonConfig,
    store: StatisticsStore<ThompsonArm>,
    rng: Mutex<StdRng>,
}

impl ThompsonSampling {
    pub fn new(config: ThompsonConfig) -> BanditResult<Self> {
        let rng = config.rng();
        Self::with_rng(config, rng)
    }

    /// Construct with an explicit random source.
    pub fn with_rng(config: ThompsonConfig, rng: StdRng) -> BanditResult<Self> {
        config.validate()?;
        let arms = (0..config.action_count)
            .map(|_| ThompsonArm::new(ActionStatistics::new(config.feature_dim, config.lambda)))
            .collect::<BanditResult<Vec<_>>>()?;

        info!(
            feature_dim = config.feature_dim,
            action_count = config.action_count,
            nu = config.nu,
            lambda = config.lambda,
            seeded = config.seed.is_some(),
            "Initialized Thompson Sampling policy"
        );

        Ok(Self {
            store: StatisticsStore::new(config.feature_dim, arms),
            rng: Mutex::new(rng),
            config,
        })
    }

    pub(crate) fn from_statistics(
        config: ThompsonConfig,
        statistics: Vec<ActionStatistics>,
        rng: StdRng,
    ) -> BanditResult<Self> {
        config.validate()?;
        let arms = statistics
            .into_iter()
            .map(ThompsonArm::new)
            .collect::<BanditResult<Vec<_>>>()?;
        Ok(Self {
            store: StatisticsStore::new(config.feature_dim, arms),
            rng: Mutex::new(rng),
            config,
        })
    }

    pub fn config(&self) -> &ThompsonConfig {
        &self.config
    }

    pub fn feature_dim(&self) -> usize {
        self.store.feature_dim()
    }

    pub fn action_count(&self) -> usize {
        self.store.action_count()
    }

    /// Select using the policy's own random source. Only the noise draws
    /// hold the source's lock; factorisations run outside it.
    pub fn select_action(&self, context: &[f64], candidates: Option<&[usize]>) -> BanditResult<Selection> {
        self.store.check_context(context)?;
        let candidates = self.store.resolve_candidates(candidates)?;
        let noise = {
            let mut rng = self.rng.lock();
            self.draw_noise(candidates.len(), &mut *rng)
        };
        self.select_with_noise(context, &candidates, &noise)
    }

    /// Select using a caller-supplied random source.
    pub fn select_action_with<R: Rng + ?Sized>(
        &self,
        context: &[f64],
        candidates: Option<&[usize]>,
        rng: &mut R,
    ) -> BanditResult<Selection> {
        self.store.check_context(context)?;
        let candidates = self.store.resolve_candidates(candidates)?;
        let noise = self.draw_noise(candidates.len(), rng);
        self.select_with_noise(context, &candidates, &noise)
    }

    /// One `N(0, I)` vector per candidate, drawn in candidate order.
    fn draw_noise<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<Array1<f64>> {
        let d = self.feature_dim();
        (0..count)
            .map(|_| (0..d).map(|_| rng.sample::<f64, _>(StandardNormal)).collect())
            .collect()
    }

    fn select_with_noise(
        &self,
        context: &[f64],
        candidates: &[usize],
        noise: &[Array1<f64>],
    ) -> BanditResult<Selection> {
        let x = ArrayView1::from(context);
        let mut best: Option<Selection> = None;
        for (&action, z) in candidates.iter().zip(noise) {
            let theta = self
                .store
                .with_arm(action, |arm| arm.sample(self.config.nu, z.view()))?;
            let score = ensure_finite_scalar(theta.dot(&x), "sampled score")?;
            debug!(action, score, "Thompson candidate sample");
            if best.map_or(true, |b| score > b.score) {
                best = Some(Selection { action, score });
            }
        }

        best.ok_or(BanditError::EmptyCandidateSet)
    }

    pub fn update(&self, action: usize, context: &[f64], reward: f64) -> BanditResult<()> {
        self.store.check_action(action)?;
        self.store.check_context(context)?;
        let x = ArrayView1::from(context);
        check_observation(x, reward)?;

        self.store.with_arm_mut(action, |arm| arm.observe(x, reward))?;
        debug!(action, reward, "Thompson update applied");
        Ok(())
    }

    /// Posterior-mean estimate `μᵢ·x` for every action, no sampling.
    pub fn expected_rewards(&self, context: &[f64]) -> BanditResult<Vec<f64>> {
        self.store.check_context(context)?;
        let x = ArrayView1::from(context);
        (0..self.action_count())
            .map(|action| {
                let estimate = self.store.with_arm(action, |arm| arm.mean.dot(&x));
                ensure_finite_scalar(estimate, "expected reward")
            })
            .collect()
    }

    /// Cached posterior mean of one action.
    pub fn posterior_mean(&self, action: usize) -> BanditResult<Array1<f64>> {
        self.store.check_action(action)?;
        Ok(self.store.with_arm(action, |arm| arm.mean.clone()))
    }

    pub fn statistics(&self, action: usize) -> BanditResult<ActionStatistics> {
        self.store.check_action(action)?;
        Ok(self.store.with_arm(action, |arm| arm.stats.clone()))
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot::capture(
            Hyperparameters::ThompsonSampling {
                nu: self.config.nu,
                lambda: self.config.lambda,
            },
            self.feature_dim(),
            &self.store.statistics_snapshot(),
        )
    }

    pub fn telemetry(&self) -> PolicyTelemetry {
        PolicyTelemetry::from_statistics(
            PolicyKind::ThompsonSampling,
            self.feature_dim(),
            &self.store.statistics_snapshot(),
        )
    }
}
