//! Per-action sufficient statistics and the lock-per-action store both
//! policies are built on.

use crate::linalg::{ensure_finite, ensure_finite_scalar, Cholesky};
use ndarray::{Array1, Array2, ArrayView1};
use parking_lot::{RwLock, RwLockReadGuard};
use reco_core::{BanditError, BanditResult};

/// Design matrix `A = λI + Σ x xᵀ` and response vector `b = Σ r x` for one
/// action, plus the diagnostic counters that ride along with them.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionStatistics {
    design: Array2<f64>,
    response: Array1<f64>,
    observations: u64,
    cumulative_reward: f64,
}

impl ActionStatistics {
    /// Fresh statistics at `λ·I`; `lambda` is validated by the policy.
    pub fn new(feature_dim: usize, lambda: f64) -> Self {
        Self {
            design: Array2::eye(feature_dim) * lambda,
            response: Array1::zeros(feature_dim),
            observations: 0,
            cumulative_reward: 0.0,
        }
    }

    /// Reassemble statistics from restored parts. Shape and definiteness
    /// are checked by the snapshot layer before this is called.
    pub(crate) fn from_parts(
        design: Array2<f64>,
        response: Array1<f64>,
        observations: u64,
        cumulative_reward: f64,
    ) -> Self {
        Self {
            design,
            response,
            observations,
            cumulative_reward,
        }
    }

    pub fn feature_dim(&self) -> usize {
        self.response.len()
    }

    pub fn design(&self) -> &Array2<f64> {
        &self.design
    }

    pub fn response(&self) -> &Array1<f64> {
        &self.response
    }

    pub fn observations(&self) -> u64 {
        self.observations
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    /// Rank-1 update: `A += x xᵀ`, `b += r x`.
    pub fn observe(&mut self, context: ArrayView1<f64>, reward: f64) {
        let d = self.feature_dim();
        for i in 0..d {
            let xi = context[i];
            if xi == 0.0 {
                continue;
            }
            for j in 0..d {
                self.design[[i, j]] += xi * context[j];
            }
        }
        self.response.scaled_add(reward, &context);
        self.observations += 1;
        self.cumulative_reward += reward;
    }

    /// Fails when an update has overflowed the design matrix or response.
    pub(crate) fn check_finite(&self) -> BanditResult<()> {
        if self.design.iter().any(|v| !v.is_finite()) {
            return Err(BanditError::NumericInstability(
                "design matrix overflowed to a non-finite value".to_string(),
            ));
        }
        ensure_finite(self.response.view(), "response vector")?;
        ensure_finite_scalar(self.cumulative_reward, "cumulative reward")?;
        Ok(())
    }

    pub fn factor(&self) -> BanditResult<Cholesky> {
        Cholesky::factor(&self.design)
    }

    /// Ridge estimate `θ = A⁻¹ b`.
    pub fn point_estimate(&self) -> BanditResult<Array1<f64>> {
        self.factor()?.solve(self.response.view())
    }
}

/// Access to the statistics embedded in a policy-specific arm state.
pub(crate) trait ArmState {
    fn statistics(&self) -> &ActionStatistics;
}

/// Reject observations that would poison the positive-definite invariant.
pub(crate) fn check_observation(context: ArrayView1<f64>, reward: f64) -> BanditResult<()> {
    ensure_finite(context, "context")?;
    ensure_finite_scalar(reward, "reward")?;
    Ok(())
}

/// Per-action state behind one `RwLock` per action.
///
/// Selection and update on action `i` share that action's lock, so a reader
/// sees either the pre- or post-update state. Updates to different actions
/// never contend. [`StatisticsStore::read_all`] acquires every read lock in
/// ascending order and holds them together, which pins a single consistent
/// instant across all actions.
pub(crate) struct StatisticsStore<S> {
    feature_dim: usize,
    arms: Vec<RwLock<S>>,
}

impl<S: ArmState> StatisticsStore<S> {
    pub(crate) fn new(feature_dim: usize, arms: Vec<S>) -> Self {
        Self {
            feature_dim,
            arms: arms.into_iter().map(RwLock::new).collect(),
        }
    }

    pub(crate) fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub(crate) fn action_count(&self) -> usize {
        self.arms.len()
    }

    pub(crate) fn check_context(&self, context: &[f64]) -> BanditResult<()> {
        if context.len() != self.feature_dim {
            return Err(BanditError::context_length(self.feature_dim, context.len()));
        }
        Ok(())
    }

    pub(crate) fn check_action(&self, action: usize) -> BanditResult<()> {
        if action >= self.arms.len() {
            return Err(BanditError::action_out_of_range(action, self.arms.len()));
        }
        Ok(())
    }

    /// Candidate list in caller order; all actions ascending when omitted.
    pub(crate) fn resolve_candidates(&self, candidates: Option<&[usize]>) -> BanditResult<Vec<usize>> {
        let resolved: Vec<usize> = match candidates {
            Some(list) => list.to_vec(),
            None => (0..self.arms.len()).collect(),
        };
        if resolved.is_empty() {
            return Err(BanditError::EmptyCandidateSet);
        }
        for &action in &resolved {
            self.check_action(action)?;
        }
        Ok(resolved)
    }

    pub(crate) fn with_arm<R>(&self, action: usize, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.arms[action].read();
        f(&guard)
    }

    pub(crate) fn with_arm_mut<R>(&self, action: usize, f: impl FnOnce(&mut S) -> R) -> R {
        let mut guard = self.arms[action].write();
        f(&mut guard)
    }

    pub(crate) fn read_all(&self) -> Vec<RwLockReadGuard<'_, S>> {
        self.arms.iter().map(|arm| arm.read()).collect()
    }

    /// Clone of every action's statistics at one consistent instant.
    pub(crate) fn statistics_snapshot(&self) -> Vec<ActionStatistics> {
        self.read_all()
            .iter()
            .map(|guard| guard.statistics().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    impl ArmState for ActionStatistics {
        fn statistics(&self) -> &ActionStatistics {
            self
        }
    }

    #[test]
    fn test_observe_rank_one_update() {
        let mut stats = ActionStatistics::new(2, 1.0);
        stats.observe(array![1.0, 0.0].view(), 1.0);
        assert_eq!(stats.design(), &array![[2.0, 0.0], [0.0, 1.0]]);
        assert_eq!(stats.response(), &array![1.0, 0.0]);
        assert_eq!(stats.observations(), 1);
        assert!((stats.cumulative_reward() - 1.0).abs() < 1e-12);

        let theta = stats.point_estimate().unwrap();
        assert!((theta[0] - 0.5).abs() < 1e-12);
        assert!(theta[1].abs() < 1e-12);
    }

    #[test]
    fn test_design_stays_positive_definite() {
        let mut stats = ActionStatistics::new(3, 0.5);
        let contexts = [
            array![1.0, 2.0, 3.0],
            array![-4.0, 0.0, 1e3],
            array![1.0, 2.0, 3.0],
            array![0.0, 0.0, 0.0],
            array![1e-6, -1e-6, 5.0],
        ];
        for (i, x) in contexts.iter().cycle().take(200).enumerate() {
            stats.observe(x.view(), i as f64 - 50.0);
            assert!(stats.factor().is_ok(), "lost definiteness after update {i}");
            assert!(crate::linalg::is_symmetric(stats.design(), 1e-12));
        }
    }

    #[test]
    fn test_store_bounds_and_candidates() {
        let store = StatisticsStore::new(
            2,
            vec![ActionStatistics::new(2, 1.0), ActionStatistics::new(2, 1.0)],
        );
        assert!(store.check_context(&[1.0, 2.0]).is_ok());
        assert!(matches!(
            store.check_context(&[1.0]),
            Err(BanditError::DimensionMismatch(_))
        ));
        assert!(matches!(
            store.check_action(2),
            Err(BanditError::DimensionMismatch(_))
        ));
        assert_eq!(store.resolve_candidates(None).unwrap(), vec![0, 1]);
        assert_eq!(store.resolve_candidates(Some(&[1, 0])).unwrap(), vec![1, 0]);
        assert!(matches!(
            store.resolve_candidates(Some(&[])),
            Err(BanditError::EmptyCandidateSet)
        ));
        assert!(matches!(
            store.resolve_candidates(Some(&[0, 5])),
            Err(BanditError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_check_observation_rejects_non_finite() {
        assert!(check_observation(array![1.0, 2.0].view(), 0.5).is_ok());
        assert!(check_observation(array![f64::NAN, 2.0].view(), 0.5).is_err());
        assert!(check_observation(array![1.0, 2.0].view(), f64::INFINITY).is_err());
    }
}
