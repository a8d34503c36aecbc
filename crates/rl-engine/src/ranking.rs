//! Top-k recommendation lists built from repeated single-action selection.

use crate::policy::BanditPolicy;
use reco_core::{BanditError, BanditResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAction {
    /// 1-based position in the list.
    pub rank: usize,
    pub action: usize,
    pub score: f64,
    /// `score / 10` clamped to `[0, 1]`.
    pub confidence: f64,
}

/// Select up to `k` distinct actions, removing each winner from the
/// candidate set before the next selection.
///
/// An empty candidate set or `k == 0` yields an empty list; the context and
/// candidate indices are still validated.
pub fn rank_top_k<P: BanditPolicy + ?Sized>(
    policy: &P,
    context: &[f64],
    candidates: Option<&[usize]>,
    k: usize,
) -> BanditResult<Vec<RankedAction>> {
    if context.len() != policy.feature_dim() {
        return Err(BanditError::context_length(policy.feature_dim(), context.len()));
    }
    let mut remaining: Vec<usize> = match candidates {
        Some(list) => list.to_vec(),
        None => (0..policy.action_count()).collect(),
    };
    if let Some(&bad) = remaining.iter().find(|&&a| a >= policy.action_count()) {
        return Err(BanditError::action_out_of_range(bad, policy.action_count()));
    }

    let mut ranked = Vec::with_capacity(k.min(remaining.len()));
    while ranked.len() < k && !remaining.is_empty() {
        let selection = policy.select_action(context, Some(&remaining))?;
        remaining.retain(|&a| a != selection.action);
        ranked.push(RankedAction {
            rank: ranked.len() + 1,
            action: selection.action,
            score: selection.score,
            confidence: (selection.score / 10.0).clamp(0.0, 1.0),
        });
    }

    debug!(requested = k, returned = ranked.len(), "Ranked actions");
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linucb::{LinUcb, LinUcbConfig};

    fn trained() -> LinUcb {
        let policy = LinUcb::new(LinUcbConfig {
            feature_dim: 2,
            action_count: 4,
            alpha: 0.0,
            lambda: 1.0,
        })
        .unwrap();
        let x = [1.0, 0.0];
        policy.update(0, &x, 1.0).unwrap();
        policy.update(1, &x, 30.0).unwrap();
        policy.update(2, &x, 4.0).unwrap();
        policy.update(3, &x, -2.0).unwrap();
        policy
    }

    #[test]
    fn test_ranks_by_score_without_repeats() {
        let ranked = rank_top_k(&trained(), &[1.0, 0.0], None, 3).unwrap();
        let actions: Vec<usize> = ranked.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![1, 2, 0]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);
        assert!((ranked[0].confidence - 1.0).abs() < 1e-12);
        assert!((ranked[1].confidence - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_respects_candidates_and_short_lists() {
        let ranked = rank_top_k(&trained(), &[1.0, 0.0], Some(&[3, 0]), 10).unwrap();
        let actions: Vec<usize> = ranked.iter().map(|r| r.action).collect();
        assert_eq!(actions, vec![0, 3]);
        assert_eq!(ranked[1].confidence, 0.0);
    }

    #[test]
    fn test_empty_results_and_errors() {
        let policy = trained();
        assert!(rank_top_k(&policy, &[1.0, 0.0], None, 0).unwrap().is_empty());
        assert!(rank_top_k(&policy, &[1.0, 0.0], Some(&[]), 3).unwrap().is_empty());
        assert!(matches!(
            rank_top_k(&policy, &[1.0], None, 3),
            Err(BanditError::DimensionMismatch(_))
        ));
        assert!(matches!(
            rank_top_k(&policy, &[1.0, 0.0], Some(&[9]), 3),
            Err(BanditError::DimensionMismatch(_))
        ));
    }
}
