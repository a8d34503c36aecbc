//! Offline replay training and held-out evaluation over logged interactions.

use crate::catalog::ActionCatalog;
use crate::policy::BanditPolicy;
use chrono::{DateTime, Utc};
use reco_core::config::{RewardConfig, TrainingConfig};
use reco_core::{BanditError, BanditResult, Interaction, PolicyKind};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub algorithm: PolicyKind,
    pub epochs: usize,
    /// Interactions supplied per epoch, including skipped ones.
    pub interactions: usize,
    /// Interactions skipped in total across all epochs.
    pub skipped: usize,
    pub total_reward: f64,
    pub avg_reward: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub algorithm: PolicyKind,
    pub test_size: usize,
    pub matches: usize,
    pub accuracy: f64,
    pub avg_reward: f64,
    pub total_reward: f64,
    pub skipped: usize,
}

pub struct OfflineTrainer {
    config: TrainingConfig,
    rewards: RewardConfig,
}

impl OfflineTrainer {
    pub fn new(config: TrainingConfig, rewards: RewardConfig) -> BanditResult<Self> {
        if config.epochs == 0 {
            return Err(BanditError::Configuration(
                "training.epochs must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&config.test_fraction) {
            return Err(BanditError::Configuration(format!(
                "training.test_fraction must be in [0, 1), got {}",
                config.test_fraction
            )));
        }
        Ok(Self { config, rewards })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Split a log into its leading training part and trailing held-out part.
    pub fn split<'a>(&self, interactions: &'a [Interaction]) -> (&'a [Interaction], &'a [Interaction]) {
        let cut = (interactions.len() as f64 * (1.0 - self.config.test_fraction)).floor() as usize;
        interactions.split_at(cut.min(interactions.len()))
    }

    /// Replay every interaction as an update, `epochs` times over.
    pub fn train<P: BanditPolicy + ?Sized>(
        &self,
        policy: &P,
        catalog: &ActionCatalog,
        interactions: &[Interaction],
    ) -> BanditResult<TrainingReport> {
        self.check_volume(interactions)?;
        self.check_catalog(policy, catalog)?;
        self.replay(policy, catalog, interactions)
    }

    /// Train on the leading split of `log` and evaluate on its held-out
    /// tail. The minimum volume applies to the whole log.
    pub fn fit<P: BanditPolicy + ?Sized>(
        &self,
        policy: &P,
        catalog: &ActionCatalog,
        log: &[Interaction],
    ) -> BanditResult<(TrainingReport, EvaluationReport)> {
        self.check_volume(log)?;
        self.check_catalog(policy, catalog)?;
        let (train, _) = self.split(log);
        let training = self.replay(policy, catalog, train)?;
        let evaluation = self.evaluate(policy, catalog, log)?;
        Ok((training, evaluation))
    }

    fn check_volume(&self, interactions: &[Interaction]) -> BanditResult<()> {
        if interactions.len() < self.config.min_interactions {
            return Err(BanditError::InsufficientData {
                got: interactions.len(),
                min: self.config.min_interactions,
            });
        }
        Ok(())
    }

    fn replay<P: BanditPolicy + ?Sized>(
        &self,
        policy: &P,
        catalog: &ActionCatalog,
        interactions: &[Interaction],
    ) -> BanditResult<TrainingReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            %run_id,
            algorithm = %policy.kind(),
            interactions = interactions.len(),
            epochs = self.config.epochs,
            "Starting offline training"
        );

        let mut total_reward = 0.0;
        let mut skipped = 0;
        for epoch in 0..self.config.epochs {
            let mut epoch_reward = 0.0;
            for interaction in interactions {
                let Some(action) = self.resolve(policy, catalog, interaction) else {
                    skipped += 1;
                    continue;
                };
                let reward = self.rewards.reward_of(interaction);
                match policy.update(action, &interaction.context, reward) {
                    Ok(()) => epoch_reward += reward,
                    Err(e) => {
                        warn!(item_id = %interaction.item_id, error = %e, "Skipping interaction");
                        skipped += 1;
                    }
                }
            }
            total_reward += epoch_reward;
            info!(
                %run_id,
                epoch = epoch + 1,
                avg_reward = average(epoch_reward, interactions.len()),
                "Epoch complete"
            );
        }

        let report = TrainingReport {
            run_id,
            algorithm: policy.kind(),
            epochs: self.config.epochs,
            interactions: interactions.len(),
            skipped,
            total_reward,
            avg_reward: average(total_reward, self.config.epochs * interactions.len()),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %run_id,
            skipped = report.skipped,
            avg_reward = report.avg_reward,
            "Offline training finished"
        );
        Ok(report)
    }

    /// Compare the policy's choice with the logged item on the held-out tail
    /// of `interactions`. Rewards of logged items present in the catalog are
    /// summed whether or not the policy matched them.
    pub fn evaluate<P: BanditPolicy + ?Sized>(
        &self,
        policy: &P,
        catalog: &ActionCatalog,
        interactions: &[Interaction],
    ) -> BanditResult<EvaluationReport> {
        self.check_catalog(policy, catalog)?;
        let (_, test) = self.split(interactions);

        let mut matches = 0;
        let mut skipped = 0;
        let mut total_reward = 0.0;
        for interaction in test {
            let Some(actual) = self.resolve(policy, catalog, interaction) else {
                skipped += 1;
                continue;
            };
            match policy.select_action(&interaction.context, None) {
                Ok(selection) => {
                    if selection.action == actual {
                        matches += 1;
                    }
                    total_reward += self.rewards.reward_of(interaction);
                }
                Err(e) => {
                    warn!(item_id = %interaction.item_id, error = %e, "Skipping interaction");
                    skipped += 1;
                }
            }
        }

        let report = EvaluationReport {
            algorithm: policy.kind(),
            test_size: test.len(),
            matches,
            accuracy: average(matches as f64, test.len()),
            avg_reward: average(total_reward, test.len()),
            total_reward,
            skipped,
        };
        info!(
            algorithm = %report.algorithm,
            test_size = report.test_size,
            accuracy = report.accuracy,
            avg_reward = report.avg_reward,
            "Evaluation finished"
        );
        Ok(report)
    }

    fn check_catalog<P: BanditPolicy + ?Sized>(
        &self,
        policy: &P,
        catalog: &ActionCatalog,
    ) -> BanditResult<()> {
        if catalog.len() != policy.action_count() {
            return Err(BanditError::DimensionMismatch(format!(
                "catalog has {} items but the policy has {} actions",
                catalog.len(),
                policy.action_count()
            )));
        }
        Ok(())
    }

    fn resolve<P: BanditPolicy + ?Sized>(
        &self,
        policy: &P,
        catalog: &ActionCatalog,
        interaction: &Interaction,
    ) -> Option<usize> {
        let Some(action) = catalog.index_of(&interaction.item_id) else {
            warn!(item_id = %interaction.item_id, "Item not in catalog");
            return None;
        };
        if interaction.context.len() != policy.feature_dim() {
            warn!(
                item_id = %interaction.item_id,
                expected = policy.feature_dim(),
                got = interaction.context.len(),
                "Context length mismatch"
            );
            return None;
        }
        Some(action)
    }
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
