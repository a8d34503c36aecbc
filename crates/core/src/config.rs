use crate::types::{Interaction, InteractionKind, PolicyKind};
use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `RECO_BANDIT__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub bandit: BanditConfig,
    #[serde(default)]
    pub rewards: RewardConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BanditConfig {
    #[serde(default)]
    pub algorithm: PolicyKind,
    #[serde(default = "default_feature_dim")]
    pub feature_dim: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_nu")]
    pub nu: f64,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Seed for Thompson Sampling's random source; entropy-seeded when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardConfig {
    #[serde(default = "default_reward_view")]
    pub view: f64,
    #[serde(default = "default_reward_click")]
    pub click: f64,
    #[serde(default = "default_reward_cart_add")]
    pub cart_add: f64,
    #[serde(default = "default_reward_purchase")]
    pub purchase: f64,
    #[serde(default = "default_reward_wishlist")]
    pub wishlist: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_min_interactions")]
    pub min_interactions: usize,
    /// Trailing fraction of the interaction log held out for evaluation.
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_model_dir")]
    pub model_dir: String,
}

// Default functions
// 50 user features + 20 context features
fn default_feature_dim() -> usize {
    70
}
fn default_alpha() -> f64 {
    1.0
}
fn default_nu() -> f64 {
    1.0
}
fn default_lambda() -> f64 {
    1.0
}
fn default_reward_view() -> f64 {
    0.1
}
fn default_reward_click() -> f64 {
    0.5
}
fn default_reward_cart_add() -> f64 {
    2.0
}
fn default_reward_purchase() -> f64 {
    10.0
}
fn default_reward_wishlist() -> f64 {
    1.0
}
fn default_epochs() -> usize {
    1
}
fn default_min_interactions() -> usize {
    100
}
fn default_test_fraction() -> f64 {
    0.2
}
fn default_model_dir() -> String {
    "./models".to_string()
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            algorithm: PolicyKind::default(),
            feature_dim: default_feature_dim(),
            alpha: default_alpha(),
            nu: default_nu(),
            lambda: default_lambda(),
            seed: None,
        }
    }
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            view: default_reward_view(),
            click: default_reward_click(),
            cart_add: default_reward_cart_add(),
            purchase: default_reward_purchase(),
            wishlist: default_reward_wishlist(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            min_interactions: default_min_interactions(),
            test_fraction: default_test_fraction(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
        }
    }
}

impl RewardConfig {
    pub fn reward_for(&self, kind: InteractionKind) -> f64 {
        match kind {
            InteractionKind::View => self.view,
            InteractionKind::Click => self.click,
            InteractionKind::CartAdd => self.cart_add,
            InteractionKind::Purchase => self.purchase,
            InteractionKind::Wishlist => self.wishlist,
        }
    }

    /// Effective reward of a logged interaction: explicit reward, else the
    /// configured reward for its kind, else zero.
    pub fn reward_of(&self, interaction: &Interaction) -> f64 {
        interaction
            .reward
            .or_else(|| interaction.kind.map(|k| self.reward_for(k)))
            .unwrap_or(0.0)
    }
}

impl StorageConfig {
    /// Default snapshot location for a given algorithm.
    pub fn model_path(&self, algorithm: PolicyKind) -> std::path::PathBuf {
        std::path::Path::new(&self.model_dir).join(format!("{algorithm}_model.json"))
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_with_file(None)
    }

    /// Load configuration, layering environment variables over an optional
    /// TOML file.
    pub fn load_with_file(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("RECO_BANDIT")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
