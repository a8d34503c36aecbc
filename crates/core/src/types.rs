use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which bandit algorithm a policy (or a snapshot of one) runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    LinUcb,
    ThompsonSampling,
}

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::LinUcb => "lin_ucb",
            PolicyKind::ThompsonSampling => "thompson_sampling",
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "lin_ucb" | "linucb" => Ok(PolicyKind::LinUcb),
            "thompson_sampling" | "thompson" => Ok(PolicyKind::ThompsonSampling),
            other => Err(format!("unsupported algorithm: {other}")),
        }
    }
}

/// Kind of user interaction logged against a recommended item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    View,
    Click,
    CartAdd,
    Purchase,
    Wishlist,
}

/// A logged (item, context, outcome) observation used for offline replay.
///
/// `reward` wins over `kind` when both are present; the reward for `kind` is
/// looked up in [`RewardConfig`](crate::config::RewardConfig) otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub item_id: String,
    pub context: Vec<f64>,
    #[serde(default)]
    pub kind: Option<InteractionKind>,
    #[serde(default)]
    pub reward: Option<f64>,
}
