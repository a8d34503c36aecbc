//! Contextual bandit engine: LinUCB and linear Thompson Sampling over a
//! fixed action set, with per-action sufficient statistics, versioned
//! snapshots, top-k ranking, offline replay training and a named model
//! registry.

pub mod catalog;
pub mod linalg;
pub mod linucb;
pub mod policy;
pub mod ranking;
pub mod registry;
pub mod snapshot;
pub mod stats;
pub mod thompson;
pub mod training;

pub use catalog::ActionCatalog;
pub use linucb::{LinUcb, LinUcbConfig};
pub use policy::{BanditPolicy, Policy, PolicyTelemetry, Selection};
pub use ranking::{rank_top_k, RankedAction};
pub use registry::{ModelHandle, ModelRegistry};
pub use snapshot::{PolicySnapshot, SNAPSHOT_VERSION};
pub use stats::ActionStatistics;
pub use thompson::{ThompsonConfig, ThompsonSampling};
pub use training::{EvaluationReport, OfflineTrainer, TrainingReport};
