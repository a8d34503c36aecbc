//! reco-bandit: offline training, evaluation and ranking for the contextual
//! bandit recommendation engine.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reco_core::config::AppConfig;
use reco_core::{Interaction, PolicyKind};
use reco_rl_engine::{
    rank_top_k, ActionCatalog, BanditPolicy, OfflineTrainer, Policy, PolicySnapshot,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "reco-bandit")]
#[command(about = "Contextual bandit recommendation engine (LinUCB / Thompson Sampling)")]
#[command(version)]
struct Cli {
    /// Optional config file, layered under RECO_BANDIT__* environment variables
    #[arg(long, global = true, env = "RECO_BANDIT_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a fresh policy on the leading split of an interaction log
    Train {
        /// JSON array of catalog item ids; position is the action index
        #[arg(long)]
        catalog: PathBuf,

        /// Interaction log, one JSON object per line
        #[arg(long)]
        interactions: PathBuf,

        /// Algorithm: lin_ucb or thompson_sampling (overrides config)
        #[arg(long)]
        algorithm: Option<PolicyKind>,

        /// Replay passes over the log (overrides config)
        #[arg(long)]
        epochs: Option<usize>,

        /// Snapshot output path (default: <model_dir>/<algorithm>_model.json)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Evaluate a saved policy on the held-out tail of an interaction log
    Evaluate {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        interactions: PathBuf,

        #[arg(long)]
        snapshot: PathBuf,
    },

    /// Rank catalog items for one context
    Rank {
        #[arg(long)]
        catalog: PathBuf,

        #[arg(long)]
        snapshot: PathBuf,

        /// Comma-separated context features
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        context: Vec<f64>,

        /// Number of items to return
        #[arg(short, long, default_value_t = 10)]
        k: usize,

        /// Comma-separated item ids to leave out
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },

    /// Print a snapshot's telemetry
    Inspect {
        #[arg(long)]
        snapshot: PathBuf,
    },
}

#[derive(Serialize)]
struct RankedItem<'a> {
    rank: usize,
    item_id: &'a str,
    action: usize,
    score: f64,
    confidence: f64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reco_bandit=info,reco_rl_engine=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load_with_file(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    match cli.command {
        Commands::Train {
            catalog,
            interactions,
            algorithm,
            epochs,
            out,
        } => {
            if let Some(algorithm) = algorithm {
                config.bandit.algorithm = algorithm;
            }
            if let Some(epochs) = epochs {
                config.training.epochs = epochs;
            }
            info!(
                algorithm = %config.bandit.algorithm,
                feature_dim = config.bandit.feature_dim,
                epochs = config.training.epochs,
                "Configuration loaded"
            );

            let catalog = read_catalog(&catalog)?;
            let log = read_interactions(&interactions)?;
            let trainer = OfflineTrainer::new(config.training.clone(), config.rewards.clone())?;
            let policy = Policy::from_config(&config.bandit, catalog.len())?;

            let (training, evaluation) = trainer.fit(&policy, &catalog, &log)?;

            let out = out.unwrap_or_else(|| config.storage.model_path(config.bandit.algorithm));
            policy.snapshot().save(&out)?;

            print_json(&serde_json::json!({
                "training": training,
                "evaluation": evaluation,
                "snapshot": out.display().to_string(),
            }))
        }
        Commands::Evaluate {
            catalog,
            interactions,
            snapshot,
        } => {
            let catalog = read_catalog(&catalog)?;
            let log = read_interactions(&interactions)?;
            let policy = load_policy(&snapshot, config.bandit.feature_dim, catalog.len())?;
            let trainer = OfflineTrainer::new(config.training.clone(), config.rewards.clone())?;
            print_json(&trainer.evaluate(&policy, &catalog, &log)?)
        }
        Commands::Rank {
            catalog,
            snapshot,
            context,
            k,
            exclude,
        } => {
            let catalog = read_catalog(&catalog)?;
            let policy = load_policy(&snapshot, config.bandit.feature_dim, catalog.len())?;
            let candidates = catalog.candidates_excluding(exclude.as_slice());
            let ranked = rank_top_k(&policy, &context, Some(&candidates), k)?;

            let items: Vec<RankedItem<'_>> = ranked
                .iter()
                .map(|r| RankedItem {
                    rank: r.rank,
                    item_id: catalog.item_id(r.action).unwrap_or_default(),
                    action: r.action,
                    score: r.score,
                    confidence: r.confidence,
                })
                .collect();
            print_json(&items)
        }
        Commands::Inspect { snapshot } => {
            let raw = PolicySnapshot::load(&snapshot)?;
            let policy = Policy::restore(&raw, raw.feature_dim, raw.action_count)?;
            print_json(&serde_json::json!({
                "version": raw.version,
                "created_at": raw.created_at,
                "hyperparameters": raw.hyperparameters,
                "telemetry": policy.telemetry(),
            }))
        }
    }
}

fn read_catalog(path: &Path) -> anyhow::Result<ActionCatalog> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading catalog {}", path.display()))?;
    let catalog: ActionCatalog = serde_json::from_str(&raw)
        .with_context(|| format!("parsing catalog {}", path.display()))?;
    info!(path = %path.display(), items = catalog.len(), "Catalog loaded");
    Ok(catalog)
}

fn read_interactions(path: &Path) -> anyhow::Result<Vec<Interaction>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading interactions {}", path.display()))?;
    let interactions = raw
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Interaction>(line)
                .with_context(|| format!("{}:{}: malformed interaction", path.display(), n + 1))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    info!(path = %path.display(), count = interactions.len(), "Interactions loaded");
    Ok(interactions)
}

fn load_policy(path: &Path, feature_dim: usize, action_count: usize) -> anyhow::Result<Policy> {
    let snapshot = PolicySnapshot::load(path)
        .with_context(|| format!("loading snapshot {}", path.display()))?;
    Ok(Policy::restore(&snapshot, feature_dim, action_count)?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
