//! Named registry of live policies.
//!
//! Request handlers clone an `Arc<ModelHandle>` and keep using it for the
//! duration of a request. Installing a retrained or reloaded policy swaps the
//! entry; handlers still holding the old handle finish on the old instance.

use crate::policy::{BanditPolicy, Policy};
use crate::snapshot::PolicySnapshot;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use reco_core::{BanditError, BanditResult};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A policy installed under a name, with its install metadata.
pub struct ModelHandle {
    name: String,
    version: u64,
    installed_at: DateTime<Utc>,
    policy: Policy,
}

impl ModelHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Install counter for this name, starting at 1.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn installed_at(&self) -> DateTime<Utc> {
        self.installed_at
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}

pub struct ModelRegistry {
    models: DashMap<String, Arc<ModelHandle>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
        }
    }

    /// Install `policy` under `name`, replacing any previous model.
    pub fn install(&self, name: &str, policy: Policy) -> Arc<ModelHandle> {
        let kind = policy.kind();
        let handle = match self.models.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                let handle = Arc::new(ModelHandle {
                    name: name.to_string(),
                    version: entry.get().version + 1,
                    installed_at: Utc::now(),
                    policy,
                });
                entry.insert(handle.clone());
                handle
            }
            Entry::Vacant(entry) => {
                let handle = Arc::new(ModelHandle {
                    name: name.to_string(),
                    version: 1,
                    installed_at: Utc::now(),
                    policy,
                });
                entry.insert(handle.clone());
                handle
            }
        };

        info!(
            model = name,
            version = handle.version,
            kind = %kind,
            "Model installed"
        );
        handle
    }

    pub fn get(&self, name: &str) -> BanditResult<Arc<ModelHandle>> {
        self.models
            .get(name)
            .map(|h| h.value().clone())
            .ok_or_else(|| BanditError::ModelNotLoaded(name.to_string()))
    }

    pub fn remove(&self, name: &str) -> Option<Arc<ModelHandle>> {
        let removed = self.models.remove(name).map(|(_, h)| h);
        if removed.is_some() {
            info!(model = name, "Model removed");
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Load a snapshot file, restore it against the expected shape and
    /// install it under `name`.
    pub fn load_file(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        expected_feature_dim: usize,
        expected_action_count: usize,
    ) -> BanditResult<Arc<ModelHandle>> {
        let snapshot = PolicySnapshot::load(path)?;
        let policy = Policy::restore(&snapshot, expected_feature_dim, expected_action_count)?;
        Ok(self.install(name, policy))
    }

    /// Snapshot the named model to `path`.
    pub fn persist(&self, name: &str, path: impl AsRef<Path>) -> BanditResult<()> {
        let handle = self.get(name)?;
        handle.policy().snapshot().save(path)
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
