//! Stable mapping between external catalog item ids and action indices.

use reco_core::{BanditError, BanditResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordered catalog of item ids; position `i` is action `i` for the lifetime
/// of the policy trained against it. Serialises as a plain JSON array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ActionCatalog {
    items: Vec<String>,
    index: HashMap<String, usize>,
}

impl ActionCatalog {
    pub fn new(items: Vec<String>) -> BanditResult<Self> {
        if items.is_empty() {
            return Err(BanditError::Configuration(
                "action catalog must contain at least one item".to_string(),
            ));
        }
        let mut index = HashMap::with_capacity(items.len());
        for (i, id) in items.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                return Err(BanditError::Configuration(format!(
                    "duplicate catalog item id: {id}"
                )));
            }
        }
        Ok(Self { items, index })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn index_of(&self, item_id: &str) -> Option<usize> {
        self.index.get(item_id).copied()
    }

    /// Like [`index_of`](Self::index_of) but errors on unknown ids.
    pub fn require_index(&self, item_id: &str) -> BanditResult<usize> {
        self.index_of(item_id)
            .ok_or_else(|| BanditError::UnknownItem(item_id.to_string()))
    }

    pub fn item_id(&self, action: usize) -> Option<&str> {
        self.items.get(action).map(String::as_str)
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Ascending action indices, skipping excluded ids. Unknown excluded ids
    /// are ignored.
    pub fn candidates_excluding<S: AsRef<str>>(&self, excluded: &[S]) -> Vec<usize> {
        let excluded: HashSet<&str> = excluded.iter().map(|s| s.as_ref()).collect();
        self.items
            .iter()
            .enumerate()
            .filter(|(_, id)| !excluded.contains(id.as_str()))
            .map(|(i, _)| i)
            .collect()
    }
}

impl TryFrom<Vec<String>> for ActionCatalog {
    type Error = BanditError;

    fn try_from(items: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(items)
    }
}

impl From<ActionCatalog> for Vec<String> {
    fn from(catalog: ActionCatalog) -> Self {
        catalog.items
    }
}
