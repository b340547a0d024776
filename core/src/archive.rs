use anyhow::{Result, bail};
use chrono::Local;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{SavedShoppingList, ShoppingItem};

/// Saved shopping lists, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShoppingArchive(pub Vec<SavedShoppingList>);

impl ShoppingArchive {
    /// Snapshot `items` under `name`. Later edits to the active list do not
    /// reach the snapshot.
    pub fn save(
        &mut self,
        name: &str,
        period_label: &str,
        items: &[ShoppingItem],
    ) -> Result<SavedShoppingList> {
        let name = name.trim();
        if name.is_empty() {
            bail!("List name must not be empty");
        }
        let saved = SavedShoppingList {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Local::now().to_rfc3339(),
            period_label: period_label.to_string(),
            items: items.to_vec(),
        };
        self.0.insert(0, saved.clone());
        Ok(saved)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SavedShoppingList> {
        self.0.iter().find(|s| s.id == id)
    }

    /// A copy of the saved items, ready to become the active list.
    #[must_use]
    pub fn load(&self, id: &str) -> Option<Vec<ShoppingItem>> {
        self.get(id).map(|s| s.items.clone())
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s.id != id);
        self.0.len() < before
    }

    pub fn iter(&self) -> impl Iterator<Item = &SavedShoppingList> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
