//! Applying suggestion results to the library.
//!
//! Suggestion calls are slow, so callers resolve them without holding any
//! lock on the library and apply the result afterwards. The library may have
//! changed in the meantime; results for an item that was renamed or removed
//! are discarded. Item sync and whole-library sync are not serialized against
//! each other, only repeated requests for the same key are suppressed.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::merge::merge_ingredients;
use crate::models::{Category, MealIngredient, MealLibrary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTarget {
    Item { category: Category, index: usize },
    Library,
}

/// Registry of sync operations currently running.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    busy: Arc<Mutex<HashSet<SyncTarget>>>,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `target`. `None` means an operation for it is already running.
    #[must_use]
    pub fn try_begin(&self, target: SyncTarget) -> Option<InFlightGuard> {
        let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
        if !busy.insert(target) {
            debug!(?target, "sync already in flight, suppressing");
            return None;
        }
        Some(InFlightGuard {
            busy: Arc::clone(&self.busy),
            target,
        })
    }

    #[must_use]
    pub fn is_busy(&self, target: SyncTarget) -> bool {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&target)
    }
}

/// Releases its key when dropped, including on early return or panic.
#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<Mutex<HashSet<SyncTarget>>>,
    target: SyncTarget,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.target);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Applied { ingredients: Vec<MealIngredient> },
    /// The item was renamed, moved or removed while the suggestion was pending.
    Stale,
    /// The service returned nothing usable; the item was left as is.
    Empty,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub updated: usize,
    pub missing: Vec<(Category, String)>,
}

/// Merge `suggested` into the item at `index`, provided it is still named
/// `expected_name`.
pub fn apply_suggestion(
    library: &mut MealLibrary,
    category: Category,
    index: usize,
    expected_name: &str,
    suggested: &[MealIngredient],
) -> SyncOutcome {
    let Some(item) = library.items_mut(category).get_mut(index) else {
        return SyncOutcome::Stale;
    };
    if item.name != expected_name {
        debug!(expected = expected_name, found = %item.name, "discarding stale suggestion");
        return SyncOutcome::Stale;
    }
    if suggested.is_empty() {
        return SyncOutcome::Empty;
    }
    item.ingredients = merge_ingredients(&item.ingredients, suggested);
    SyncOutcome::Applied {
        ingredients: item.ingredients.clone(),
    }
}

/// Merge a name-keyed batch into every matching item. Items without a usable
/// suggestion keep their ingredients and are listed in `missing`.
pub fn apply_batch(
    library: &mut MealLibrary,
    batch: &HashMap<String, Vec<MealIngredient>>,
) -> BatchReport {
    let mut report = BatchReport::default();
    for category in Category::ALL {
        for item in library.items_mut(category).iter_mut() {
            match batch.get(&item.name).filter(|s| !s.is_empty()) {
                Some(suggested) => {
                    item.ingredients = merge_ingredients(&item.ingredients, suggested);
                    report.updated += 1;
                }
                None => report.missing.push((category, item.name.clone())),
            }
        }
    }
    report
}
