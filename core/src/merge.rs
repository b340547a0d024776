//! Merging freshly suggested ingredients into a meal's existing list.
//!
//! Manual records always survive. A suggestion whose name collides with a
//! manual record (case-insensitive, trimmed) is dropped entirely rather than
//! merged field by field. Earlier AI records are replaced by the new set.
//!
//! Known limitation: only leading/trailing whitespace is ignored, so
//! "Red  Onion" and "Red Onion" are different names.

use std::collections::HashSet;

use crate::models::{MealIngredient, Provenance};

/// Merge `suggested` into `existing`.
///
/// Result order: manual records first in their original order, then the
/// surviving suggestions in suggestion order, all tagged [`Provenance::Ai`].
#[must_use]
pub fn merge_ingredients(
    existing: &[MealIngredient],
    suggested: &[MealIngredient],
) -> Vec<MealIngredient> {
    let manual: Vec<&MealIngredient> = existing.iter().filter(|i| i.is_manual()).collect();
    let taken: HashSet<String> = manual.iter().map(|i| i.name_key()).collect();

    let mut merged: Vec<MealIngredient> = manual.into_iter().cloned().collect();
    merged.extend(
        suggested
            .iter()
            .filter(|s| !taken.contains(&s.name_key()))
            .map(|s| MealIngredient {
                provenance: Provenance::Ai,
                ..s.clone()
            }),
    );
    merged
}

#[must_use]
pub fn has_manual(existing: &[MealIngredient]) -> bool {
    existing.iter().any(MealIngredient::is_manual)
}
