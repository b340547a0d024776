//! Shopping-list aggregation over a set of plan entries.
//!
//! Every planned component is resolved by exact name in its category (first
//! match wins when the library holds duplicates) and its ingredients are
//! summed by normalized name. Quantities are scaled only by how often a meal
//! occurs; library amounts already cover the reference household.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Category, MealIngredient, MealLibrary, PlanEntry, ShoppingItem, normalize_name};
use crate::suggest::SuggestionProvider;

/// A planned component whose name has no match in its category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedMeal {
    pub date_key: String,
    pub category: Category,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub items: Vec<ShoppingItem>,
    /// Components that contributed nothing.
    pub unresolved: Vec<UnresolvedMeal>,
    /// Meal names whose ingredients came from suggestions rather than the library.
    pub estimated: Vec<String>,
}

/// Amounts keyed by normalized ingredient name, in first-seen order.
///
/// Amounts are summed only in [`Accumulator::into_items`], in ascending order,
/// so a total does not depend on the order of the plan entries.
#[derive(Default)]
struct Accumulator {
    index: HashMap<String, usize>,
    rows: Vec<(String, Vec<f64>, String)>,
}

impl Accumulator {
    fn add(&mut self, ingredient: &MealIngredient) {
        let key = normalize_name(&ingredient.name);
        if key.is_empty() {
            return;
        }
        if let Some(&i) = self.index.get(&key) {
            let row = &mut self.rows[i];
            if row.2 != ingredient.unit {
                debug!(
                    ingredient = %row.0,
                    kept = %row.2,
                    other = %ingredient.unit,
                    "unit mismatch, summing without conversion"
                );
            }
            row.1.push(ingredient.amount);
        } else {
            self.index.insert(key, self.rows.len());
            self.rows.push((
                ingredient.name.trim().to_string(),
                vec![ingredient.amount],
                ingredient.unit.clone(),
            ));
        }
    }

    fn into_items(self) -> Vec<ShoppingItem> {
        self.rows
            .into_iter()
            .map(|(name, mut amounts, unit)| {
                amounts.sort_by(f64::total_cmp);
                ShoppingItem {
                    id: Uuid::new_v4().to_string(),
                    name,
                    quantity: amounts.iter().sum(),
                    unit,
                    actual_cost: None,
                }
            })
            .collect()
    }
}

fn run(
    entries: &[PlanEntry],
    library: &MealLibrary,
    suggestions: Option<&HashMap<String, Vec<MealIngredient>>>,
) -> Aggregation {
    let mut acc = Accumulator::default();
    let mut unresolved = Vec::new();
    let mut estimated: Vec<String> = Vec::new();

    for entry in entries {
        for (category, name) in entry.components() {
            if name.is_empty() {
                continue;
            }
            let ingredients = if let Some(item) = library.find(category, name) {
                &item.ingredients
            } else if let Some(suggested) = suggestions.and_then(|s| s.get(name)) {
                if !estimated.iter().any(|e| e == name) {
                    estimated.push(name.to_string());
                }
                suggested
            } else {
                unresolved.push(UnresolvedMeal {
                    date_key: entry.date_key.clone(),
                    category,
                    name: name.to_string(),
                });
                continue;
            };
            for ingredient in ingredients {
                acc.add(ingredient);
            }
        }
    }

    Aggregation {
        items: acc.into_items(),
        unresolved,
        estimated,
    }
}

fn logged(result: Aggregation) -> Aggregation {
    for u in &result.unresolved {
        warn!(date = %u.date_key, category = %u.category.key(), meal = %u.name, "meal not in library");
    }
    result
}

/// Aggregate library ingredients for `entries`. Unresolved components are skipped.
#[must_use]
pub fn aggregate(entries: &[PlanEntry], library: &MealLibrary) -> Vec<ShoppingItem> {
    logged(run(entries, library, None)).items
}

/// Like [`aggregate`], also reporting which components did not resolve.
#[must_use]
pub fn aggregate_detailed(entries: &[PlanEntry], library: &MealLibrary) -> Aggregation {
    logged(run(entries, library, None))
}

/// Distinct unresolved meal names, first-seen order.
#[must_use]
pub fn unresolved_meal_names(entries: &[PlanEntry], library: &MealLibrary) -> Vec<String> {
    let mut seen = HashSet::new();
    run(entries, library, None)
        .unresolved
        .into_iter()
        .filter(|u| seen.insert(u.name.clone()))
        .map(|u| u.name)
        .collect()
}

/// Aggregate, resolving library misses from `suggestions` keyed by meal name.
#[must_use]
pub fn aggregate_with_suggestions(
    entries: &[PlanEntry],
    library: &MealLibrary,
    suggestions: &HashMap<String, Vec<MealIngredient>>,
) -> Aggregation {
    logged(run(entries, library, Some(suggestions)))
}

/// Aggregate, asking `provider` once for every meal the library cannot resolve.
///
/// A provider failure is logged and the affected meals stay unresolved.
pub fn aggregate_with_fallback(
    entries: &[PlanEntry],
    library: &MealLibrary,
    provider: &dyn SuggestionProvider,
) -> Aggregation {
    let missing = unresolved_meal_names(entries, library);
    if missing.is_empty() {
        return logged(run(entries, library, None));
    }

    let suggestions = match provider.suggest_batch(&missing) {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %format!("{e:#}"), meals = missing.len(), "fallback suggestions failed");
            HashMap::new()
        }
    };
    logged(run(entries, library, Some(&suggestions)))
}

#[cfg(test)]
mod tests {
    use anyhow::{Result, bail};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::{EstimatedItem, LunchPlan, MealItem};

    fn entry(date: &str, main: &str, meat: &str) -> PlanEntry {
        PlanEntry {
            date_key: date.to_string(),
            breakfast: String::new(),
            lunch: LunchPlan {
                main: main.to_string(),
                veg1: String::new(),
                veg2: String::new(),
                meat: meat.to_string(),
            },
            dinner: String::new(),
        }
    }

    fn library() -> MealLibrary {
        MealLibrary::empty()
            .with_item(
                Category::LunchMains,
                MealItem::new("Red Rice").with_ingredients(vec![
                    MealIngredient::ai("Red Raw Rice", 600.0, "g"),
                    MealIngredient::manual("Salt", 5.0, "g"),
                ]),
            )
            .with_item(
                Category::LunchMeat,
                MealItem::new("Fish Curry").with_ingredients(vec![
                    MealIngredient::ai("Fish", 750.0, "g"),
                    MealIngredient::ai("salt ", 3.0, "g"),
                ]),
            )
    }

    fn find<'a>(items: &'a [ShoppingItem], name: &str) -> &'a ShoppingItem {
        items
            .iter()
            .find(|i| i.name == name)
            .unwrap_or_else(|| panic!("{name} missing from {items:?}"))
    }

    #[test]
    fn test_aggregate_empty_input() {
        assert!(aggregate(&[], &library()).is_empty());
    }

    #[test]
    fn test_aggregate_scales_by_occurrence() {
        let entries = vec![
            entry("2024-06-10", "Red Rice", ""),
            entry("2024-06-11", "Red Rice", ""),
        ];
        let items = aggregate(&entries, &library());
        assert_eq!(items.len(), 2);
        let rice = find(&items, "Red Raw Rice");
        assert!((rice.quantity - 1200.0).abs() < 1e-9);
        assert_eq!(rice.unit, "g");
        assert!(rice.actual_cost.is_none());
    }

    #[test]
    fn test_aggregate_end_to_end_three_days() {
        let entries = vec![
            entry("2024-06-10", "Red Rice", ""),
            entry("2024-06-11", "Red Rice", ""),
            entry("2024-06-12", "Red Rice", ""),
        ];
        let lib = MealLibrary::empty().with_item(
            Category::LunchMains,
            MealItem::new("Red Rice")
                .with_ingredients(vec![MealIngredient::ai("Red Raw Rice", 600.0, "g")]),
        );
        let items = aggregate(&entries, &lib);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Red Raw Rice");
        assert!((items[0].quantity - 1800.0).abs() < 1e-9);
        assert_eq!(items[0].unit, "g");
    }

    #[test]
    fn test_aggregate_order_independent_totals() {
        let lib = MealLibrary::empty()
            .with_item(
                Category::LunchMains,
                MealItem::new("A").with_ingredients(vec![MealIngredient::ai("Oil", 0.1, "l")]),
            )
            .with_item(
                Category::LunchMains,
                MealItem::new("B").with_ingredients(vec![MealIngredient::ai("Oil", 0.2, "l")]),
            )
            .with_item(
                Category::LunchMains,
                MealItem::new("C").with_ingredients(vec![MealIngredient::ai("Oil", 0.3, "l")]),
            );
        let forward = vec![
            entry("2024-06-10", "A", ""),
            entry("2024-06-11", "B", ""),
            entry("2024-06-12", "C", ""),
        ];
        let reverse: Vec<PlanEntry> = forward.iter().rev().cloned().collect();

        let fwd = aggregate(&forward, &lib);
        let rev = aggregate(&reverse, &lib);
        assert_eq!(fwd.len(), 1);
        assert_eq!(rev.len(), 1);
        assert_eq!(fwd[0].quantity.to_bits(), rev[0].quantity.to_bits());
        assert!((fwd[0].quantity - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_merges_case_insensitive_names() {
        let entries = vec![entry("2024-06-10", "Red Rice", "Fish Curry")];
        let items = aggregate(&entries, &library());
        let salt = find(&items, "Salt");
        assert!((salt.quantity - 8.0).abs() < 1e-9);
        assert_eq!(items.iter().filter(|i| i.name.eq_ignore_ascii_case("salt")).count(), 1);
    }

    #[test]
    fn test_aggregate_first_seen_order() {
        let entries = vec![entry("2024-06-10", "Red Rice", "Fish Curry")];
        let names: Vec<String> = aggregate(&entries, &library())
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Red Raw Rice", "Salt", "Fish"]);
    }

    #[test]
    fn test_aggregate_fresh_unique_ids() {
        let entries = vec![entry("2024-06-10", "Red Rice", "Fish Curry")];
        let first = aggregate(&entries, &library());
        let second = aggregate(&entries, &library());
        let ids: HashSet<&str> = first.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), first.len());
        assert_ne!(first[0].id, second[0].id);
    }

    #[test]
    fn test_aggregate_unit_mismatch_keeps_first_unit() {
        let lib = MealLibrary::empty()
            .with_item(
                Category::LunchMains,
                MealItem::new("A").with_ingredients(vec![MealIngredient::ai("Milk", 200.0, "ml")]),
            )
            .with_item(
                Category::LunchMeat,
                MealItem::new("B").with_ingredients(vec![MealIngredient::ai("milk", 1.0, "l")]),
            );
        let items = aggregate(&[entry("Monday", "A", "B")], &lib);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit, "ml");
        assert!((items[0].quantity - 201.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_unresolved_skipped_and_reported() {
        let entries = vec![entry("2024-06-10", "Red Rice", "Mystery Stew")];
        let result = aggregate_detailed(&entries, &library());
        assert_eq!(result.items.len(), 2);
        assert_eq!(
            result.unresolved,
            vec![UnresolvedMeal {
                date_key: "2024-06-10".to_string(),
                category: Category::LunchMeat,
                name: "Mystery Stew".to_string(),
            }]
        );
    }

    #[test]
    fn test_aggregate_name_resolution_is_per_category() {
        // "Red Rice" exists only as a lunch main, not as a meat
        let entries = vec![entry("2024-06-10", "", "Red Rice")];
        let result = aggregate_detailed(&entries, &library());
        assert!(result.items.is_empty());
        assert_eq!(result.unresolved.len(), 1);
    }

    #[test]
    fn test_aggregate_duplicate_names_first_match() {
        let lib = MealLibrary::empty()
            .with_item(
                Category::LunchMains,
                MealItem::new("Rice").with_ingredients(vec![MealIngredient::ai("A", 1.0, "g")]),
            )
            .with_item(
                Category::LunchMains,
                MealItem::new("Rice").with_ingredients(vec![MealIngredient::ai("B", 1.0, "g")]),
            );
        let items = aggregate(&[entry("Monday", "Rice", "")], &lib);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "A");
    }

    #[test]
    fn test_aggregate_skips_blank_ingredient_names() {
        let lib = MealLibrary::empty().with_item(
            Category::LunchMains,
            MealItem::new("Rice").with_ingredients(vec![
                MealIngredient::ai("  ", 10.0, "g"),
                MealIngredient::ai("Rice", 500.0, "g"),
            ]),
        );
        let items = aggregate(&[entry("Monday", "Rice", "")], &lib);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_unresolved_meal_names_distinct() {
        let entries = vec![
            entry("2024-06-10", "Kiribath", "Mystery"),
            entry("2024-06-11", "Kiribath", "Fish Curry"),
        ];
        assert_eq!(
            unresolved_meal_names(&entries, &library()),
            vec!["Kiribath", "Mystery"]
        );
    }

    #[test]
    fn test_aggregate_with_suggestions_fills_gaps() {
        let entries = vec![entry("2024-06-10", "Red Rice", "Mystery Stew")];
        let mut suggestions = HashMap::new();
        suggestions.insert(
            "Mystery Stew".to_string(),
            vec![MealIngredient::ai("Salt", 2.0, "g")],
        );
        let result = aggregate_with_suggestions(&entries, &library(), &suggestions);
        assert!(result.unresolved.is_empty());
        assert_eq!(result.estimated, vec!["Mystery Stew"]);
        assert!((find(&result.items, "Salt").quantity - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_with_suggestions_library_wins() {
        let entries = vec![entry("2024-06-10", "Red Rice", "")];
        let mut suggestions = HashMap::new();
        suggestions.insert(
            "Red Rice".to_string(),
            vec![MealIngredient::ai("Something Else", 1.0, "g")],
        );
        let result = aggregate_with_suggestions(&entries, &library(), &suggestions);
        assert!(result.estimated.is_empty());
        assert_eq!(result.items.len(), 2);
    }

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl SuggestionProvider for CountingProvider {
        fn suggest_one(&self, _meal_name: &str) -> Result<Vec<MealIngredient>> {
            bail!("not used")
        }

        fn suggest_batch(
            &self,
            meal_names: &[String],
        ) -> Result<HashMap<String, Vec<MealIngredient>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("HTTP 503");
            }
            Ok(meal_names
                .iter()
                .map(|n| (n.clone(), vec![MealIngredient::ai("Coconut", 1.0, "units")]))
                .collect())
        }

        fn estimate_for_plan(&self, _entries: &[PlanEntry]) -> Result<Vec<EstimatedItem>> {
            bail!("not used")
        }
    }

    #[test]
    fn test_fallback_not_called_when_all_resolve() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let entries = vec![entry("2024-06-10", "Red Rice", "Fish Curry")];
        let result = aggregate_with_fallback(&entries, &library(), &provider);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.items.len(), 3);
    }

    #[test]
    fn test_fallback_resolves_missing_meals() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        let entries = vec![
            entry("2024-06-10", "Kiribath", "Fish Curry"),
            entry("2024-06-11", "Kiribath", ""),
        ];
        let result = aggregate_with_fallback(&entries, &library(), &provider);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(result.unresolved.is_empty());
        assert!((find(&result.items, "Coconut").quantity - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_fallback_failure_degrades_to_library_only() {
        let provider = CountingProvider {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let entries = vec![entry("2024-06-10", "Kiribath", "Fish Curry")];
        let result = aggregate_with_fallback(&entries, &library(), &provider);
        assert_eq!(result.unresolved.len(), 1);
        assert_eq!(result.items.len(), 2);
    }
}
