use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::aggregate::{self, Aggregation, UnresolvedMeal};
use crate::archive::ShoppingArchive;
use crate::cost::{self, CostSummary};
use crate::db::Database;
use crate::error::PlannerError;
use crate::library::IngredientUpdate;
use crate::models::{
    Category, EstimatedItem, MealIngredient, MealItem, MealLibrary, PlanEntry, SavedShoppingList,
    ShoppingItem, ShoppingList,
};
use crate::plan::{DateKey, MealPlan, PlanField, period_label};
use crate::suggest::SuggestionProvider;
use crate::sync::{self, BatchReport, InFlight, SyncOutcome, SyncTarget};

/// How the active shopping list is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListStrategy {
    /// Library ingredients only; never calls the suggestion service.
    #[default]
    Library,
    /// Library ingredients, with suggestions for meals the library lacks.
    Auto,
    /// One consolidated estimate from the suggestion service.
    Estimate,
}

impl fmt::Display for ListStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => f.write_str("library"),
            Self::Auto => f.write_str("auto"),
            Self::Estimate => f.write_str("estimate"),
        }
    }
}

impl FromStr for ListStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "library" => Ok(Self::Library),
            "auto" => Ok(Self::Auto),
            "estimate" | "ai" => Ok(Self::Estimate),
            _ => bail!("Invalid strategy '{s}'. Must be one of: library, auto, estimate"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub strategy: ListStrategy,
    pub list: ShoppingList,
    pub unresolved: Vec<UnresolvedMeal>,
    pub estimated: Vec<String>,
}

/// Inputs for building a list outside the service, e.g. while awaiting an
/// async suggestion call without holding the service lock.
#[derive(Debug, Clone)]
pub struct PlanContext {
    pub entries: Vec<PlanEntry>,
    pub library: MealLibrary,
    pub unresolved_names: Vec<String>,
}

pub struct PlannerService {
    db: Database,
    in_flight: InFlight,
}

impl PlannerService {
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Database::open(Path::new(db_path))?;
        Ok(Self {
            db,
            in_flight: InFlight::new(),
        })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db,
            in_flight: InFlight::new(),
        })
    }

    /// Shared in-flight registry, for callers that run syncs themselves.
    #[must_use]
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    fn with_library<R>(&self, f: impl FnOnce(&mut MealLibrary) -> Result<R>) -> Result<R> {
        let mut library = self.db.load_library()?;
        let result = f(&mut library)?;
        self.db.save_library(&library)?;
        Ok(result)
    }

    fn with_shopping_list<R>(&self, f: impl FnOnce(&mut ShoppingList) -> Result<R>) -> Result<R> {
        let mut list = self.db.load_shopping_list()?;
        let result = f(&mut list)?;
        self.db.save_shopping_list(&list)?;
        Ok(result)
    }

    // --- Library ---

    pub fn library(&self) -> Result<MealLibrary> {
        self.db.load_library()
    }

    pub fn meal_items(&self, category: Category) -> Result<Vec<MealItem>> {
        Ok(self.db.load_library()?.items(category).to_vec())
    }

    pub fn meal_item(&self, category: Category, index: usize) -> Result<MealItem> {
        self.db
            .load_library()?
            .items(category)
            .get(index)
            .cloned()
            .ok_or_else(|| {
                PlannerError::NotFound(format!("{category} has no item at position {index}")).into()
            })
    }

    pub fn add_meal(&self, category: Category, name: &str) -> Result<MealItem> {
        self.with_library(|lib| {
            let index = lib.add_item(category, name)?;
            Ok(lib.items(category)[index].clone())
        })
    }

    pub fn rename_meal(&self, category: Category, index: usize, new_name: &str) -> Result<MealItem> {
        self.with_library(|lib| {
            lib.rename_item(category, index, new_name)?;
            Ok(lib.items(category)[index].clone())
        })
    }

    pub fn remove_meal(&self, category: Category, index: usize) -> Result<MealItem> {
        self.with_library(|lib| lib.remove_item(category, index))
    }

    pub fn add_ingredient(
        &self,
        category: Category,
        index: usize,
        ingredient: MealIngredient,
    ) -> Result<MealItem> {
        self.with_library(|lib| lib.add_ingredient(category, index, ingredient).cloned())
    }

    pub fn update_ingredient(
        &self,
        category: Category,
        index: usize,
        ingredient_index: usize,
        update: &IngredientUpdate,
    ) -> Result<MealItem> {
        self.with_library(|lib| {
            lib.update_ingredient(category, index, ingredient_index, update)
                .cloned()
        })
    }

    pub fn remove_ingredient(
        &self,
        category: Category,
        index: usize,
        ingredient_index: usize,
    ) -> Result<MealIngredient> {
        self.with_library(|lib| lib.remove_ingredient(category, index, ingredient_index))
    }

    // --- Plan ---

    pub fn plan(&self) -> Result<MealPlan> {
        self.db.load_plan()
    }

    pub fn set_plan_field(&self, date_key: &str, field: PlanField, value: &str) -> Result<PlanEntry> {
        let library = self.db.load_library()?;
        let value = value.trim();
        if !value.is_empty() && library.find(field.category(), value).is_none() {
            let err = PlannerError::UnresolvedMealReference {
                category: field.category(),
                name: value.to_string(),
            };
            warn!(%err, "planning a meal the library does not know");
        }
        let mut plan = self.db.load_plan()?;
        let entry = plan.upsert_field(date_key, field, value, &library)?;
        self.db.save_plan(&plan)?;
        Ok(entry)
    }

    pub fn clear_plan_day(&self, date_key: &str) -> Result<bool> {
        let mut plan = self.db.load_plan()?;
        let removed = plan.clear_day(date_key)?;
        if removed {
            self.db.save_plan(&plan)?;
        }
        Ok(removed)
    }

    pub fn plan_range(&self, start: &str, end: &str) -> Result<Vec<PlanEntry>> {
        self.db.load_plan()?.entries_in_range(start, end)
    }

    pub fn plan_context(&self, start: &str, end: &str) -> Result<PlanContext> {
        let entries = self.plan_range(start, end)?;
        let library = self.db.load_library()?;
        let unresolved_names = aggregate::unresolved_meal_names(&entries, &library);
        Ok(PlanContext {
            entries,
            library,
            unresolved_names,
        })
    }

    // --- Shopping list ---

    /// Rebuild the active list for `start..=end`.
    ///
    /// `Estimate` requires a provider and leaves the current list in place when
    /// the provider fails. `Auto` without a provider behaves like `Library`.
    pub fn generate_shopping_list(
        &self,
        start: &str,
        end: &str,
        strategy: ListStrategy,
        provider: Option<&dyn SuggestionProvider>,
    ) -> Result<GenerationReport> {
        let ctx = self.plan_context(start, end)?;
        match (strategy, provider) {
            (ListStrategy::Estimate, None) => {
                bail!("The estimate strategy needs a suggestion service. Set GEMINI_API_KEY")
            }
            (ListStrategy::Estimate, Some(provider)) => {
                let estimate = if ctx.entries.is_empty() {
                    Vec::new()
                } else {
                    provider.estimate_for_plan(&ctx.entries).map_err(|e| {
                        warn!(error = %format!("{e:#}"), "plan estimate failed");
                        PlannerError::suggestion(&e)
                    })?
                };
                self.store_estimate(start, end, estimate)
            }
            (ListStrategy::Auto, Some(provider)) => {
                let aggregation =
                    aggregate::aggregate_with_fallback(&ctx.entries, &ctx.library, provider);
                self.store_aggregation(start, end, strategy, aggregation)
            }
            (ListStrategy::Library | ListStrategy::Auto, _) => {
                let aggregation = aggregate::aggregate_detailed(&ctx.entries, &ctx.library);
                self.store_aggregation(start, end, strategy, aggregation)
            }
        }
    }

    /// Rebuild the active list from the current plan and library, filling
    /// library gaps from `suggestions`.
    pub fn generate_with_suggestions(
        &self,
        start: &str,
        end: &str,
        suggestions: &HashMap<String, Vec<MealIngredient>>,
    ) -> Result<GenerationReport> {
        let ctx = self.plan_context(start, end)?;
        let aggregation =
            aggregate::aggregate_with_suggestions(&ctx.entries, &ctx.library, suggestions);
        self.store_aggregation(start, end, ListStrategy::Auto, aggregation)
    }

    /// Replace the active list with a consolidated estimate.
    pub fn store_estimate(
        &self,
        start: &str,
        end: &str,
        estimate: Vec<EstimatedItem>,
    ) -> Result<GenerationReport> {
        let items = estimate
            .into_iter()
            .map(|e| ShoppingItem {
                id: Uuid::new_v4().to_string(),
                name: e.name,
                quantity: e.quantity,
                unit: e.unit,
                actual_cost: None,
            })
            .collect();
        let list = self.write_list(start, end, items)?;
        Ok(GenerationReport {
            strategy: ListStrategy::Estimate,
            list,
            unresolved: Vec::new(),
            estimated: Vec::new(),
        })
    }

    fn store_aggregation(
        &self,
        start: &str,
        end: &str,
        strategy: ListStrategy,
        aggregation: Aggregation,
    ) -> Result<GenerationReport> {
        let Aggregation {
            items,
            unresolved,
            estimated,
        } = aggregation;
        let list = self.write_list(start, end, items)?;
        debug!(
            %strategy,
            items = list.items.len(),
            unresolved = unresolved.len(),
            "shopping list generated"
        );
        Ok(GenerationReport {
            strategy,
            list,
            unresolved,
            estimated,
        })
    }

    fn write_list(&self, start: &str, end: &str, items: Vec<ShoppingItem>) -> Result<ShoppingList> {
        let list = ShoppingList {
            period_label: period_label(DateKey::parse(start)?, DateKey::parse(end)?),
            generated_at: Local::now().to_rfc3339(),
            items,
        };
        self.db.save_shopping_list(&list)?;
        Ok(list)
    }

    pub fn shopping_list(&self) -> Result<ShoppingList> {
        self.db.load_shopping_list()
    }

    pub fn replace_shopping_list(&self, list: &ShoppingList) -> Result<()> {
        self.db.save_shopping_list(list)
    }

    /// Record (or with `None`, clear) the amount paid for one item.
    pub fn set_actual_cost(&self, item_id: &str, cost: Option<f64>) -> Result<ShoppingItem> {
        self.with_shopping_list(|list| {
            let found = match cost {
                Some(c) => cost::set_actual_cost(&mut list.items, item_id, c)?,
                None => cost::clear_actual_cost(&mut list.items, item_id),
            };
            if !found {
                return Err(PlannerError::NotFound(format!(
                    "No item '{item_id}' on the current list"
                ))
                .into());
            }
            list.items
                .iter()
                .find(|i| i.id == item_id)
                .cloned()
                .ok_or_else(|| PlannerError::NotFound(item_id.to_string()).into())
        })
    }

    pub fn cost_summary(&self) -> Result<CostSummary> {
        Ok(cost::summarize(&self.db.load_shopping_list()?.items))
    }

    // --- Archive ---

    pub fn save_current_list(&self, name: &str) -> Result<SavedShoppingList> {
        let list = self.db.load_shopping_list()?;
        let mut archive = self.db.load_archive()?;
        let saved = archive.save(name, &list.period_label, &list.items)?;
        self.db.save_archive(&archive)?;
        Ok(saved)
    }

    pub fn saved_lists(&self) -> Result<ShoppingArchive> {
        self.db.load_archive()
    }

    /// Make a saved list the active list. The saved copy stays unchanged.
    pub fn load_saved_list(&self, id: &str) -> Result<ShoppingList> {
        let archive = self.db.load_archive()?;
        let saved = archive
            .get(id)
            .ok_or_else(|| PlannerError::NotFound(format!("No saved list '{id}'")))?;
        let list = ShoppingList {
            period_label: saved.period_label.clone(),
            generated_at: Local::now().to_rfc3339(),
            items: archive.load(id).unwrap_or_default(),
        };
        self.db.save_shopping_list(&list)?;
        Ok(list)
    }

    pub fn delete_saved_list(&self, id: &str) -> Result<bool> {
        let mut archive = self.db.load_archive()?;
        let deleted = archive.delete(id);
        if deleted {
            self.db.save_archive(&archive)?;
        }
        Ok(deleted)
    }

    // --- Sync ---

    pub fn meal_name_at(&self, category: Category, index: usize) -> Result<String> {
        Ok(self.meal_item(category, index)?.name)
    }

    pub fn apply_meal_suggestion(
        &self,
        category: Category,
        index: usize,
        expected_name: &str,
        suggested: &[MealIngredient],
    ) -> Result<SyncOutcome> {
        self.with_library(|lib| {
            Ok(sync::apply_suggestion(
                lib,
                category,
                index,
                expected_name,
                suggested,
            ))
        })
    }

    pub fn apply_library_suggestions(
        &self,
        batch: &HashMap<String, Vec<MealIngredient>>,
    ) -> Result<BatchReport> {
        self.with_library(|lib| Ok(sync::apply_batch(lib, batch)))
    }

    /// Fetch and merge suggestions for one meal.
    pub fn sync_meal(
        &self,
        provider: &dyn SuggestionProvider,
        category: Category,
        index: usize,
    ) -> Result<SyncOutcome> {
        let name = self.meal_name_at(category, index)?;
        let _guard = self
            .in_flight
            .try_begin(SyncTarget::Item { category, index })
            .ok_or_else(|| PlannerError::SyncInProgress(name.clone()))?;
        let suggested = provider.suggest_one(&name).map_err(|e| {
            warn!(meal = %name, error = %format!("{e:#}"), "ingredient suggestion failed");
            PlannerError::suggestion(&e)
        })?;
        self.apply_meal_suggestion(category, index, &name, &suggested)
    }

    /// Fetch and merge suggestions for every meal in the library in one call.
    pub fn sync_library(&self, provider: &dyn SuggestionProvider) -> Result<BatchReport> {
        let _guard = self
            .in_flight
            .try_begin(SyncTarget::Library)
            .ok_or_else(|| PlannerError::SyncInProgress("the library".to_string()))?;
        let names = self.db.load_library()?.meal_names();
        if names.is_empty() {
            return Ok(BatchReport::default());
        }
        let batch = provider.suggest_batch(&names).map_err(|e| {
            warn!(meals = names.len(), error = %format!("{e:#}"), "batch suggestion failed");
            PlannerError::suggestion(&e)
        })?;
        self.apply_library_suggestions(&batch)
    }
}
