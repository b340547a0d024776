use std::collections::HashSet;

use anyhow::{Result, bail};

use crate::error::PlannerError;
use crate::models::{
    Category, MealIngredient, MealItem, MealLibrary, Provenance, validate_amount,
    validate_ingredient, validate_meal_name,
};

/// Partial edit of one ingredient. Any edit marks the record as manual.
#[derive(Debug, Clone, Default)]
pub struct IngredientUpdate {
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub unit: Option<String>,
}

impl IngredientUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.amount.is_none() && self.unit.is_none()
    }
}

impl MealLibrary {
    /// First item with exactly this name. Duplicates resolve to the earliest.
    #[must_use]
    pub fn find(&self, category: Category, name: &str) -> Option<&MealItem> {
        self.items(category).iter().find(|m| m.name == name)
    }

    #[must_use]
    pub fn position(&self, category: Category, name: &str) -> Option<usize> {
        self.items(category).iter().position(|m| m.name == name)
    }

    #[must_use]
    pub fn first_name(&self, category: Category) -> String {
        self.items(category)
            .first()
            .map(|m| m.name.clone())
            .unwrap_or_default()
    }

    fn item_mut(&mut self, category: Category, index: usize) -> Result<&mut MealItem> {
        let len = self.items(category).len();
        self.items_mut(category).get_mut(index).ok_or_else(|| {
            PlannerError::NotFound(format!(
                "{category} has no item at position {index} ({len} items)"
            ))
            .into()
        })
    }

    fn ensure_unique(&self, category: Category, name: &str, skip: Option<usize>) -> Result<()> {
        let clash = self
            .items(category)
            .iter()
            .enumerate()
            .any(|(i, m)| Some(i) != skip && m.name == name);
        if clash {
            return Err(PlannerError::DuplicateMealName {
                category,
                name: name.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Append a new meal with no ingredients; returns its index.
    pub fn add_item(&mut self, category: Category, name: &str) -> Result<usize> {
        let name = validate_meal_name(name)?;
        self.ensure_unique(category, &name, None)?;
        let items = self.items_mut(category);
        items.push(MealItem::new(name));
        Ok(items.len() - 1)
    }

    pub fn rename_item(&mut self, category: Category, index: usize, new_name: &str) -> Result<()> {
        let new_name = validate_meal_name(new_name)?;
        self.item_mut(category, index)?;
        self.ensure_unique(category, &new_name, Some(index))?;
        self.item_mut(category, index)?.name = new_name;
        Ok(())
    }

    pub fn remove_item(&mut self, category: Category, index: usize) -> Result<MealItem> {
        self.item_mut(category, index)?;
        Ok(self.items_mut(category).remove(index))
    }

    /// Add a user-entered ingredient; it is always stored as manual.
    pub fn add_ingredient(
        &mut self,
        category: Category,
        index: usize,
        ingredient: MealIngredient,
    ) -> Result<&MealItem> {
        let ingredient = MealIngredient {
            name: ingredient.name.trim().to_string(),
            provenance: Provenance::Manual,
            ..ingredient
        };
        validate_ingredient(&ingredient)?;
        let item = self.item_mut(category, index)?;
        item.ingredients.push(ingredient);
        Ok(item)
    }

    pub fn update_ingredient(
        &mut self,
        category: Category,
        index: usize,
        ingredient_index: usize,
        update: &IngredientUpdate,
    ) -> Result<&MealItem> {
        if update.is_empty() {
            bail!("Nothing to update. Provide a name, amount, or unit");
        }
        if let Some(amount) = update.amount {
            validate_amount(amount)?;
        }
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            bail!("Ingredient name must not be empty");
        }

        let item = self.item_mut(category, index)?;
        let meal_name = item.name.clone();
        let ingredient = item.ingredients.get_mut(ingredient_index).ok_or_else(|| {
            PlannerError::NotFound(format!(
                "'{meal_name}' has no ingredient at position {ingredient_index}"
            ))
        })?;
        if let Some(name) = &update.name {
            ingredient.name = name.trim().to_string();
        }
        if let Some(amount) = update.amount {
            ingredient.amount = amount;
        }
        if let Some(unit) = &update.unit {
            ingredient.unit.clone_from(unit);
        }
        ingredient.provenance = Provenance::Manual;
        Ok(item)
    }

    pub fn remove_ingredient(
        &mut self,
        category: Category,
        index: usize,
        ingredient_index: usize,
    ) -> Result<MealIngredient> {
        let item = self.item_mut(category, index)?;
        if ingredient_index >= item.ingredients.len() {
            let meal_name = &item.name;
            return Err(PlannerError::NotFound(format!(
                "'{meal_name}' has no ingredient at position {ingredient_index}"
            ))
            .into());
        }
        Ok(item.ingredients.remove(ingredient_index))
    }

    /// Every meal name across all categories, deduplicated, first-seen order.
    #[must_use]
    pub fn meal_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        Category::ALL
            .iter()
            .flat_map(|c| self.items(*c))
            .filter(|m| seen.insert(m.name.clone()))
            .map(|m| m.name.clone())
            .collect()
    }

    /// Names that occur more than once inside a single category.
    #[must_use]
    pub fn duplicate_names(&self) -> Vec<(Category, String)> {
        let mut dupes = Vec::new();
        for category in Category::ALL {
            let mut seen = HashSet::new();
            for item in self.items(category) {
                if !seen.insert(item.name.as_str()) && !dupes.contains(&(category, item.name.clone()))
                {
                    dupes.push((category, item.name.clone()));
                }
            }
        }
        dupes
    }
}
