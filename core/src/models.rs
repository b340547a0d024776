use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Number of people every library quantity is written for (three adults, two
/// children). Aggregation scales by occurrence count only, never by this.
pub const REFERENCE_HOUSEHOLD_SIZE: u32 = 5;

/// Where an ingredient record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Produced by the suggestion service.
    #[default]
    Ai,
    /// Created or edited directly by a user.
    Manual,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ai => f.write_str("ai"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealIngredient {
    pub name: String,
    pub amount: f64,
    pub unit: String,
    #[serde(default)]
    pub provenance: Provenance,
}

impl MealIngredient {
    pub fn manual(name: impl Into<String>, amount: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount,
            unit: unit.into(),
            provenance: Provenance::Manual,
        }
    }

    pub fn ai(name: impl Into<String>, amount: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amount,
            unit: unit.into(),
            provenance: Provenance::Ai,
        }
    }

    /// Key used when comparing ingredient names: trimmed and lowercased.
    #[must_use]
    pub fn name_key(&self) -> String {
        normalize_name(&self.name)
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.provenance == Provenance::Manual
    }
}

#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealItem {
    pub name: String,
    #[serde(default)]
    pub ingredients: Vec<MealIngredient>,
}

impl MealItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ingredients: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_ingredients(mut self, ingredients: Vec<MealIngredient>) -> Self {
        self.ingredients = ingredients;
        self
    }
}

/// The six fixed library collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BreakfastCombos,
    LunchMains,
    LunchVeg1,
    LunchVeg2,
    LunchMeat,
    DinnerCombos,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::BreakfastCombos,
        Category::LunchMains,
        Category::LunchVeg1,
        Category::LunchVeg2,
        Category::LunchMeat,
        Category::DinnerCombos,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::BreakfastCombos => "Breakfast combinations",
            Self::LunchMains => "Lunch mains",
            Self::LunchVeg1 => "Vegetable 1 (salads/sambols)",
            Self::LunchVeg2 => "Vegetable 2 (curries/roots)",
            Self::LunchMeat => "Meat / proteins",
            Self::DinnerCombos => "Dinner options",
        }
    }

    /// Stable kebab-case key used on the command line and in URLs.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::BreakfastCombos => "breakfast",
            Self::LunchMains => "lunch-main",
            Self::LunchVeg1 => "lunch-veg1",
            Self::LunchVeg2 => "lunch-veg2",
            Self::LunchMeat => "lunch-meat",
            Self::DinnerCombos => "dinner",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase().replace('_', "-");
        let category = match lower.as_str() {
            "breakfast" | "breakfast-combos" | "breakfastcombos" => Self::BreakfastCombos,
            "main" | "lunch-main" | "lunch-mains" | "lunchmains" => Self::LunchMains,
            "veg1" | "lunch-veg1" | "lunchveg1" => Self::LunchVeg1,
            "veg2" | "lunch-veg2" | "lunchveg2" => Self::LunchVeg2,
            "meat" | "protein" | "lunch-meat" | "lunchmeat" => Self::LunchMeat,
            "dinner" | "dinner-combos" | "dinnercombos" => Self::DinnerCombos,
            _ => bail!(
                "Invalid category '{s}'. Must be one of: {}",
                Category::ALL.map(Category::key).join(", ")
            ),
        };
        Ok(category)
    }
}

/// Every category's ordered meal items.
///
/// `Default` yields the starter catalog (names only); use [`MealLibrary::empty`]
/// for a blank library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealLibrary {
    #[serde(default)]
    pub breakfast_combos: Vec<MealItem>,
    #[serde(default)]
    pub lunch_mains: Vec<MealItem>,
    #[serde(default)]
    pub lunch_veg1: Vec<MealItem>,
    #[serde(default)]
    pub lunch_veg2: Vec<MealItem>,
    #[serde(default)]
    pub lunch_meat: Vec<MealItem>,
    #[serde(default)]
    pub dinner_combos: Vec<MealItem>,
}

const STARTER_BREAKFAST: &[&str] = &[
    "Bathala + Pol Sambol + Katta Sambol",
    "Rice + Parippu + Pol Sambol + Egg",
    "Red Rice + Parippu + Halmasso",
    "Rice + Gotukola + Soya",
    "Manioc + Pol Sambol",
    "Cowpea + Pol Sambol + Katta Sambol",
];
const STARTER_MAINS: &[&str] = &["Yellow Rice", "Red Rice", "White Rice"];
const STARTER_VEG1: &[&str] = &[
    "Beans",
    "Bandakka",
    "Karawila Salad",
    "Gowa Carrot Salad",
    "Spring Onion Salad",
    "Gotukola Sambol",
    "Spinach Kirata",
];
const STARTER_VEG2: &[&str] = &[
    "Polos", "Kos", "Del", "Potato", "Beetroot", "Watakolu", "Hathu",
];
const STARTER_MEAT: &[&str] = &[
    "Chicken Curry",
    "Fish Curry",
    "Ambul Thiyal",
    "Sprats/Small Fried Fish/Karawala/Kunisso",
    "Mackerel",
];
const STARTER_DINNER: &[&str] = &["Bread", "Noodles", "Pasta", "Kottu", "Rotti"];

fn starter(names: &[&str]) -> Vec<MealItem> {
    names.iter().map(|n| MealItem::new(*n)).collect()
}

impl Default for MealLibrary {
    fn default() -> Self {
        Self {
            breakfast_combos: starter(STARTER_BREAKFAST),
            lunch_mains: starter(STARTER_MAINS),
            lunch_veg1: starter(STARTER_VEG1),
            lunch_veg2: starter(STARTER_VEG2),
            lunch_meat: starter(STARTER_MEAT),
            dinner_combos: starter(STARTER_DINNER),
        }
    }
}

impl MealLibrary {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            breakfast_combos: Vec::new(),
            lunch_mains: Vec::new(),
            lunch_veg1: Vec::new(),
            lunch_veg2: Vec::new(),
            lunch_meat: Vec::new(),
            dinner_combos: Vec::new(),
        }
    }

    #[must_use]
    pub fn items(&self, category: Category) -> &[MealItem] {
        match category {
            Category::BreakfastCombos => &self.breakfast_combos,
            Category::LunchMains => &self.lunch_mains,
            Category::LunchVeg1 => &self.lunch_veg1,
            Category::LunchVeg2 => &self.lunch_veg2,
            Category::LunchMeat => &self.lunch_meat,
            Category::DinnerCombos => &self.dinner_combos,
        }
    }

    pub fn items_mut(&mut self, category: Category) -> &mut Vec<MealItem> {
        match category {
            Category::BreakfastCombos => &mut self.breakfast_combos,
            Category::LunchMains => &mut self.lunch_mains,
            Category::LunchVeg1 => &mut self.lunch_veg1,
            Category::LunchVeg2 => &mut self.lunch_veg2,
            Category::LunchMeat => &mut self.lunch_meat,
            Category::DinnerCombos => &mut self.dinner_combos,
        }
    }

    /// Builder used by tests.
    #[must_use]
    pub fn with_item(mut self, category: Category, item: MealItem) -> Self {
        self.items_mut(category).push(item);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LunchPlan {
    pub main: String,
    pub veg1: String,
    pub veg2: String,
    pub meat: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub date_key: String,
    pub breakfast: String,
    pub lunch: LunchPlan,
    pub dinner: String,
}

impl PlanEntry {
    /// The six planned components paired with the category each resolves in.
    #[must_use]
    pub fn components(&self) -> [(Category, &str); 6] {
        [
            (Category::BreakfastCombos, self.breakfast.as_str()),
            (Category::LunchMains, self.lunch.main.as_str()),
            (Category::LunchVeg1, self.lunch.veg1.as_str()),
            (Category::LunchVeg2, self.lunch.veg2.as_str()),
            (Category::LunchMeat, self.lunch.meat.as_str()),
            (Category::DinnerCombos, self.dinner.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub id: String,
    pub name: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_cost: Option<f64>,
}

/// The active list. Regenerating replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShoppingList {
    #[serde(default)]
    pub period_label: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub items: Vec<ShoppingItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedShoppingList {
    pub id: String,
    pub name: String,
    pub created_at: String,
    #[serde(default)]
    pub period_label: String,
    pub items: Vec<ShoppingItem>,
}

/// A consolidated line returned directly by the plan estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatedItem {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// Validate a meal name before it enters the library.
pub fn validate_meal_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Meal name must not be empty");
    }
    Ok(trimmed.to_string())
}

/// Validate a user-entered ingredient: name must not be empty, amount must be
/// finite and non-negative.
pub fn validate_ingredient(ingredient: &MealIngredient) -> Result<()> {
    if ingredient.name.trim().is_empty() {
        bail!("Ingredient name must not be empty");
    }
    validate_amount(ingredient.amount)
}

pub fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        bail!("Ingredient amount must be a non-negative number (got {amount})");
    }
    Ok(())
}
