use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::models::{EstimatedItem, MealIngredient, PlanEntry, Provenance};

/// Ingredient suggestion backend.
///
/// The CLI implements this over HTTP with reqwest; tests use in-process mocks.
/// Calls are blocking. Async callers should resolve suggestions outside any
/// lock and hand the result to the `apply_*` methods on `PlannerService`.
pub trait SuggestionProvider: Send + Sync {
    /// Ingredients for one meal, scaled for the reference household.
    fn suggest_one(&self, meal_name: &str) -> Result<Vec<MealIngredient>>;

    /// Ingredients for many meals at once. A name missing from the map means
    /// "no suggestion" for that meal, not an error.
    fn suggest_batch(&self, meal_names: &[String]) -> Result<HashMap<String, Vec<MealIngredient>>>;

    /// A consolidated shopping estimate for a whole plan, bypassing the library.
    fn estimate_for_plan(&self, entries: &[PlanEntry]) -> Result<Vec<EstimatedItem>>;
}

const HOUSEHOLD: &str = "a Sri Lankan household of 3 adults and 2 children \
(children eat roughly half an adult portion)";

#[must_use]
pub fn suggest_one_prompt(meal_name: &str) -> String {
    format!(
        "List the raw ingredients needed to cook \"{meal_name}\" once for {HOUSEHOLD}. \
         Use grams for solids, ml for liquids, and units for countable items. \
         Output a JSON array of objects with name, amount and unit."
    )
}

#[must_use]
pub fn suggest_batch_prompt(meal_names: &[String]) -> String {
    let mut prompt = format!(
        "For each meal below, list the raw ingredients needed to cook it once for {HOUSEHOLD}. \
         Use grams for solids, ml for liquids, and units for countable items.\n\nMeals:\n"
    );
    for name in meal_names {
        let _ = writeln!(prompt, "- {name}");
    }
    prompt.push_str(
        "\nOutput a JSON array with one object per meal: \
         {\"meal\": <meal name exactly as given>, \"ingredients\": [{name, amount, unit}]}.",
    );
    prompt
}

#[must_use]
pub fn estimate_prompt(entries: &[PlanEntry]) -> String {
    let mut prompt = format!(
        "Based on the following meal plan for {HOUSEHOLD}, calculate the total ingredients \
         and quantities (in g, ml or units) needed for the whole period. Give realistic bulk \
         quantities for dry goods such as rice and lentils and precise amounts for perishables.\n\n\
         Meal plan:\n"
    );
    for e in entries {
        let _ = writeln!(
            prompt,
            "Day: {}\n  Breakfast: {}\n  Lunch: {}, {}, {}, {}\n  Dinner: {} (served with {} from lunch)",
            e.date_key,
            e.breakfast,
            e.lunch.main,
            e.lunch.veg1,
            e.lunch.veg2,
            e.lunch.meat,
            e.dinner,
            e.lunch.meat,
        );
    }
    prompt.push_str("\nOutput a JSON array of objects with name, quantity and unit.");
    prompt
}

fn ingredient_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "name": { "type": "STRING", "description": "Ingredient name, e.g. Red Rice, Coconut" },
            "amount": { "type": "NUMBER", "description": "Amount for one cooking of the meal" },
            "unit": { "type": "STRING", "description": "g, ml, or units" }
        },
        "required": ["name", "amount", "unit"]
    })
}

#[must_use]
pub fn ingredient_list_schema() -> Value {
    json!({ "type": "ARRAY", "items": ingredient_schema() })
}

#[must_use]
pub fn batch_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "meal": { "type": "STRING" },
                "ingredients": ingredient_list_schema()
            },
            "required": ["meal", "ingredients"]
        }
    })
}

#[must_use]
pub fn estimate_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "name": { "type": "STRING", "description": "Ingredient name" },
                "quantity": { "type": "NUMBER", "description": "Total amount required" },
                "unit": { "type": "STRING", "description": "g, ml, units, kg, or l" }
            },
            "required": ["name", "quantity", "unit"]
        }
    })
}

#[derive(Debug, Deserialize)]
struct RawIngredient {
    name: Option<String>,
    amount: Option<f64>,
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBatchEntry {
    meal: Option<String>,
    #[serde(default)]
    ingredients: Vec<RawIngredient>,
}

#[derive(Debug, Deserialize)]
struct RawEstimate {
    name: Option<String>,
    quantity: Option<f64>,
    unit: Option<String>,
}

fn usable_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}

fn raw_to_ingredient(raw: RawIngredient) -> Option<MealIngredient> {
    let name = raw.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
    let amount = raw.amount.filter(|a| usable_amount(*a))?;
    Some(MealIngredient {
        name,
        amount,
        unit: raw.unit.unwrap_or_default().trim().to_string(),
        provenance: Provenance::Ai,
    })
}

/// Parse a JSON array of `{name, amount, unit}`. Unusable rows are dropped.
pub fn parse_ingredient_list(text: &str) -> Result<Vec<MealIngredient>> {
    let raw: Vec<RawIngredient> =
        serde_json::from_str(text).context("Suggestion response is not an ingredient list")?;
    Ok(raw.into_iter().filter_map(raw_to_ingredient).collect())
}

/// Parse a JSON array of `{meal, ingredients}` into a map keyed by meal name.
/// Meals that end up with no usable ingredients are left out.
pub fn parse_batch_response(text: &str) -> Result<HashMap<String, Vec<MealIngredient>>> {
    let raw: Vec<RawBatchEntry> =
        serde_json::from_str(text).context("Batch suggestion response is malformed")?;
    let mut map = HashMap::new();
    for entry in raw {
        let Some(meal) = entry.meal.map(|m| m.trim().to_string()).filter(|m| !m.is_empty())
        else {
            continue;
        };
        let ingredients: Vec<MealIngredient> = entry
            .ingredients
            .into_iter()
            .filter_map(raw_to_ingredient)
            .collect();
        if !ingredients.is_empty() {
            map.entry(meal).or_insert(ingredients);
        }
    }
    Ok(map)
}

pub fn parse_estimate(text: &str) -> Result<Vec<EstimatedItem>> {
    let raw: Vec<RawEstimate> =
        serde_json::from_str(text).context("Estimate response is not a list")?;
    Ok(raw
        .into_iter()
        .filter_map(|r| {
            let name = r.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
            let quantity = r.quantity.filter(|q| usable_amount(*q))?;
            Some(EstimatedItem {
                name,
                quantity,
                unit: r.unit.unwrap_or_default().trim().to_string(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LunchPlan;

    #[test]
    fn test_parse_ingredient_list_tags_ai_and_drops_bad_rows() {
        let text = r#"[
            {"name": "Red Raw Rice", "amount": 600, "unit": "g"},
            {"name": "  ", "amount": 5, "unit": "g"},
            {"name": "Salt", "amount": -1, "unit": "g"},
            {"name": "Coconut", "amount": 1, "unit": "units"},
            {"amount": 3, "unit": "g"}
        ]"#;
        let list = parse_ingredient_list(text).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Red Raw Rice");
        assert!((list[0].amount - 600.0).abs() < f64::EPSILON);
        assert!(list.iter().all(|i| i.provenance == Provenance::Ai));
    }

    #[test]
    fn test_parse_ingredient_list_rejects_non_array() {
        assert!(parse_ingredient_list(r#"{"name": "Rice"}"#).is_err());
        assert!(parse_ingredient_list("not json").is_err());
    }

    #[test]
    fn test_parse_ingredient_list_empty() {
        assert!(parse_ingredient_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_batch_response() {
        let text = r#"[
            {"meal": "Red Rice", "ingredients": [{"name": "Red Raw Rice", "amount": 600, "unit": "g"}]},
            {"meal": "Kos", "ingredients": []},
            {"meal": "", "ingredients": [{"name": "Salt", "amount": 5, "unit": "g"}]},
            {"meal": "Polos", "ingredients": [{"name": "Young Jackfruit", "amount": 500, "unit": "g"}]}
        ]"#;
        let map = parse_batch_response(text).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["Red Rice"][0].name, "Red Raw Rice");
        assert!(map.contains_key("Polos"));
        assert!(!map.contains_key("Kos"));
    }

    #[test]
    fn test_parse_batch_response_first_duplicate_wins() {
        let text = r#"[
            {"meal": "Dhal", "ingredients": [{"name": "Masoor Dhal", "amount": 250, "unit": "g"}]},
            {"meal": "Dhal", "ingredients": [{"name": "Moong", "amount": 100, "unit": "g"}]}
        ]"#;
        let map = parse_batch_response(text).unwrap();
        assert_eq!(map["Dhal"][0].name, "Masoor Dhal");
    }

    #[test]
    fn test_parse_estimate() {
        let text = r#"[
            {"name": "Red Rice", "quantity": 3.5, "unit": "kg"},
            {"name": "Coconut", "quantity": 6, "unit": "units"},
            {"name": "Oil", "quantity": null, "unit": "ml"}
        ]"#;
        let items = parse_estimate(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].unit, "units");
    }

    #[test]
    fn test_prompts_mention_household() {
        assert!(suggest_one_prompt("Kottu").contains("3 adults and 2 children"));
        let batch = suggest_batch_prompt(&["Kottu".to_string(), "Rotti".to_string()]);
        assert!(batch.contains("- Kottu\n"));
        assert!(batch.contains("- Rotti\n"));
    }

    #[test]
    fn test_estimate_prompt_lists_each_day() {
        let entry = PlanEntry {
            date_key: "2024-06-10".to_string(),
            breakfast: "Manioc + Pol Sambol".to_string(),
            lunch: LunchPlan {
                main: "Red Rice".to_string(),
                veg1: "Beans".to_string(),
                veg2: "Polos".to_string(),
                meat: "Fish Curry".to_string(),
            },
            dinner: "Rotti".to_string(),
        };
        let prompt = estimate_prompt(&[entry]);
        assert!(prompt.contains("Day: 2024-06-10"));
        assert!(prompt.contains("Lunch: Red Rice, Beans, Polos, Fish Curry"));
        assert!(prompt.contains("Dinner: Rotti (served with Fish Curry from lunch)"));
    }

    #[test]
    fn test_schemas_are_arrays() {
        assert_eq!(ingredient_list_schema()["type"], "ARRAY");
        assert_eq!(batch_schema()["items"]["properties"]["ingredients"]["type"], "ARRAY");
        assert_eq!(estimate_schema()["items"]["required"][1], "quantity");
    }
}
