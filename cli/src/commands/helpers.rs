use anyhow::{Context, Result, bail};
use chrono::{Duration, Local};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{Category, MealItem, MealLibrary, ShoppingItem};
use pantry_core::plan::DateKey;

/// Canonical plan key from user input: YYYY-MM-DD, a weekday name, or
/// today/yesterday/tomorrow.
pub(crate) fn parse_date_key(s: &str) -> Result<String> {
    let today = Local::now().date_naive();
    let date = match s.trim().to_lowercase().as_str() {
        "today" => today,
        "yesterday" => today - Duration::days(1),
        "tomorrow" => today + Duration::days(1),
        _ => return Ok(DateKey::parse(s)?.to_string()),
    };
    Ok(DateKey::Date(date).to_string())
}

/// Resolve a meal given as an exact name or a 1-based position. Names win.
pub(crate) fn resolve_meal(library: &MealLibrary, category: Category, meal: &str) -> Result<usize> {
    if let Some(i) = library.position(category, meal.trim()) {
        return Ok(i);
    }
    let items = library.items(category);
    let n = meal
        .trim()
        .parse::<usize>()
        .ok()
        .with_context(|| format!("No meal named '{meal}' in {category}"))?;
    if n == 0 || n > items.len() {
        bail!("{category} has {} items; {n} is out of range", items.len());
    }
    Ok(n - 1)
}

/// Resolve a 1-based ingredient position.
pub(crate) fn resolve_ingredient(item: &MealItem, position: usize) -> Result<usize> {
    if position == 0 || position > item.ingredients.len() {
        bail!(
            "'{}' has {} ingredients; {position} is out of range",
            item.name,
            item.ingredients.len()
        );
    }
    Ok(position - 1)
}

/// Resolve a shopping item given as a 1-based row number or its id.
pub(crate) fn resolve_item_id(items: &[ShoppingItem], item: &str) -> Result<String> {
    if let Ok(n) = item.trim().parse::<usize>() {
        if n == 0 || n > items.len() {
            bail!("The list has {} items; {n} is out of range", items.len());
        }
        return Ok(items[n - 1].id.clone());
    }
    items
        .iter()
        .find(|i| i.id == item.trim())
        .map(|i| i.id.clone())
        .with_context(|| format!("No item '{item}' on the current list"))
}

pub(crate) fn format_quantity(quantity: f64, unit: &str) -> String {
    let q = no_neg_zero(quantity);
    let number = if (q - q.round()).abs() < 1e-9 {
        format!("{q:.0}")
    } else {
        format!("{q:.2}")
    };
    if unit.is_empty() {
        number
    } else {
        format!("{number} {unit}")
    }
}

pub(crate) fn format_cost(cost: Option<f64>) -> String {
    cost.map_or_else(|| "-".to_string(), |c| format!("{:.2}", no_neg_zero(c)))
}

pub(crate) fn print_meal_table(category: Category, items: &[MealItem]) {
    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
        #[tabled(rename = "Manual")]
        manual: usize,
    }

    let rows: Vec<MealRow> = items
        .iter()
        .enumerate()
        .map(|(i, m)| MealRow {
            idx: i + 1,
            name: truncate(&m.name, 45),
            ingredients: m.ingredients.len(),
            manual: m.ingredients.iter().filter(|i| i.is_manual()).count(),
        })
        .collect();

    println!("{category} ({})", category.key());
    if rows.is_empty() {
        println!("  (empty)");
        return;
    }
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_shopping_table(items: &[ShoppingItem]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Item")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Cost")]
        cost: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .enumerate()
        .map(|(i, item)| ItemRow {
            idx: i + 1,
            name: truncate(&item.name, 35),
            quantity: format_quantity(item.quantity, &item.unit),
            cost: format_cost(item.actual_cost),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
