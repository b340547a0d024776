use anyhow::{Result, bail};
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

use pantry_core::library::IngredientUpdate;
use pantry_core::models::{Category, MealIngredient, MealItem, Provenance};
use pantry_core::service::PlannerService;
use pantry_core::sync::SyncOutcome;

use super::helpers::{format_quantity, print_meal_table, resolve_ingredient, resolve_meal};
use super::require_gemini;
use crate::gemini::GeminiClient;

pub(crate) fn cmd_meals_list(
    svc: &PlannerService,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    let categories: Vec<Category> = match category {
        Some(c) => vec![c.parse()?],
        None => Category::ALL.to_vec(),
    };

    if json {
        let library = svc.library()?;
        if let [only] = categories.as_slice() {
            println!("{}", serde_json::to_string_pretty(library.items(*only))?);
        } else {
            println!("{}", serde_json::to_string_pretty(&library)?);
        }
        return Ok(());
    }

    let library = svc.library()?;
    for (i, c) in categories.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_meal_table(*c, library.items(*c));
    }
    Ok(())
}

fn print_ingredients(item: &MealItem) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Source")]
        source: &'static str,
    }

    println!("{}", item.name);
    if item.ingredients.is_empty() {
        println!("  No ingredients yet. Add some or run `pantry meals sync`.");
        return;
    }
    let rows: Vec<IngredientRow> = item
        .ingredients
        .iter()
        .enumerate()
        .map(|(i, ing)| IngredientRow {
            idx: i + 1,
            name: ing.name.clone(),
            amount: format_quantity(ing.amount, &ing.unit),
            source: match ing.provenance {
                Provenance::Manual => "manual",
                Provenance::Ai => "suggested",
            },
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_meals_show(
    svc: &PlannerService,
    category: &str,
    meal: &str,
    json: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let index = resolve_meal(&svc.library()?, category, meal)?;
    let item = svc.meal_item(category, index)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        print_ingredients(&item);
    }
    Ok(())
}

pub(crate) fn cmd_meals_add(
    svc: &PlannerService,
    category: &str,
    name: &str,
    json: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let item = svc.add_meal(category, name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("Added '{}' to {category}", item.name);
    }
    Ok(())
}

pub(crate) fn cmd_meals_rename(
    svc: &PlannerService,
    category: &str,
    meal: &str,
    new_name: &str,
    json: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let index = resolve_meal(&svc.library()?, category, meal)?;
    let old = svc.meal_name_at(category, index)?;
    let item = svc.rename_meal(category, index, new_name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("Renamed '{old}' to '{}'", item.name);
    }
    Ok(())
}

pub(crate) fn cmd_meals_remove(
    svc: &PlannerService,
    category: &str,
    meal: &str,
    json: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let index = resolve_meal(&svc.library()?, category, meal)?;
    let removed = svc.remove_meal(category, index)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&removed)?);
    } else {
        println!("Removed '{}' from {category}", removed.name);
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_add(
    svc: &PlannerService,
    category: &str,
    meal: &str,
    name: &str,
    amount: f64,
    unit: &str,
    json: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let index = resolve_meal(&svc.library()?, category, meal)?;
    let item = svc.add_ingredient(category, index, MealIngredient::manual(name, amount, unit))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!(
            "Added {} {} to '{}'",
            format_quantity(amount, unit.trim()),
            name.trim(),
            item.name
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_ingredient_set(
    svc: &PlannerService,
    category: &str,
    meal: &str,
    position: usize,
    name: Option<String>,
    amount: Option<f64>,
    unit: Option<String>,
    json: bool,
) -> Result<()> {
    let update = IngredientUpdate { name, amount, unit };
    if update.is_empty() {
        bail!("Nothing to update. Pass at least one of --name, --amount, --unit");
    }

    let category: Category = category.parse()?;
    let index = resolve_meal(&svc.library()?, category, meal)?;
    let ingredient_index = resolve_ingredient(&svc.meal_item(category, index)?, position)?;
    let item = svc.update_ingredient(category, index, ingredient_index, &update)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let ing = &item.ingredients[ingredient_index];
        println!(
            "Updated '{}': {} {}",
            item.name,
            format_quantity(ing.amount, &ing.unit),
            ing.name
        );
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_remove(
    svc: &PlannerService,
    category: &str,
    meal: &str,
    position: usize,
    json: bool,
) -> Result<()> {
    let category: Category = category.parse()?;
    let index = resolve_meal(&svc.library()?, category, meal)?;
    let ingredient_index = resolve_ingredient(&svc.meal_item(category, index)?, position)?;
    let removed = svc.remove_ingredient(category, index, ingredient_index)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&removed)?);
    } else {
        println!("Removed {}", removed.name);
    }
    Ok(())
}

pub(crate) fn cmd_meals_sync(
    svc: &PlannerService,
    gemini: Option<&GeminiClient>,
    category: &str,
    meal: &str,
    json: bool,
) -> Result<()> {
    let gemini = require_gemini(gemini)?;
    let category: Category = category.parse()?;
    let index = resolve_meal(&svc.library()?, category, meal)?;
    let outcome = tokio::task::block_in_place(|| svc.sync_meal(gemini, category, index))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }
    match outcome {
        SyncOutcome::Applied { .. } => print_ingredients(&svc.meal_item(category, index)?),
        SyncOutcome::Stale => println!("The meal changed while syncing; nothing was applied."),
        SyncOutcome::Empty => println!("No suggestions returned; ingredients left unchanged."),
    }
    Ok(())
}

pub(crate) fn cmd_meals_sync_all(
    svc: &PlannerService,
    gemini: Option<&GeminiClient>,
    json: bool,
) -> Result<()> {
    #[derive(Serialize)]
    struct Missing<'a> {
        category: &'a str,
        name: &'a str,
    }
    #[derive(Serialize)]
    struct SyncAllOutput<'a> {
        updated: usize,
        missing: Vec<Missing<'a>>,
    }

    let gemini = require_gemini(gemini)?;
    let report = tokio::task::block_in_place(|| svc.sync_library(gemini))?;

    if json {
        let out = SyncAllOutput {
            updated: report.updated,
            missing: report
                .missing
                .iter()
                .map(|(c, name)| Missing {
                    category: c.key(),
                    name,
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Updated {} meals", report.updated);
    if !report.missing.is_empty() {
        println!("No suggestions for:");
        for (category, name) in &report.missing {
            println!("  {category}: {name}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_through_commands() {
        let svc = PlannerService::new_in_memory().unwrap();
        cmd_meals_add(&svc, "lunch-main", "Coconut Rice", true).unwrap();
        assert!(svc.library().unwrap().find(Category::LunchMains, "Coconut Rice").is_some());

        cmd_meals_remove(&svc, "lunch-main", "Coconut Rice", true).unwrap();
        assert!(svc.library().unwrap().find(Category::LunchMains, "Coconut Rice").is_none());
    }

    #[test]
    fn test_ingredient_commands_mark_manual() {
        let svc = PlannerService::new_in_memory().unwrap();
        cmd_meals_add(&svc, "dinner", "Hoppers", true).unwrap();
        cmd_ingredient_add(&svc, "dinner", "Hoppers", "Rice flour", 500.0, "g", true).unwrap();
        cmd_ingredient_set(
            &svc,
            "dinner",
            "Hoppers",
            1,
            None,
            Some(750.0),
            None,
            true,
        )
        .unwrap();

        let lib = svc.library().unwrap();
        let item = lib.find(Category::DinnerCombos, "Hoppers").unwrap();
        assert_eq!(item.ingredients.len(), 1);
        assert!((item.ingredients[0].amount - 750.0).abs() < f64::EPSILON);
        assert!(item.ingredients[0].is_manual());

        cmd_ingredient_remove(&svc, "dinner", "Hoppers", 1, true).unwrap();
        let lib = svc.library().unwrap();
        assert!(lib.find(Category::DinnerCombos, "Hoppers").unwrap().ingredients.is_empty());
    }

    #[test]
    fn test_empty_ingredient_update_rejected() {
        let svc = PlannerService::new_in_memory().unwrap();
        cmd_meals_add(&svc, "dinner", "Hoppers", true).unwrap();
        let err = cmd_ingredient_set(&svc, "dinner", "Hoppers", 1, None, None, None, true)
            .unwrap_err();
        assert!(err.to_string().contains("Nothing to update"));
    }

    #[test]
    fn test_sync_without_gemini_errors() {
        let svc = PlannerService::new_in_memory().unwrap();
        let err = cmd_meals_sync_all(&svc, None, true).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
