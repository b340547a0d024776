use anyhow::Result;

use pantry_core::service::{GenerationReport, ListStrategy, PlannerService};
use pantry_core::suggest::SuggestionProvider;

use super::helpers::{format_cost, parse_date_key, print_shopping_table};
use super::require_gemini;
use crate::gemini::GeminiClient;

pub(crate) fn cmd_list_generate(
    svc: &PlannerService,
    gemini: Option<&GeminiClient>,
    from: &str,
    to: Option<&str>,
    strategy: &str,
    json: bool,
) -> Result<()> {
    let start = parse_date_key(from)?;
    let end = match to {
        Some(t) => parse_date_key(t)?,
        None => start.clone(),
    };
    let strategy: ListStrategy = strategy.parse()?;

    let report = match strategy {
        ListStrategy::Auto if gemini.is_some() => {
            let provider = gemini.map(|g| g as &dyn SuggestionProvider);
            tokio::task::block_in_place(|| {
                svc.generate_shopping_list(&start, &end, strategy, provider)
            })?
        }
        // Auto without a key degrades to library ingredients only.
        ListStrategy::Library | ListStrategy::Auto => {
            svc.generate_shopping_list(&start, &end, strategy, None)?
        }
        ListStrategy::Estimate => {
            let gemini = require_gemini(gemini)?;
            tokio::task::block_in_place(|| {
                svc.generate_shopping_list(&start, &end, strategy, Some(gemini))
            })?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &GenerationReport) {
    let list = &report.list;
    println!("Shopping list for {} ({} strategy)", list.period_label, report.strategy);
    if list.items.is_empty() {
        println!("  No ingredients. Plan some meals or add ingredients to the library.");
    } else {
        print_shopping_table(&list.items);
    }

    if !report.estimated.is_empty() {
        println!("Suggested ingredients used for: {}", report.estimated.join(", "));
    }
    if !report.unresolved.is_empty() {
        eprintln!("Skipped meals not in the library:");
        for u in &report.unresolved {
            eprintln!("  {} {}: {}", u.date_key, u.category, u.name);
        }
    }
}

pub(crate) fn cmd_list_show(svc: &PlannerService, json: bool) -> Result<()> {
    let list = svc.shopping_list()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }
    if list.items.is_empty() {
        println!("No shopping list yet. Run `pantry list generate`.");
        return Ok(());
    }
    println!("Shopping list for {}", list.period_label);
    print_shopping_table(&list.items);
    let summary = svc.cost_summary()?;
    if summary.priced_items > 0 {
        println!(
            "Spent {} on {} of {} items",
            format_cost(Some(summary.total)),
            summary.priced_items,
            summary.priced_items + summary.unpriced_items
        );
    }
    Ok(())
}
