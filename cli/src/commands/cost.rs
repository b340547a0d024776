use anyhow::{Result, bail};

use pantry_core::service::PlannerService;

use super::helpers::{format_cost, resolve_item_id};

pub(crate) fn cmd_cost_set(
    svc: &PlannerService,
    item: &str,
    amount: Option<f64>,
    clear: bool,
    json: bool,
) -> Result<()> {
    let cost = match (amount, clear) {
        (Some(_), true) => bail!("Pass either an amount or --clear, not both"),
        (None, false) => bail!("Pass an amount, or --clear to remove the recorded cost"),
        (Some(a), false) => Some(a),
        (None, true) => None,
    };

    let list = svc.shopping_list()?;
    let id = resolve_item_id(&list.items, item)?;
    let updated = svc.set_actual_cost(&id, cost)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
    } else if let Some(c) = updated.actual_cost {
        println!("{}: {}", updated.name, format_cost(Some(c)));
    } else {
        println!("{}: cost cleared", updated.name);
    }
    Ok(())
}

pub(crate) fn cmd_cost_summary(svc: &PlannerService, json: bool) -> Result<()> {
    let summary = svc.cost_summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Total spent:    {}", format_cost(Some(summary.total)));
        println!("Priced items:   {}", summary.priced_items);
        println!("Unpriced items: {}", summary.unpriced_items);
    }
    Ok(())
}
