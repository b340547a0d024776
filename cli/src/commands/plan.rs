use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use pantry_core::models::PlanEntry;
use pantry_core::plan::PlanField;
use pantry_core::service::PlannerService;

use super::helpers::{parse_date_key, truncate};

fn print_plan_table(entries: &[PlanEntry]) {
    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "Day")]
        day: String,
        #[tabled(rename = "Breakfast")]
        breakfast: String,
        #[tabled(rename = "Lunch")]
        lunch: String,
        #[tabled(rename = "Dinner")]
        dinner: String,
    }

    let rows: Vec<PlanRow> = entries
        .iter()
        .map(|e| PlanRow {
            day: e.date_key.clone(),
            breakfast: truncate(&e.breakfast, 30),
            lunch: [&e.lunch.main, &e.lunch.veg1, &e.lunch.veg2, &e.lunch.meat]
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            dinner: truncate(&e.dinner, 20),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_plan_show(
    svc: &PlannerService,
    from: Option<&str>,
    to: Option<&str>,
    json: bool,
) -> Result<()> {
    let entries: Vec<PlanEntry> = match (from, to) {
        (None, None) => svc.plan()?.iter().cloned().collect(),
        (Some(f), None) => {
            let key = parse_date_key(f)?;
            svc.plan_range(&key, &key)?
        }
        (Some(f), Some(t)) => svc.plan_range(&parse_date_key(f)?, &parse_date_key(t)?)?,
        (None, Some(_)) => bail!("--to requires --from"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("Nothing planned.");
        return Ok(());
    }
    print_plan_table(&entries);
    Ok(())
}

pub(crate) fn cmd_plan_set(
    svc: &PlannerService,
    date: &str,
    field: &str,
    value: &str,
    json: bool,
) -> Result<()> {
    let key = parse_date_key(date)?;
    let field: PlanField = field.parse()?;
    let entry = svc.set_plan_field(&key, field, value)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("{}: {} set to '{}'", entry.date_key, field.key(), entry.field(field));
        if !value.trim().is_empty()
            && svc.library()?.find(field.category(), value.trim()).is_none()
        {
            eprintln!(
                "Warning: '{}' is not in {}; it will be skipped by library lists.",
                value.trim(),
                field.category()
            );
        }
    }
    Ok(())
}

pub(crate) fn cmd_plan_clear(svc: &PlannerService, date: &str, json: bool) -> Result<()> {
    let key = parse_date_key(date)?;
    let removed = svc.clear_plan_day(&key)?;

    if json {
        println!("{}", serde_json::json!({ "date_key": key, "removed": removed }));
    } else if removed {
        println!("Cleared {key}");
    } else {
        println!("Nothing planned for {key}");
    }
    Ok(())
}
