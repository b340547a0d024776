use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use pantry_core::cost::total_cost;
use pantry_core::service::PlannerService;

use super::helpers::{format_cost, truncate};

pub(crate) fn cmd_archive_save(svc: &PlannerService, name: &str, json: bool) -> Result<()> {
    let saved = svc.save_current_list(name)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!(
            "Saved '{}' ({} items) as {}",
            saved.name,
            saved.items.len(),
            saved.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_archive_list(svc: &PlannerService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct SavedRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Period")]
        period: String,
        #[tabled(rename = "Items")]
        items: usize,
        #[tabled(rename = "Spent")]
        spent: String,
    }

    let archive = svc.saved_lists()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&archive)?);
        return Ok(());
    }
    if archive.is_empty() {
        println!("No saved lists.");
        return Ok(());
    }

    let rows: Vec<SavedRow> = archive
        .iter()
        .map(|s| SavedRow {
            id: s.id.clone(),
            name: truncate(&s.name, 30),
            period: s.period_label.clone(),
            items: s.items.len(),
            spent: format_cost(Some(total_cost(&s.items))),
        })
        .collect();
    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_archive_load(svc: &PlannerService, id: &str, json: bool) -> Result<()> {
    let list = svc.load_saved_list(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
    } else {
        println!(
            "Loaded {} items for {} as the current list",
            list.items.len(),
            list.period_label
        );
    }
    Ok(())
}

pub(crate) fn cmd_archive_delete(svc: &PlannerService, id: &str, json: bool) -> Result<()> {
    if !svc.delete_saved_list(id)? {
        bail!("No saved list '{id}'");
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted saved list {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_delete() {
        let svc = PlannerService::new_in_memory().unwrap();
        cmd_archive_save(&svc, "Week 1", true).unwrap();
        let archive = svc.saved_lists().unwrap();
        assert_eq!(archive.len(), 1);
        let id = archive.iter().next().unwrap().id.clone();

        cmd_archive_load(&svc, &id, true).unwrap();
        cmd_archive_delete(&svc, &id, true).unwrap();
        assert!(svc.saved_lists().unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_errors() {
        let svc = PlannerService::new_in_memory().unwrap();
        assert!(cmd_archive_delete(&svc, "nope", true).is_err());
    }

    #[test]
    fn test_blank_name_rejected() {
        let svc = PlannerService::new_in_memory().unwrap();
        assert!(cmd_archive_save(&svc, "  ", true).is_err());
    }
}
