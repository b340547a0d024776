use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::models::ShoppingItem;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total: f64,
    pub priced_items: usize,
    pub unpriced_items: usize,
}

/// Record what was actually paid for one item. Returns `false` when no item
/// has `id`.
pub fn set_actual_cost(items: &mut [ShoppingItem], id: &str, cost: f64) -> Result<bool> {
    if !cost.is_finite() || cost < 0.0 {
        bail!("Cost must be a non-negative number (got {cost})");
    }
    Ok(match items.iter_mut().find(|i| i.id == id) {
        Some(item) => {
            item.actual_cost = Some(cost);
            true
        }
        None => false,
    })
}

pub fn clear_actual_cost(items: &mut [ShoppingItem], id: &str) -> bool {
    items
        .iter_mut()
        .find(|i| i.id == id)
        .map(|i| i.actual_cost = None)
        .is_some()
}

/// Sum of recorded costs; items without one count as zero.
#[must_use]
pub fn total_cost(items: &[ShoppingItem]) -> f64 {
    items.iter().filter_map(|i| i.actual_cost).sum()
}

#[must_use]
pub fn summarize(items: &[ShoppingItem]) -> CostSummary {
    let priced_items = items.iter().filter(|i| i.actual_cost.is_some()).count();
    CostSummary {
        total: total_cost(items),
        priced_items,
        unpriced_items: items.len() - priced_items,
    }
}
