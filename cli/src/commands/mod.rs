mod archive;
mod cost;
pub(crate) mod helpers;
mod library;
mod plan;
mod shopping;

use anyhow::{Result, anyhow};

use crate::gemini::GeminiClient;

pub(crate) use archive::{cmd_archive_delete, cmd_archive_list, cmd_archive_load, cmd_archive_save};
pub(crate) use cost::{cmd_cost_set, cmd_cost_summary};
pub(crate) use library::{
    cmd_ingredient_add, cmd_ingredient_remove, cmd_ingredient_set, cmd_meals_add, cmd_meals_list,
    cmd_meals_remove, cmd_meals_rename, cmd_meals_show, cmd_meals_sync, cmd_meals_sync_all,
};
pub(crate) use plan::{cmd_plan_clear, cmd_plan_set, cmd_plan_show};
pub(crate) use shopping::{cmd_list_generate, cmd_list_show};

/// Commands that call the suggestion service need a configured client.
pub(super) fn require_gemini(gemini: Option<&GeminiClient>) -> Result<&GeminiClient> {
    gemini.ok_or_else(|| {
        anyhow!("Ingredient suggestions need a Gemini API key. Set GEMINI_API_KEY and try again")
    })
}
