mod commands;
mod config;
mod gemini;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::helpers::json_error;
use crate::commands::{
    cmd_archive_delete, cmd_archive_list, cmd_archive_load, cmd_archive_save, cmd_cost_set,
    cmd_cost_summary, cmd_ingredient_add, cmd_ingredient_remove, cmd_ingredient_set,
    cmd_list_generate, cmd_list_show, cmd_meals_add, cmd_meals_list, cmd_meals_remove,
    cmd_meals_rename, cmd_meals_show, cmd_meals_sync, cmd_meals_sync_all, cmd_plan_clear,
    cmd_plan_set, cmd_plan_show,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use pantry_core::error::PlannerError;
use pantry_core::service::PlannerService;

#[derive(Parser)]
#[command(
    name = "pantry",
    version,
    about = "A household meal planner and grocery list CLI",
    long_about = "Plan breakfast, lunch and dinner from a library of household meals, \
                  then turn the plan into a consolidated shopping list.\n\n\
                  Set GEMINI_API_KEY to let pantry suggest ingredients for meals."
)]
struct Cli {
    /// Output errors as JSON
    #[arg(long, global = true)]
    json_errors: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the meal library
    Meals {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// View and edit the meal plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Generate and view the shopping list
    List {
        #[command(subcommand)]
        command: ListCommands,
    },
    /// Record what items actually cost
    Cost {
        #[command(subcommand)]
        command: CostCommands,
    },
    /// Save, load and delete shopping list snapshots
    Archive {
        #[command(subcommand)]
        command: ArchiveCommands,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// List meals, optionally for one category
    List {
        /// Category: breakfast, lunch-main, lunch-veg1, lunch-veg2, lunch-meat, dinner
        category: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a meal's ingredients
    Show {
        /// Category
        category: String,
        /// Meal name or 1-based position
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a meal to a category
    Add {
        /// Category
        category: String,
        /// Meal name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rename a meal (plans referring to the old name are not updated)
    Rename {
        /// Category
        category: String,
        /// Meal name or 1-based position
        meal: String,
        /// New name
        new_name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a meal from a category
    Remove {
        /// Category
        category: String,
        /// Meal name or 1-based position
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a meal's ingredients
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Fetch suggested ingredients for one meal, keeping manual entries
    Sync {
        /// Category
        category: String,
        /// Meal name or 1-based position
        meal: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fetch suggested ingredients for every meal in one request
    SyncAll {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add a manual ingredient
    Add {
        /// Category
        category: String,
        /// Meal name or 1-based position
        meal: String,
        /// Ingredient name
        name: String,
        /// Amount for a household of five
        amount: f64,
        /// Unit (g, ml, pcs, ...)
        #[arg(default_value = "")]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an ingredient; the edit marks it as manual
    Set {
        /// Category
        category: String,
        /// Meal name or 1-based position
        meal: String,
        /// 1-based ingredient position
        position: usize,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New amount
        #[arg(long)]
        amount: Option<f64>,
        /// New unit
        #[arg(long)]
        unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient
    Remove {
        /// Category
        category: String,
        /// Meal name or 1-based position
        meal: String,
        /// 1-based ingredient position
        position: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Show planned days (all, one day, or an inclusive range)
    Show {
        /// First day (YYYY-MM-DD, weekday, or today/yesterday/tomorrow)
        #[arg(long)]
        from: Option<String>,
        /// Last day
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set one slot of a day's plan
    Set {
        /// Day (YYYY-MM-DD, weekday, or today/yesterday/tomorrow)
        date: String,
        /// Field: breakfast, lunch-main, lunch-veg1, lunch-veg2, lunch-meat, dinner
        field: String,
        /// Meal name (empty to leave the slot blank)
        value: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a day from the plan
    Clear {
        /// Day
        date: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ListCommands {
    /// Build the shopping list for a range of planned days
    Generate {
        /// First day
        #[arg(long, default_value = "today")]
        from: String,
        /// Last day (default: same as --from)
        #[arg(long)]
        to: Option<String>,
        /// Strategy: library, auto, estimate
        #[arg(short, long, default_value = "library")]
        strategy: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current shopping list
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CostCommands {
    /// Record the actual cost of an item
    Set {
        /// Row number or item ID
        item: String,
        /// Amount paid
        amount: Option<f64>,
        /// Remove the recorded cost instead
        #[arg(long)]
        clear: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the total spent on the current list
    Summary {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ArchiveCommands {
    /// Save the current list under a name
    Save {
        /// Name for the snapshot
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved snapshots, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the current list with a saved snapshot
    Load {
        /// Snapshot ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved snapshot
    Delete {
        /// Snapshot ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Service failures get a fixed, user-facing message; the cause is in the logs.
fn error_message(e: &anyhow::Error) -> String {
    match e.downcast_ref::<PlannerError>() {
        Some(err @ PlannerError::SuggestionServiceFailure(_)) => err.user_message(),
        _ => format!("{e:#}"),
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    if let Err(e) = run(cli).await {
        let message = error_message(&e);
        if json_errors {
            eprintln!("{}", json_error(&message));
        } else {
            eprintln!("Error: {message}");
        }
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db_path = config
        .db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    let svc = PlannerService::new(db_path)?;
    let gemini = match &config.gemini_api_key {
        Some(key) => Some(GeminiClient::new(key.clone(), config.gemini_model.clone())?),
        None => None,
    };

    match cli.command {
        Commands::Meals { command } => match command {
            MealCommands::List { category, json } => {
                cmd_meals_list(&svc, category.as_deref(), json)
            }
            MealCommands::Show {
                category,
                meal,
                json,
            } => cmd_meals_show(&svc, &category, &meal, json),
            MealCommands::Add {
                category,
                name,
                json,
            } => cmd_meals_add(&svc, &category, &name, json),
            MealCommands::Rename {
                category,
                meal,
                new_name,
                json,
            } => cmd_meals_rename(&svc, &category, &meal, &new_name, json),
            MealCommands::Remove {
                category,
                meal,
                json,
            } => cmd_meals_remove(&svc, &category, &meal, json),
            MealCommands::Ingredient { command } => match command {
                IngredientCommands::Add {
                    category,
                    meal,
                    name,
                    amount,
                    unit,
                    json,
                } => cmd_ingredient_add(&svc, &category, &meal, &name, amount, &unit, json),
                IngredientCommands::Set {
                    category,
                    meal,
                    position,
                    name,
                    amount,
                    unit,
                    json,
                } => cmd_ingredient_set(
                    &svc, &category, &meal, position, name, amount, unit, json,
                ),
                IngredientCommands::Remove {
                    category,
                    meal,
                    position,
                    json,
                } => cmd_ingredient_remove(&svc, &category, &meal, position, json),
            },
            MealCommands::Sync {
                category,
                meal,
                json,
            } => cmd_meals_sync(&svc, gemini.as_ref(), &category, &meal, json),
            MealCommands::SyncAll { json } => cmd_meals_sync_all(&svc, gemini.as_ref(), json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Show { from, to, json } => {
                cmd_plan_show(&svc, from.as_deref(), to.as_deref(), json)
            }
            PlanCommands::Set {
                date,
                field,
                value,
                json,
            } => cmd_plan_set(&svc, &date, &field, &value, json),
            PlanCommands::Clear { date, json } => cmd_plan_clear(&svc, &date, json),
        },
        Commands::List { command } => match command {
            ListCommands::Generate {
                from,
                to,
                strategy,
                json,
            } => cmd_list_generate(&svc, gemini.as_ref(), &from, to.as_deref(), &strategy, json),
            ListCommands::Show { json } => cmd_list_show(&svc, json),
        },
        Commands::Cost { command } => match command {
            CostCommands::Set {
                item,
                amount,
                clear,
                json,
            } => cmd_cost_set(&svc, &item, amount, clear, json),
            CostCommands::Summary { json } => cmd_cost_summary(&svc, json),
        },
        Commands::Archive { command } => match command {
            ArchiveCommands::Save { name, json } => cmd_archive_save(&svc, &name, json),
            ArchiveCommands::List { json } => cmd_archive_list(&svc, json),
            ArchiveCommands::Load { id, json } => cmd_archive_load(&svc, &id, json),
            ArchiveCommands::Delete { id, json } => cmd_archive_delete(&svc, &id, json),
        },
        Commands::Serve { port, bind } => server::start_server(svc, gemini, port, &bind).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "pantry", "meals", "ingredient", "add", "dinner", "Kottu", "Leeks", "200", "g",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Meals {
                command: MealCommands::Ingredient {
                    command: IngredientCommands::Add { .. }
                }
            }
        ));
    }

    #[test]
    fn test_cli_generate_defaults() {
        let cli = Cli::try_parse_from(["pantry", "list", "generate"]).unwrap();
        match cli.command {
            Commands::List {
                command:
                    ListCommands::Generate {
                        from, to, strategy, ..
                    },
            } => {
                assert_eq!(from, "today");
                assert!(to.is_none());
                assert_eq!(strategy, "library");
            }
            _ => panic!("expected list generate"),
        }
    }

    #[test]
    fn test_error_message_hides_service_detail() {
        let e: anyhow::Error =
            PlannerError::SuggestionServiceFailure("HTTP 500 from upstream".to_string()).into();
        assert_eq!(
            error_message(&e),
            "Sync failed, check your connection and try again"
        );

        let e = anyhow::anyhow!("plain failure");
        assert_eq!(error_message(&e), "plain failure");
    }
}
