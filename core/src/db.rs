use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::archive::ShoppingArchive;
use crate::error::PlannerError;
use crate::models::{MealLibrary, ShoppingList};
use crate::plan::MealPlan;

pub const KEY_MEAL_PLAN: &str = "meal_plan";
pub const KEY_MEAL_LIBRARY: &str = "meal_library";
pub const KEY_SHOPPING_LIST: &str = "shopping_list";
pub const KEY_SAVED_LISTS: &str = "saved_lists";

/// JSON documents in a single key-value table. Each domain (plan, library,
/// active list, archive) is one row, rewritten whole on every change.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Raw values ---

    pub fn put_value(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM kv_store WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    pub fn delete_value(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(rows > 0)
    }

    // --- Typed documents ---

    /// Read and decode `key`. A missing row or a value that no longer parses
    /// yields `T::default()`; only storage errors are returned.
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let Some(raw) = self.get_value(key)? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = PlannerError::MalformedPersistedState {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!(%err, "falling back to defaults");
                Ok(T::default())
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)
            .with_context(|| format!("Failed to serialize '{key}'"))?;
        self.put_value(key, &json)
    }

    pub fn load_plan(&self) -> Result<MealPlan> {
        self.load_or_default(KEY_MEAL_PLAN)
    }

    pub fn save_plan(&self, plan: &MealPlan) -> Result<()> {
        self.save(KEY_MEAL_PLAN, plan)
    }

    pub fn load_library(&self) -> Result<MealLibrary> {
        self.load_or_default(KEY_MEAL_LIBRARY)
    }

    pub fn save_library(&self, library: &MealLibrary) -> Result<()> {
        self.save(KEY_MEAL_LIBRARY, library)
    }

    pub fn load_shopping_list(&self) -> Result<ShoppingList> {
        self.load_or_default(KEY_SHOPPING_LIST)
    }

    pub fn save_shopping_list(&self, list: &ShoppingList) -> Result<()> {
        self.save(KEY_SHOPPING_LIST, list)
    }

    pub fn load_archive(&self) -> Result<ShoppingArchive> {
        self.load_or_default(KEY_SAVED_LISTS)
    }

    pub fn save_archive(&self, archive: &ShoppingArchive) -> Result<()> {
        self.save(KEY_SAVED_LISTS, archive)
    }
}
