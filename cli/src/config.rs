use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    /// From `GEMINI_API_KEY`. Without it only library-based commands work.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "pantry").context("Could not determine home directory")?;

        Self::from_parts(
            proj_dirs.data_dir().to_path_buf(),
            std::env::var("GEMINI_API_KEY").ok(),
            std::env::var("PANTRY_GEMINI_MODEL").ok(),
        )
    }

    pub fn from_parts(
        data_dir: PathBuf,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = data_dir.join("pantry.db");
        let gemini_api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let gemini_model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());

        Ok(Config {
            db_path,
            data_dir,
            gemini_api_key,
            gemini_model,
        })
    }
}
