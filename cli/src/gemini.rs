use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use pantry_core::models::{EstimatedItem, MealIngredient, PlanEntry};
use pantry_core::suggest::{
    SuggestionProvider, batch_schema, estimate_prompt, estimate_schema, ingredient_list_schema,
    parse_batch_response, parse_estimate, parse_ingredient_list, suggest_batch_prompt,
    suggest_one_prompt,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    rt: tokio::runtime::Handle,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

fn request_body(prompt: &str, schema: Value) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": schema
        }
    })
}

/// Text of the first candidate, or an empty JSON array when the model
/// returned nothing.
fn response_text(resp: GenerateResponse) -> String {
    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        "[]".to_string()
    } else {
        text
    }
}

impl GeminiClient {
    /// Must be called from inside a tokio runtime.
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("pantry-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(60))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            model,
            rt: tokio::runtime::Handle::current(),
        })
    }

    async fn generate(&self, prompt: &str, schema: Value) -> Result<String> {
        let url = format!("{API_BASE}/{}:generateContent", self.model);
        debug!(model = %self.model, prompt_len = prompt.len(), "calling Gemini");
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(prompt, schema))
            .send()
            .await
            .context("Failed to reach the Gemini API")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("Gemini API returned HTTP {status}");
        }

        let data: GenerateResponse = resp
            .json()
            .await
            .context("Failed to parse Gemini response")?;
        Ok(response_text(data))
    }

    pub async fn suggest_one_async(&self, meal_name: &str) -> Result<Vec<MealIngredient>> {
        let text = self
            .generate(&suggest_one_prompt(meal_name), ingredient_list_schema())
            .await?;
        parse_ingredient_list(&text)
    }

    pub async fn suggest_batch_async(
        &self,
        meal_names: &[String],
    ) -> Result<HashMap<String, Vec<MealIngredient>>> {
        let text = self
            .generate(&suggest_batch_prompt(meal_names), batch_schema())
            .await?;
        parse_batch_response(&text)
    }

    pub async fn estimate_async(&self, entries: &[PlanEntry]) -> Result<Vec<EstimatedItem>> {
        let text = self
            .generate(&estimate_prompt(entries), estimate_schema())
            .await?;
        parse_estimate(&text)
    }
}

/// Blocking bridge for `PlannerService`. From async code, call these inside
/// `tokio::task::block_in_place`.
impl SuggestionProvider for GeminiClient {
    fn suggest_one(&self, meal_name: &str) -> Result<Vec<MealIngredient>> {
        self.rt.block_on(self.suggest_one_async(meal_name))
    }

    fn suggest_batch(&self, meal_names: &[String]) -> Result<HashMap<String, Vec<MealIngredient>>> {
        self.rt.block_on(self.suggest_batch_async(meal_names))
    }

    fn estimate_for_plan(&self, entries: &[PlanEntry]) -> Result<Vec<EstimatedItem>> {
        self.rt.block_on(self.estimate_async(entries))
    }
}
