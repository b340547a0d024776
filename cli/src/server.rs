use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::gemini::GeminiClient;
use pantry_core::archive::ShoppingArchive;
use pantry_core::cost::CostSummary;
use pantry_core::error::PlannerError;
use pantry_core::library::IngredientUpdate;
use pantry_core::models::{
    Category, MealIngredient, MealItem, MealLibrary, PlanEntry, SavedShoppingList, ShoppingItem,
    ShoppingList,
};
use pantry_core::plan::PlanField;
use pantry_core::service::{GenerationReport, ListStrategy, PlannerService};
use pantry_core::sync::{BatchReport, InFlight, SyncOutcome, SyncTarget};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<PlannerService>>,
    gemini: Option<Arc<GeminiClient>>,
    /// Same registry the service uses, so CLI-style and HTTP syncs see each other.
    in_flight: InFlight,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, PlannerService> {
        self.svc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gemini(&self) -> Result<Arc<GeminiClient>, ApiError> {
        self.gemini.clone().ok_or_else(|| {
            ApiError::Unavailable(
                "Ingredient suggestions are not configured. Set GEMINI_API_KEY on the server"
                    .to_string(),
            )
        })
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct NameRequest {
    name: String,
}

#[derive(Deserialize)]
struct AddIngredientRequest {
    name: String,
    amount: f64,
    #[serde(default)]
    unit: String,
}

#[derive(Deserialize)]
struct UpdateIngredientRequest {
    name: Option<String>,
    amount: Option<f64>,
    unit: Option<String>,
}

#[derive(Deserialize)]
struct PlanRangeQuery {
    start: Option<String>,
    end: Option<String>,
}

#[derive(Deserialize)]
struct SetPlanFieldRequest {
    field: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct GenerateRequest {
    start: String,
    end: Option<String>,
    #[serde(default)]
    strategy: ListStrategy,
}

#[derive(Deserialize)]
struct SetCostRequest {
    cost: Option<f64>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    BadGateway(String),
    Internal(anyhow::Error),
}

impl ApiError {
    /// Map domain errors to their status; anything else stays unclassified.
    fn classify(err: anyhow::Error) -> Result<Self, anyhow::Error> {
        let mapped = match err.downcast_ref::<PlannerError>() {
            Some(PlannerError::NotFound(msg)) => Some(Self::NotFound(msg.clone())),
            Some(e @ (PlannerError::DuplicateMealName { .. } | PlannerError::SyncInProgress(_))) => {
                Some(Self::Conflict(e.to_string()))
            }
            Some(e @ PlannerError::UnresolvedMealReference { .. }) => {
                Some(Self::BadRequest(e.to_string()))
            }
            Some(e @ PlannerError::SuggestionServiceFailure(_)) => {
                Some(Self::BadGateway(e.user_message()))
            }
            Some(PlannerError::MalformedPersistedState { .. }) | None => None,
        };
        mapped.ok_or(err)
    }

    /// For operations driven by request input: unclassified errors are the
    /// caller's fault.
    fn invalid(err: anyhow::Error) -> Self {
        Self::classify(err).unwrap_or_else(|e| Self::BadRequest(format!("{e:#}")))
    }

    fn suggestion_failure(err: &anyhow::Error) -> Self {
        warn!(error = %format!("{err:#}"), "suggestion service call failed");
        Self::BadGateway(PlannerError::suggestion(err).user_message())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(err) => {
                error!(error = %format!("{err:#}"), "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::classify(err).unwrap_or_else(Self::Internal)
    }
}

fn parse_category(s: &str) -> Result<Category, ApiError> {
    s.parse().map_err(|e| ApiError::BadRequest(format!("{e}")))
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Library handlers ---

async fn get_library(State(state): State<AppState>) -> Result<Json<MealLibrary>, ApiError> {
    Ok(Json(state.svc().library()?))
}

async fn list_meals(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<Vec<MealItem>>, ApiError> {
    let category = parse_category(&category)?;
    Ok(Json(state.svc().meal_items(category)?))
}

async fn create_meal(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Json(req): Json<NameRequest>,
) -> Result<(StatusCode, Json<MealItem>), ApiError> {
    let category = parse_category(&category)?;
    let item = state
        .svc()
        .add_meal(category, &req.name)
        .map_err(ApiError::invalid)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_meal(
    State(state): State<AppState>,
    Path((category, index)): Path<(String, usize)>,
) -> Result<Json<MealItem>, ApiError> {
    let category = parse_category(&category)?;
    Ok(Json(state.svc().meal_item(category, index)?))
}

async fn rename_meal(
    State(state): State<AppState>,
    Path((category, index)): Path<(String, usize)>,
    Json(req): Json<NameRequest>,
) -> Result<Json<MealItem>, ApiError> {
    let category = parse_category(&category)?;
    let item = state
        .svc()
        .rename_meal(category, index, &req.name)
        .map_err(ApiError::invalid)?;
    Ok(Json(item))
}

async fn delete_meal(
    State(state): State<AppState>,
    Path((category, index)): Path<(String, usize)>,
) -> Result<Json<MealItem>, ApiError> {
    let category = parse_category(&category)?;
    Ok(Json(state.svc().remove_meal(category, index)?))
}

async fn add_ingredient(
    State(state): State<AppState>,
    Path((category, index)): Path<(String, usize)>,
    Json(req): Json<AddIngredientRequest>,
) -> Result<(StatusCode, Json<MealItem>), ApiError> {
    let category = parse_category(&category)?;
    let ingredient = MealIngredient::manual(req.name, req.amount, req.unit.trim());
    let item = state
        .svc()
        .add_ingredient(category, index, ingredient)
        .map_err(ApiError::invalid)?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_ingredient(
    State(state): State<AppState>,
    Path((category, index, ingredient)): Path<(String, usize, usize)>,
    Json(req): Json<UpdateIngredientRequest>,
) -> Result<Json<MealItem>, ApiError> {
    let category = parse_category(&category)?;
    let update = IngredientUpdate {
        name: req.name,
        amount: req.amount,
        unit: req.unit,
    };
    let item = state
        .svc()
        .update_ingredient(category, index, ingredient, &update)
        .map_err(ApiError::invalid)?;
    Ok(Json(item))
}

async fn delete_ingredient(
    State(state): State<AppState>,
    Path((category, index, ingredient)): Path<(String, usize, usize)>,
) -> Result<Json<MealIngredient>, ApiError> {
    let category = parse_category(&category)?;
    Ok(Json(
        state.svc().remove_ingredient(category, index, ingredient)?,
    ))
}

// --- Sync handlers ---
//
// The suggestion call is awaited without holding the service lock; results
// are applied afterwards and discarded if the item changed meanwhile.

async fn sync_meal(
    State(state): State<AppState>,
    Path((category, index)): Path<(String, usize)>,
) -> Result<Json<SyncOutcome>, ApiError> {
    let category = parse_category(&category)?;
    let name = state.svc().meal_name_at(category, index)?;
    let _guard = state
        .in_flight
        .try_begin(SyncTarget::Item { category, index })
        .ok_or_else(|| {
            ApiError::from(anyhow::Error::from(PlannerError::SyncInProgress(
                name.clone(),
            )))
        })?;
    let gemini = state.gemini()?;

    let suggested = gemini
        .suggest_one_async(&name)
        .await
        .map_err(|e| ApiError::suggestion_failure(&e))?;

    let outcome = state
        .svc()
        .apply_meal_suggestion(category, index, &name, &suggested)?;
    Ok(Json(outcome))
}

async fn sync_library(State(state): State<AppState>) -> Result<Json<BatchReport>, ApiError> {
    let _guard = state
        .in_flight
        .try_begin(SyncTarget::Library)
        .ok_or_else(|| {
            ApiError::from(anyhow::Error::from(PlannerError::SyncInProgress(
                "the library".to_string(),
            )))
        })?;
    let gemini = state.gemini()?;

    let names = state.svc().library()?.meal_names();
    if names.is_empty() {
        return Ok(Json(BatchReport::default()));
    }
    let batch = gemini
        .suggest_batch_async(&names)
        .await
        .map_err(|e| ApiError::suggestion_failure(&e))?;

    Ok(Json(state.svc().apply_library_suggestions(&batch)?))
}

// --- Plan handlers ---

async fn get_plan(
    State(state): State<AppState>,
    Query(query): Query<PlanRangeQuery>,
) -> Result<Json<Vec<PlanEntry>>, ApiError> {
    let entries = match (query.start, query.end) {
        (None, None) => state.svc().plan()?.iter().cloned().collect(),
        (Some(start), end) => {
            let end = end.unwrap_or_else(|| start.clone());
            state
                .svc()
                .plan_range(&start, &end)
                .map_err(ApiError::invalid)?
        }
        (None, Some(_)) => {
            return Err(ApiError::BadRequest("'end' requires 'start'".to_string()));
        }
    };
    Ok(Json(entries))
}

async fn set_plan_field(
    State(state): State<AppState>,
    Path(date_key): Path<String>,
    Json(req): Json<SetPlanFieldRequest>,
) -> Result<Json<PlanEntry>, ApiError> {
    let field: PlanField = req
        .field
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let entry = state
        .svc()
        .set_plan_field(&date_key, field, &req.value)
        .map_err(ApiError::invalid)?;
    Ok(Json(entry))
}

async fn clear_plan_day(
    State(state): State<AppState>,
    Path(date_key): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = state
        .svc()
        .clear_plan_day(&date_key)
        .map_err(ApiError::invalid)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Nothing planned for '{date_key}'")))
    }
}

// --- Shopping list handlers ---

async fn get_shopping_list(State(state): State<AppState>) -> Result<Json<ShoppingList>, ApiError> {
    Ok(Json(state.svc().shopping_list()?))
}

async fn generate_shopping_list(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerationReport>, ApiError> {
    let end = req.end.unwrap_or_else(|| req.start.clone());
    let start = req.start;

    let report = match req.strategy {
        ListStrategy::Library => state
            .svc()
            .generate_shopping_list(&start, &end, ListStrategy::Library, None)
            .map_err(ApiError::invalid)?,
        ListStrategy::Auto => {
            let ctx = state
                .svc()
                .plan_context(&start, &end)
                .map_err(ApiError::invalid)?;
            let suggestions = match &state.gemini {
                Some(gemini) if !ctx.unresolved_names.is_empty() => {
                    match gemini.suggest_batch_async(&ctx.unresolved_names).await {
                        Ok(batch) => batch,
                        Err(e) => {
                            warn!(
                                meals = ctx.unresolved_names.len(),
                                error = %format!("{e:#}"),
                                "fallback suggestions failed, using library ingredients only"
                            );
                            HashMap::new()
                        }
                    }
                }
                _ => HashMap::new(),
            };
            state
                .svc()
                .generate_with_suggestions(&start, &end, &suggestions)?
        }
        ListStrategy::Estimate => {
            let gemini = state.gemini()?;
            let entries = state
                .svc()
                .plan_range(&start, &end)
                .map_err(ApiError::invalid)?;
            let estimate = if entries.is_empty() {
                Vec::new()
            } else {
                gemini
                    .estimate_async(&entries)
                    .await
                    .map_err(|e| ApiError::suggestion_failure(&e))?
            };
            state.svc().store_estimate(&start, &end, estimate)?
        }
    };
    Ok(Json(report))
}

async fn set_item_cost(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetCostRequest>,
) -> Result<Json<ShoppingItem>, ApiError> {
    let item = state
        .svc()
        .set_actual_cost(&id, req.cost)
        .map_err(ApiError::invalid)?;
    Ok(Json(item))
}

async fn get_costs(State(state): State<AppState>) -> Result<Json<CostSummary>, ApiError> {
    Ok(Json(state.svc().cost_summary()?))
}

// --- Archive handlers ---

async fn list_saved(State(state): State<AppState>) -> Result<Json<ShoppingArchive>, ApiError> {
    Ok(Json(state.svc().saved_lists()?))
}

async fn save_list(
    State(state): State<AppState>,
    Json(req): Json<NameRequest>,
) -> Result<(StatusCode, Json<SavedShoppingList>), ApiError> {
    let saved = state
        .svc()
        .save_current_list(&req.name)
        .map_err(ApiError::invalid)?;
    Ok((StatusCode::CREATED, Json(saved)))
}

async fn load_saved(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShoppingList>, ApiError> {
    Ok(Json(state.svc().load_saved_list(&id)?))
}

async fn delete_saved(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.svc().delete_saved_list(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No saved list '{id}'")))
    }
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/library", get(get_library))
        .route("/api/library/sync", post(sync_library))
        .route(
            "/api/library/{category}",
            get(list_meals).post(create_meal),
        )
        .route(
            "/api/library/{category}/{index}",
            get(get_meal).put(rename_meal).delete(delete_meal),
        )
        .route(
            "/api/library/{category}/{index}/ingredients",
            post(add_ingredient),
        )
        .route(
            "/api/library/{category}/{index}/ingredients/{ingredient}",
            put(update_ingredient).delete(delete_ingredient),
        )
        .route("/api/library/{category}/{index}/sync", post(sync_meal))
        .route("/api/plan", get(get_plan))
        .route(
            "/api/plan/{date_key}",
            put(set_plan_field).delete(clear_plan_day),
        )
        .route("/api/shopping-list", get(get_shopping_list))
        .route("/api/shopping-list/generate", post(generate_shopping_list))
        .route("/api/shopping-list/items/{id}/cost", put(set_item_cost))
        .route("/api/shopping-list/costs", get(get_costs))
        .route("/api/archive", get(list_saved).post(save_list))
        .route("/api/archive/{id}", delete(delete_saved))
        .route("/api/archive/{id}/load", post(load_saved))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    svc: PlannerService,
    gemini: Option<GeminiClient>,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    let in_flight = svc.in_flight().clone();
    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        gemini: gemini.map(Arc::new),
        in_flight,
    };

    if state.gemini.is_none() {
        eprintln!("Warning: GEMINI_API_KEY is not set. Sync and estimate endpoints will return 503.");
    }
    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(%bind, port, "server started");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let svc = PlannerService::new_in_memory().unwrap();
        let in_flight = svc.in_flight().clone();
        AppState {
            svc: Arc::new(Mutex::new(svc)),
            gemini: None,
            in_flight,
        }
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = axum::http::Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn library_lists_starter_catalog() {
        let app = build_router(test_state());
        let (status, json) = send(&app, "GET", "/api/library", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["lunch_mains"][0]["name"], "Yellow Rice");

        let (status, json) = send(&app, "GET", "/api/library/dinner", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.as_array().unwrap().iter().any(|m| m["name"] == "Kottu"));
    }

    #[tokio::test]
    async fn create_rename_delete_meal() {
        let app = build_router(test_state());
        let (status, json) = send(
            &app,
            "POST",
            "/api/library/dinner",
            Some(json!({ "name": "  Hoppers " })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["name"], "Hoppers");

        let (_, list) = send(&app, "GET", "/api/library/dinner", None).await;
        let index = list.as_array().unwrap().len() - 1;

        let (status, json) = send(
            &app,
            "PUT",
            &format!("/api/library/dinner/{index}"),
            Some(json!({ "name": "Egg Hoppers" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "Egg Hoppers");

        let (status, _) = send(&app, "DELETE", &format!("/api/library/dinner/{index}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, "GET", &format!("/api/library/dinner/{index}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn duplicate_meal_returns_409() {
        let app = build_router(test_state());
        let (status, json) = send(
            &app,
            "POST",
            "/api/library/dinner",
            Some(json!({ "name": "Kottu" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().unwrap().contains("Kottu"));
    }

    #[tokio::test]
    async fn blank_meal_name_returns_400() {
        let app = build_router(test_state());
        let (status, _) = send(
            &app,
            "POST",
            "/api/library/dinner",
            Some(json!({ "name": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_category_returns_400() {
        let app = build_router(test_state());
        let (status, json) = send(&app, "GET", "/api/library/snacks", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("Invalid category"));
    }

    #[tokio::test]
    async fn ingredient_edits_are_manual() {
        let app = build_router(test_state());
        let (status, json) = send(
            &app,
            "POST",
            "/api/library/dinner/0/ingredients",
            Some(json!({ "name": "Bread", "amount": 1, "unit": "loaf" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["ingredients"][0]["provenance"], "manual");

        let (status, json) = send(
            &app,
            "PUT",
            "/api/library/dinner/0/ingredients/0",
            Some(json!({ "amount": 2 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ingredients"][0]["amount"], 2.0);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/library/dinner/0/ingredients/0",
            Some(json!({ "amount": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) =
            send(&app, "DELETE", "/api/library/dinner/0/ingredients/0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["name"], "Bread");

        let (status, _) =
            send(&app, "DELETE", "/api/library/dinner/0/ingredients/0", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn plan_and_library_generation() {
        let app = build_router(test_state());
        send(
            &app,
            "POST",
            "/api/library/dinner/0/ingredients",
            Some(json!({ "name": "Bread", "amount": 1, "unit": "loaf" })),
        )
        .await;
        for day in ["2024-03-04", "2024-03-05"] {
            let (status, json) = send(
                &app,
                "PUT",
                &format!("/api/plan/{day}"),
                Some(json!({ "field": "dinner", "value": "Bread" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(json["dinner"], "Bread");
        }

        let (status, json) = send(
            &app,
            "GET",
            "/api/plan?start=2024-03-04&end=2024-03-10",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 2);

        let (status, json) = send(
            &app,
            "POST",
            "/api/shopping-list/generate",
            Some(json!({ "start": "2024-03-04", "end": "2024-03-05", "strategy": "library" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["strategy"], "library");
        assert_eq!(json["list"]["period_label"], "2024-03-04 to 2024-03-05");
        let bread = json["list"]["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|i| i["name"] == "Bread")
            .unwrap();
        assert_eq!(bread["quantity"], 2.0);

        let (status, json) = send(&app, "GET", "/api/shopping-list", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["period_label"], "2024-03-04 to 2024-03-05");
    }

    #[tokio::test]
    async fn plan_range_needs_start() {
        let app = build_router(test_state());
        let (status, _) = send(&app, "GET", "/api/plan?end=2024-03-04", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_plan_field_returns_400() {
        let app = build_router(test_state());
        let (status, _) = send(
            &app,
            "PUT",
            "/api/plan/2024-03-04",
            Some(json!({ "field": "supper", "value": "Bread" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clear_plan_day_404_when_absent() {
        let app = build_router(test_state());
        let (status, _) = send(&app, "DELETE", "/api/plan/Monday", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        send(
            &app,
            "PUT",
            "/api/plan/Monday",
            Some(json!({ "field": "breakfast", "value": "Manioc + Pol Sambol" })),
        )
        .await;
        let (status, _) = send(&app, "DELETE", "/api/plan/monday", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn auto_without_gemini_uses_library_only() {
        let app = build_router(test_state());
        send(
            &app,
            "PUT",
            "/api/plan/2024-03-04",
            Some(json!({ "field": "dinner", "value": "Egg Rotti" })),
        )
        .await;
        let (status, json) = send(
            &app,
            "POST",
            "/api/shopping-list/generate",
            Some(json!({ "start": "2024-03-04", "strategy": "auto" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["strategy"], "auto");
        assert!(json["list"]["items"].as_array().unwrap().is_empty());
        assert!(
            json["unresolved"]
                .as_array()
                .unwrap()
                .iter()
                .any(|u| u["name"] == "Egg Rotti")
        );
    }

    #[tokio::test]
    async fn estimate_without_gemini_returns_503() {
        let app = build_router(test_state());
        let (status, _) = send(
            &app,
            "POST",
            "/api/shopping-list/generate",
            Some(json!({ "start": "2024-03-04", "strategy": "estimate" })),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn sync_without_gemini_returns_503() {
        let app = build_router(test_state());
        let (status, _) = send(&app, "POST", "/api/library/dinner/0/sync", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let (status, _) = send(&app, "POST", "/api/library/sync", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn sync_in_flight_returns_409() {
        let state = test_state();
        let _held = state
            .in_flight
            .try_begin(SyncTarget::Item {
                category: Category::DinnerCombos,
                index: 0,
            })
            .unwrap();
        let app = build_router(state);

        let (status, _) = send(&app, "POST", "/api/library/dinner/0/sync", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        // A different item is not blocked by it.
        let (status, _) = send(&app, "POST", "/api/library/dinner/1/sync", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn sync_missing_item_returns_404() {
        let app = build_router(test_state());
        let (status, _) = send(&app, "POST", "/api/library/dinner/99/sync", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn costs_recorded_and_summed() {
        let state = test_state();
        state
            .svc()
            .replace_shopping_list(&ShoppingList {
                period_label: "Monday".to_string(),
                generated_at: String::new(),
                items: vec![ShoppingItem {
                    id: "rice".to_string(),
                    name: "Rice".to_string(),
                    quantity: 2.0,
                    unit: "kg".to_string(),
                    actual_cost: None,
                }],
            })
            .unwrap();
        let app = build_router(state);

        let (status, json) = send(
            &app,
            "PUT",
            "/api/shopping-list/items/rice/cost",
            Some(json!({ "cost": 540.5 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["actual_cost"], 540.5);

        let (_, json) = send(&app, "GET", "/api/shopping-list/costs", None).await;
        assert_eq!(json["total"], 540.5);
        assert_eq!(json["priced_items"], 1);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/shopping-list/items/rice/cost",
            Some(json!({ "cost": -1 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/shopping-list/items/nope/cost",
            Some(json!({ "cost": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, json) = send(
            &app,
            "PUT",
            "/api/shopping-list/items/rice/cost",
            Some(json!({ "cost": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(json.get("actual_cost").is_none());
    }

    #[tokio::test]
    async fn archive_save_load_delete() {
        let app = build_router(test_state());
        let (status, saved) = send(
            &app,
            "POST",
            "/api/archive",
            Some(json!({ "name": "Week 10" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = saved["id"].as_str().unwrap().to_string();

        let (_, json) = send(&app, "GET", "/api/archive", None).await;
        assert_eq!(json[0]["name"], "Week 10");

        let (status, _) = send(&app, "POST", &format!("/api/archive/{id}/load"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, "DELETE", &format!("/api/archive/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &format!("/api/archive/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "POST", &format!("/api/archive/{id}/load"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn security_headers_present() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                axum::http::Request::get("/api/library")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'"
        );
    }

    #[test]
    fn classify_maps_domain_errors() {
        let err = anyhow::Error::from(PlannerError::SuggestionServiceFailure(
            "upstream said key=secret".to_string(),
        ));
        match ApiError::from(err) {
            ApiError::BadGateway(msg) => assert!(!msg.contains("secret")),
            _ => panic!("expected bad gateway"),
        }

        match ApiError::from(anyhow::anyhow!("disk full")) {
            ApiError::Internal(_) => {}
            _ => panic!("expected internal"),
        }
        match ApiError::invalid(anyhow::anyhow!("bad input")) {
            ApiError::BadRequest(msg) => assert_eq!(msg, "bad input"),
            _ => panic!("expected bad request"),
        }
    }
}
