//! Pricing, recommendation, retraining and search endpoints.

use crate::rest::{api_error, ApiError, AppState, ErrorResponse};
use appswap_core::types::{
    Item, ItemId, PriceSuggestion, RankedItem, ScoringStatus, TrainingReport, UserId,
};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// POST /ml/price-suggestion/:item_id: Suggest a price for one item.
#[utoipa::path(
    post,
    path = "/ml/price-suggestion/{item_id}",
    tag = "Pricing",
    params(("item_id" = i64, Path, description = "Catalog item id")),
    responses(
        (status = 200, description = "Price suggestion", body = PriceSuggestion),
        (status = 404, description = "Unknown item", body = ErrorResponse),
        (status = 503, description = "Price model not trained", body = ErrorResponse),
    )
)]
pub async fn handle_price_suggestion(
    State(state): State<AppState>,
    Path(item_id): Path<ItemId>,
) -> Result<Json<PriceSuggestion>, ApiError> {
    state
        .facade
        .suggest_price(item_id)
        .await
        .map(Json)
        .map_err(|e| api_error(&e, "price_suggestion"))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecommendationQuery {
    /// Number of items to return; capped server-side.
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RecommendationResponse {
    pub request_id: Uuid,
    pub user_id: UserId,
    pub items: Vec<RankedItem>,
    pub count: usize,
    pub generated_at: DateTime<Utc>,
    #[schema(nullable)]
    pub model_trained_at: Option<DateTime<Utc>>,
}

/// GET /ml/recommendations/:user_id: Personalized recommendations.
#[utoipa::path(
    get,
    path = "/ml/recommendations/{user_id}",
    tag = "Recommendations",
    params(("user_id" = i64, Path, description = "Buyer id"), RecommendationQuery),
    responses(
        (status = 200, description = "Ranked recommendations", body = RecommendationResponse),
        (status = 404, description = "Unknown user", body = ErrorResponse),
        (status = 503, description = "Recommender not trained", body = ErrorResponse),
    )
)]
pub async fn handle_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    Query(query): Query<RecommendationQuery>,
) -> Result<Json<RecommendationResponse>, ApiError> {
    let top_k = query
        .top_k
        .unwrap_or(state.facade.config().default_top_k);
    let model_trained_at = state.facade.snapshot().trained_at;
    let items = state
        .facade
        .recommend(user_id, top_k)
        .await
        .map_err(|e| api_error(&e, "recommendations"))?;

    Ok(Json(RecommendationResponse {
        request_id: Uuid::new_v4(),
        user_id,
        count: items.len(),
        items,
        generated_at: Utc::now(),
        model_trained_at,
    }))
}

/// POST /ml/retrain: Refit both models from current data.
#[utoipa::path(
    post,
    path = "/ml/retrain",
    tag = "Training",
    responses(
        (status = 200, description = "Training report", body = TrainingReport),
        (status = 504, description = "Training pass timed out", body = ErrorResponse),
    )
)]
pub async fn handle_retrain(State(state): State<AppState>) -> Result<Json<TrainingReport>, ApiError> {
    info!(node_id = %state.node_id, "Retrain requested");
    state
        .facade
        .train_all()
        .await
        .map(Json)
        .map_err(|e| api_error(&e, "retrain"))
}

/// GET /ml/status: Which models are in service.
#[utoipa::path(
    get,
    path = "/ml/status",
    tag = "Training",
    responses(
        (status = 200, description = "Model status", body = ScoringStatus),
    )
)]
pub async fn handle_status(State(state): State<AppState>) -> Json<ScoringStatus> {
    Json(state.facade.status().await)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<Item>,
    pub count: usize,
}

/// POST /search: Free-text catalog search.
#[utoipa::path(
    post,
    path = "/search",
    tag = "Search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Matching items, best first", body = SearchResponse),
        (status = 400, description = "Empty query", body = ErrorResponse),
    )
)]
pub async fn handle_search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let results = state
        .facade
        .search(&request.query)
        .await
        .map_err(|e| api_error(&e, "search"))?;
    Ok(Json(SearchResponse {
        query: request.query,
        count: results.len(),
        results,
    }))
}
