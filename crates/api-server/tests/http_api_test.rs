//! HTTP round trips through the full router with an in-memory repository.

use appswap_api::build_router;
use appswap_api::rest::AppState;
use appswap_core::types::{Item, ItemId, Transaction, UserId};
use appswap_core::{InMemoryRepository, ScoringConfig};
use appswap_scoring::ScoringFacade;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

fn seeded_repo() -> Arc<InMemoryRepository> {
    let repo = InMemoryRepository::default();
    let categories = ["Finance", "Games", "Productivity"];
    for id in 1..=12 {
        repo.insert_item(Item {
            id,
            name: format!("app-{id}"),
            description: format!("A handy {} app", categories[(id % 3) as usize]),
            category: categories[(id % 3) as usize].to_string(),
            price: 3.0 + id as f64,
            owner_id: 500,
        });
    }
    let purchases: [(ItemId, UserId); 14] = [
        (1, 1), (2, 1), (4, 1),
        (1, 2), (2, 2), (3, 2),
        (5, 3), (6, 3), (7, 3),
        (8, 4), (9, 4),
        (10, 5), (11, 5), (12, 5),
    ];
    for (item_id, buyer_id) in purchases {
        repo.insert_transaction(Transaction {
            item_id,
            buyer_id,
            created_at: Utc::now() - Duration::days(item_id),
        });
    }
    Arc::new(repo)
}

fn app() -> Router {
    let facade = ScoringFacade::new(seeded_repo(), ScoringConfig::default());
    build_router(AppState {
        facade: Arc::new(facade),
        node_id: "test-node".to_string(),
        start_time: Instant::now(),
    })
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_probes_reflect_training_state() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_id"], "test-node");

    assert_eq!(send(&app, "GET", "/live", None).await.0, StatusCode::OK);
    assert_eq!(
        send(&app, "GET", "/ready", None).await.0,
        StatusCode::SERVICE_UNAVAILABLE
    );

    let (status, report) = send(&app, "POST", "/ml/retrain", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["price_model"]["status"], "trained");
    assert_eq!(report["recommender"]["status"], "trained");

    assert_eq!(send(&app, "GET", "/ready", None).await.0, StatusCode::OK);
}

#[tokio::test]
async fn test_queries_before_training_are_unavailable() {
    let app = app();
    let (status, body) = send(&app, "POST", "/ml/price-suggestion/1", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_not_trained");

    let (status, _) = send(&app, "GET", "/ml/recommendations/1", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&app, "GET", "/ml/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["price_model_trained"], false);
    assert_eq!(body["origin"], "empty");
}

#[tokio::test]
async fn test_price_suggestion_after_training() {
    let app = app();
    send(&app, "POST", "/ml/retrain", None).await;

    let (status, body) = send(&app, "POST", "/ml/price-suggestion/4", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item_id"], 4);
    assert!(body["suggested_price"].as_f64().unwrap() >= 5.0);
    let confidence = body["confidence"].as_f64().unwrap();
    assert!((0.5..=1.0).contains(&confidence));
    assert!(body["reason"].is_string());

    let (status, body) = send(&app, "POST", "/ml/price-suggestion/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "item_not_found");
}

#[tokio::test]
async fn test_recommendations_envelope_and_top_k() {
    let app = app();
    send(&app, "POST", "/ml/retrain", None).await;

    let (status, body) = send(&app, "GET", "/ml/recommendations/1?top_k=3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 1);
    let items = body["items"].as_array().unwrap();
    assert!(items.len() <= 3);
    assert_eq!(body["count"].as_u64().unwrap() as usize, items.len());
    for item in items {
        assert!(![1, 2, 4].contains(&item["item_id"].as_i64().unwrap()));
    }
    assert!(body["request_id"].is_string());

    let (_, body) = send(&app, "GET", "/ml/recommendations/1", None).await;
    assert!(body["items"].as_array().unwrap().len() <= 6);

    let (status, body) = send(&app, "GET", "/ml/recommendations/777", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "user_not_found");
}

#[tokio::test]
async fn test_search_endpoint() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/search",
        Some(serde_json::json!({ "query": "finance" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert!(body["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|item| item["category"] == "Finance"));

    let (status, body) = send(&app, "POST", "/search", Some(serde_json::json!({ "query": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_query");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/ml/retrain"].is_object());
    assert!(body["paths"]["/ml/recommendations/{user_id}"].is_object());
}
