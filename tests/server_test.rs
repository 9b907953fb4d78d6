mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use courtside::config::RecommendConfig;
use courtside::recommend::Recommender;
use courtside::server::{router, AppState, HealthResponse, IngestResponse};
use courtside::store::medium::MemoryMedium;
use helpers::*;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn test_app() -> Router {
    let store = open_store(Arc::new(KeywordProvider::new(64)), Arc::new(MemoryMedium::new())).await;
    let state = AppState {
        recommender: Recommender::new(Arc::new(store), None, RecommendConfig::default()),
        default_k: 10,
        last_games: 12,
    };
    router(Arc::new(state))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(request).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn row(player_id: i64, player: &str, date: &str, matchup: &str, minutes: f64) -> Value {
    json!({
        "player_id": player_id,
        "player": player,
        "position": "F",
        "game_date": date,
        "matchup": matchup,
        "min": minutes,
        "pts": 20,
        "reb": 7,
        "ast": 4
    })
}

async fn ingest_sample(app: &Router) -> IngestResponse {
    let body = json!({
        "team": "BOS",
        "season": "2024-25",
        "rows": [
            row(1, "Tatum", "APR 10, 2024", "BOS vs. NYK", 38.0),
            row(1, "Tatum", "2024-03-01", "BOS @ MIA", 36.0),
            row(2, "Holiday", "2024-03-01", "BOS @ MIA", 30.0),
        ]
    });
    let (status, value) = call(app, "POST", "/ingest", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn health_reports_loaded_docs() {
    let app = test_app().await;
    let (status, value) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(value).unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.loaded_docs, 0);

    ingest_sample(&app).await;
    let (_, value) = call(&app, "GET", "/health", None).await;
    assert_eq!(value["loaded_docs"], 3);
}

#[tokio::test]
async fn ingest_respects_last() {
    let app = test_app().await;
    let body = json!({
        "team": "BOS",
        "season": "2024-25",
        "last": 1,
        "rows": [
            row(1, "Tatum", "2024-04-10", "BOS vs. NYK", 38.0),
            row(1, "Tatum", "2024-03-01", "BOS @ MIA", 36.0),
        ]
    });
    let (status, value) = call(&app, "POST", "/ingest", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let resp: IngestResponse = serde_json::from_value(value).unwrap();
    assert_eq!(resp.status, "ok");
    assert_eq!((resp.docs_added, resp.total), (1, 1));
}

#[tokio::test]
async fn search_applies_filters() {
    let app = test_app().await;
    ingest_sample(&app).await;

    let body = json!({"query": "Tatum rotation", "k": 5, "filters": {"opponent": "MIA"}});
    let (status, value) = call(&app, "POST", "/search", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    let hits = value.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h["metadata"]["opponent"] == "MIA"));
}

#[tokio::test]
async fn strict_search_with_no_match_is_empty() {
    let app = test_app().await;
    ingest_sample(&app).await;

    let body = json!({"query": "anything", "filters": {"team": "ZZZ"}, "strict": true});
    let (status, value) = call(&app, "POST", "/search", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value, json!([]));
}

#[tokio::test]
async fn zero_k_is_bad_request() {
    let app = test_app().await;
    let (status, value) = call(&app, "POST", "/search", Some(json!({"query": "q", "k": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["code"], 400);
    assert!(value["error"].as_str().unwrap().contains("k must be at least 1"));
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = test_app().await;
    let (status, value) = call(&app, "POST", "/ingest", Some(json!({"team": "BOS"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(value["code"], 400);
}

#[tokio::test]
async fn recommend_on_empty_store_is_not_found() {
    let app = test_app().await;
    let (status, value) = call(&app, "POST", "/recommend", Some(json!({"opponent": "NYK"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(value["code"], 404);
}

#[tokio::test]
async fn recommend_returns_ranked_lineup() {
    let app = test_app().await;
    ingest_sample(&app).await;

    let body = json!({"opponent": "NYK", "team": "BOS", "season": "2024-25", "limit": 2});
    let (status, value) = call(&app, "POST", "/recommend", Some(body)).await;
    assert_eq!(status, StatusCode::OK);

    let lineup = value["suggested_lineup"].as_array().unwrap();
    assert_eq!(lineup.len(), 2);
    assert_eq!(lineup[0]["player"], "Tatum");
    assert_eq!(lineup[0]["opponent_history"], true);
    assert_eq!(lineup[0]["avg_minutes"], 37.0);
    assert_eq!(value["narrative_error"], "narrative generator not configured");
    assert!(value.get("narrative").is_none());
}
