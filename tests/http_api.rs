use axum::body::Body;
use axum::http::{Request, StatusCode};
use leaderboard::cache::InMemoryCacheStore;
use leaderboard::leaderboard::{Entry, LeaderboardKeys, RankService, RankStore};
use leaderboard::server::router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> axum::Router {
  let cache = Arc::new(InMemoryCacheStore::new());
  let store = RankStore::new(cache, LeaderboardKeys::default());
  for (symbol, cap) in [("a", 10.0), ("b", 20.0), ("c", 30.0)] {
    store
      .populate(&Entry {
        symbol: symbol.to_string(),
        company: symbol.to_uppercase(),
        country: "US".to_string(),
        rank: 0,
        market_cap: cap,
      })
      .await
      .unwrap();
  }
  let ranks: Arc<dyn RankService> = Arc::new(store);
  router(ranks)
}

async fn body_json(response: axum::response::Response) -> Value {
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
  let response = app()
    .await
    .oneshot(Request::get("/health").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_range_route() {
  let response = app()
    .await
    .oneshot(Request::get("/api/0/1/true").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let body = body_json(response).await;
  assert_eq!(
    body,
    json!([
      {"symbol": "c", "company": "C", "country": "US", "rank": 1, "marketCap": 30.0},
      {"symbol": "b", "company": "B", "country": "US", "rank": 2, "marketCap": 20.0},
    ])
  );
}

#[tokio::test]
async fn test_get_by_key_route() {
  let app = app().await;

  let response = app
    .clone()
    .oneshot(Request::get("/api/company:a").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(body_json(response).await["marketCap"], 10.0);

  let response = app
    .oneshot(Request::get("/api/zzz").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_get_by_keys_route() {
  let response = app()
    .await
    .oneshot(
      Request::post("/api/keys")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"keys": ["company:c", "company:a"]}"#))
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let body = body_json(response).await;
  assert_eq!(body[0]["rank"], 1);
  assert_eq!(body[1]["symbol"], "company:a");
  assert_eq!(body[1]["rank"], 2);
}

#[tokio::test]
async fn test_get_by_keys_unranked_is_not_found() {
  let response = app()
    .await
    .oneshot(
      Request::post("/api/keys")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"keys": ["company:zzz"]}"#))
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
  assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_update_route() {
  let app = app().await;

  let response = app
    .clone()
    .oneshot(
      Request::put("/api/a/score")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"score": 99.5}"#))
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(body_json(response).await, json!({"success": true}));

  let response = app
    .clone()
    .oneshot(Request::get("/api/0/0/true").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(body_json(response).await[0]["symbol"], "a");

  let response = app
    .oneshot(
      Request::put("/api/unknown/score")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"score": 1.0}"#))
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(body_json(response).await, json!({"success": false}));
}

#[tokio::test]
async fn test_range_with_metadata_gap_is_server_error() {
  use leaderboard::cache::CacheBackend;

  let cache = Arc::new(InMemoryCacheStore::new());
  cache.zadd("REDIS_LEADERBOARD", "company:ghost", 1.0).await.unwrap();
  let ranks: Arc<dyn RankService> = Arc::new(RankStore::new(cache, LeaderboardKeys::default()));

  let response = router(ranks)
    .oneshot(Request::get("/api/0/0/true").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
