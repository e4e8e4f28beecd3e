use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post, put},
  Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::error::RankError;
use crate::leaderboard::{Entry, RankService};

/// Shared state of the reader API
#[derive(Clone)]
pub struct AppState {
  pub ranks: Arc<dyn RankService>,
}

#[derive(Debug, Deserialize)]
pub struct KeysRequest {
  pub keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
  pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct UpdateResponse {
  pub success: bool,
}

/// HTTP surface over a [`RankService`]
pub struct HttpServer {
  ranks: Arc<dyn RankService>,
  cors_origins: Vec<String>,
  shutdown_rx: broadcast::Receiver<()>,
}

impl HttpServer {
  pub fn new(
    ranks: Arc<dyn RankService>,
    cors_origins: Vec<String>,
    shutdown_rx: broadcast::Receiver<()>,
  ) -> Self {
    Self {
      ranks,
      cors_origins,
      shutdown_rx,
    }
  }

  pub async fn run(mut self, addr: &str) -> Result<(), anyhow::Error> {
    let app = router(self.ranks.clone()).layer(cors_layer(&self.cors_origins));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Leaderboard API at http://{}", addr);

    axum::serve(listener, app.into_make_service())
      .with_graceful_shutdown(async move {
        let _ = self.shutdown_rx.recv().await;
        tracing::info!("HTTP server shutting down");
      })
      .await?;
    Ok(())
  }
}

/// Routes of the reader API, without CORS
pub fn router(ranks: Arc<dyn RankService>) -> Router {
  Router::new()
    .route("/health", get(health_check))
    .route("/api/keys", post(api_get_by_keys))
    .route("/api/{key}", get(api_get_by_key))
    .route("/api/{key}/score", put(api_update_score))
    // First segment shares its parameter name with the routes above; the
    // range handler extracts by position as (start, end, descending)
    .route("/api/{key}/{end}/{descending}", get(api_range))
    .with_state(AppState { ranks })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
  if origins.is_empty() || origins.iter().any(|o| o == "*") {
    CorsLayer::permissive()
  } else {
    let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
      .allow_origin(origins)
      .allow_methods(Any)
      .allow_headers(Any)
  }
}

async fn health_check() -> &'static str {
  "ok"
}

async fn api_get_by_key(
  State(state): State<AppState>,
  Path(key): Path<String>,
) -> Result<Response, AppError> {
  match state.ranks.get_by_key(&key).await? {
    Some(entry) => Ok(Json(entry).into_response()),
    None => Ok(StatusCode::NO_CONTENT.into_response()),
  }
}

async fn api_range(
  State(state): State<AppState>,
  Path((start, end, descending)): Path<(i64, i64, bool)>,
) -> Result<Json<Vec<Entry>>, AppError> {
  Ok(Json(state.ranks.range(start, end, descending).await?))
}

async fn api_get_by_keys(
  State(state): State<AppState>,
  Json(req): Json<KeysRequest>,
) -> Result<Json<Vec<Entry>>, AppError> {
  Ok(Json(state.ranks.get_by_keys(&req.keys).await?))
}

async fn api_update_score(
  State(state): State<AppState>,
  Path(symbol): Path<String>,
  Json(req): Json<ScoreRequest>,
) -> Json<UpdateResponse> {
  let success = state.ranks.update(&symbol, req.score).await;
  Json(UpdateResponse { success })
}

#[derive(Debug)]
enum AppError {
  Internal(RankError),
  NotFound(String),
  BadRequest(String),
}

impl From<RankError> for AppError {
  fn from(e: RankError) -> Self {
    match e {
      RankError::NotRanked(_) => Self::NotFound(e.to_string()),
      RankError::InvalidKey(_) => Self::BadRequest(e.to_string()),
      other => Self::Internal(other),
    }
  }
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, msg) = match self {
      Self::Internal(e) => {
        tracing::error!(retryable = e.is_retryable(), "Request failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
      Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
      Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
    };
    (status, Json(serde_json::json!({ "error": msg }))).into_response()
  }
}
