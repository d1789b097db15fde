//! JSON HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/recommend` | Recommendations for a sparse query |
//! | `GET`  | `/health` | Health check (version, whether artifacts loaded) |
//!
//! `POST /recommend` takes the query contract (all keys optional):
//!
//! ```json
//! { "englishTitle": "Naruto", "genres": ["Action"], "episodes": 24, "rating": 80, "type": "TV" }
//! ```
//!
//! and answers `{ "results": [ ... ] }` with up to `retrieval.final_limit`
//! entries.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "missing_artifact", "message": "missing artifact 'manifest.json': ..." } }
//! ```
//!
//! Error codes: `missing_artifact` (500), `feature_shape_mismatch` (500),
//! `empty_catalog` (422), `no_observations` (422), `invalid_query` (400),
//! `internal` (500). A body that is not a valid query (malformed JSON, a
//! wrong field type, a missing JSON content type) is also `invalid_query`.
//!
//! Artifacts are loaded once at startup and shared read-only by every
//! request. If loading fails the server still starts; `/health` reports
//! `ready: false` and `/recommend` answers with the load error.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use anime_recs_core::image::ImageResolver;
use anime_recs_core::models::QueryRecord;
use anime_recs_core::pipeline::Recommender;
use anime_recs_core::RecommendError;

use crate::config::Config;
use crate::images::build_resolver;
use crate::recommend::{load_recommender, RecommendResponse};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    recommender: Arc<Result<Recommender, RecommendError>>,
    images: Arc<dyn ImageResolver>,
}

impl AppState {
    pub fn new(recommender: Result<Recommender, RecommendError>, images: Arc<dyn ImageResolver>) -> Self {
        Self {
            recommender: Arc::new(recommender),
            images,
        }
    }
}

/// Starts the HTTP server on `[server].bind` and runs until the process
/// is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let loader_config = config.clone();
    let recommender = tokio::task::spawn_blocking(move || load_recommender(&loader_config)).await?;
    match &recommender {
        Ok(r) => tracing::info!(rows = r.catalog().len(), "artifacts loaded"),
        Err(e) => tracing::error!(error = %e, "artifacts unavailable; /recommend will fail until retrained and restarted"),
    }
    let images = build_resolver(&config.images)?;

    let app = router(AppState::new(recommender, images));

    println!("Recommendation server listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes with CORS open to all origins.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/recommend", post(handle_recommend))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

/// Error that converts into a JSON HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.into(),
        }
    }
}

impl From<&RecommendError> for AppError {
    fn from(err: &RecommendError) -> Self {
        let (status, code) = match err {
            RecommendError::MissingArtifact { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "missing_artifact")
            }
            RecommendError::FeatureShapeMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "feature_shape_mismatch")
            }
            RecommendError::EmptyCatalog => (StatusCode::UNPROCESSABLE_ENTITY, "empty_catalog"),
            RecommendError::NoObservations { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "no_observations")
            }
            RecommendError::InvalidQuery(_) => (StatusCode::BAD_REQUEST, "invalid_query"),
        };
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_query",
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    ready: bool,
    rows: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let rows = state
        .recommender
        .as_ref()
        .as_ref()
        .map(|r| r.catalog().len())
        .unwrap_or(0);
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        ready: state.recommender.is_ok(),
        rows,
    })
}

// ============ POST /recommend ============

/// Runs the pipeline on the blocking pool; the shared recommender is never
/// mutated, so requests proceed in parallel.
async fn handle_recommend(
    State(state): State<AppState>,
    payload: Result<Json<QueryRecord>, JsonRejection>,
) -> Result<Json<RecommendResponse>, AppError> {
    let Json(query) = payload
        .map_err(AppError::from)
        .inspect_err(|e| tracing::debug!(message = %e.message, "rejected query body"))?;
    let task = tokio::task::spawn_blocking(move || match state.recommender.as_ref() {
        Ok(recommender) => recommender
            .recommend(&query, state.images.as_ref())
            .map_err(|e| AppError::from(&e)),
        Err(e) => Err(AppError::from(e)),
    });

    let results = task
        .await
        .map_err(|e| AppError::internal(format!("recommendation task failed: {}", e)))?
        .inspect_err(|e| tracing::warn!(code = e.code, message = %e.message, "recommend failed"))?;

    Ok(Json(RecommendResponse::new(&results)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anime_recs_core::image::NoImages;
    use anime_recs_core::models::{Catalog, CatalogEntry};
    use anime_recs_core::pipeline::{FitConfig, FittedArtifacts, RetrievalParams};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request},
    };
    use tower::ServiceExt;

    fn anime(id: u64, title: &str, genres: &[&str], episodes: u32, kind: &str) -> CatalogEntry {
        CatalogEntry {
            english_title: Some(title.to_string()),
            genres: Some(genres.iter().map(|g| g.to_string()).collect()),
            episodes: Some(episodes),
            rating: Some(80.0),
            kind: Some(kind.to_string()),
            ..CatalogEntry::bare(id)
        }
    }

    fn ready_state() -> AppState {
        let catalog = Catalog::new(vec![
            anime(1, "Naruto", &["Action", "Adventure"], 220, "TV"),
            anime(2, "Your Name.", &["Drama", "Romance"], 1, "MOVIE"),
            anime(3, "Trigun", &["Action", "Sci-Fi"], 26, "TV"),
        ]);
        let artifacts = FittedArtifacts::fit(&catalog, &FitConfig::default()).unwrap();
        let recommender = Recommender::new(artifacts, catalog, RetrievalParams::default());
        AppState::new(recommender, Arc::new(NoImages))
    }

    fn unready_state() -> AppState {
        AppState::new(
            Err(RecommendError::missing_artifact("manifest.json", "not found")),
            Arc::new(NoImages),
        )
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_recommend(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/recommend")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_health() -> Request<Body> {
        Request::builder().uri("/health").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_loaded_rows() {
        let (status, json) = send(ready_state(), get_health()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["ready"], true);
        assert_eq!(json["rows"], 3);
    }

    #[tokio::test]
    async fn test_health_without_artifacts() {
        let (status, json) = send(unready_state(), get_health()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ready"], false);
        assert_eq!(json["rows"], 0);
    }

    #[tokio::test]
    async fn test_recommend_returns_results() {
        let (status, json) = send(
            ready_state(),
            post_recommend(r#"{"englishTitle": "Naruto", "genres": ["Action"], "episodes": 220.0}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["englishTitle"], "Naruto");
        assert!(results[0]["imageUrl"]
            .as_str()
            .unwrap()
            .starts_with("https://via.placeholder.com/"));
    }

    #[tokio::test]
    async fn test_recommend_without_artifacts() {
        let (status, json) = send(unready_state(), post_recommend("{}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "missing_artifact");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("manifest.json"));
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_contract() {
        for body in [r#"{"episodes": 24.5}"#, r#"{"englishTitle": "#, r#"{"genres": "Action"}"#] {
            let (status, json) = send(ready_state(), post_recommend(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(json["error"]["code"], "invalid_query", "{}", body);
            assert!(!json["error"]["message"].as_str().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_missing_content_type_is_invalid_query() {
        let request = Request::builder()
            .method("POST")
            .uri("/recommend")
            .body(Body::from(r#"{"rating": 80}"#))
            .unwrap();
        let (status, json) = send(ready_state(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_query");
    }

    #[test]
    fn test_error_codes() {
        let cases = [
            (
                RecommendError::missing_artifact("index.bin", "gone"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "missing_artifact",
            ),
            (
                RecommendError::FeatureShapeMismatch {
                    expected: 10,
                    actual: 9,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "feature_shape_mismatch",
            ),
            (
                RecommendError::EmptyCatalog,
                StatusCode::UNPROCESSABLE_ENTITY,
                "empty_catalog",
            ),
            (
                RecommendError::InvalidQuery("rating NaN".to_string()),
                StatusCode::BAD_REQUEST,
                "invalid_query",
            ),
        ];
        for (err, status, code) in cases {
            let app = AppError::from(&err);
            assert_eq!(app.status, status);
            assert_eq!(app.code, code);
            assert_eq!(app.message, err.to_string());
        }
    }

    #[test]
    fn test_error_body_shape() {
        let body = ErrorBody {
            error: ErrorDetail {
                code: "empty_catalog",
                message: "catalog is empty".to_string(),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["error"]["code"], "empty_catalog");
        assert_eq!(json["error"]["message"], "catalog is empty");
    }
}
