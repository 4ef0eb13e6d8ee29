//! WorkLink Insight HTTP API
//!
//! Axum-based HTTP server for the session photo viewer. Stateless: every request
//! makes one round trip to the CMS or the AI provider and reshapes the result.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to a pure
//! inner function. The inner functions take the shared state explicitly and are
//! directly testable with fake providers.
//!
//! Endpoints (all GET, CORS-open):
//! - /get-users      : `{ userNames: [...] }`
//! - /get-photo      : `{ photoUrls: [...] }`, optional `user` filter
//! - /analyze-image  : first completion choice for `photoUrl`
//! - /generate-speech: `audio/mpeg` bytes for `text`
//! - /health, /version

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use insight_core::{
    CmsError, Credentials, GraphQlCmsClient, InsightConfig, InsightError, OpenAiClient,
    ProviderError, SessionEventSource, SpeechProvider, VisionProvider,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::subsystems::{catalog, narration};

pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Shared state for all HTTP handlers. Built once at startup, never mutated.
#[derive(Clone)]
pub struct HttpState {
    pub config: InsightConfig,
    pub events: Arc<dyn SessionEventSource>,
    pub vision: Arc<dyn VisionProvider>,
    pub speech: Arc<dyn SpeechProvider>,
}

impl HttpState {
    /// Wire the real CMS and OpenAI clients from config and credentials.
    pub fn connect(config: InsightConfig, credentials: &Credentials) -> Result<Self, InsightError> {
        let events = GraphQlCmsClient::new(config.cms.clone(), credentials.cms_token.clone())?;
        let openai = Arc::new(OpenAiClient::new(
            config.openai.clone(),
            credentials.openai_api_key.clone(),
        )?);

        Ok(Self {
            config,
            events: Arc::new(events),
            vision: openai.clone(),
            speech: openai,
        })
    }
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/get-users", get(get_users_handler))
        .route("/get-photo", get(get_photo_handler))
        .route("/analyze-image", get(analyze_image_handler))
        .route("/generate-speech", get(generate_speech_handler))
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: HttpState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = state.config.bind_addr();
    let app = build_router(Arc::new(state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("WorkLink Insight API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct PhotoQuery {
    pub user: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeQuery {
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SpeechQuery {
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsersResponse {
    pub user_names: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhotosResponse {
    pub photo_urls: Vec<String>,
}

// ============================================================================
// Errors
// ============================================================================

/// Handler error. Rendered as a plain-text body; upstream detail stays in the logs.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{message}")]
    Upstream {
        message: &'static str,
        kind: &'static str,
        detail: String,
    },
}

impl ApiError {
    fn cms(message: &'static str, err: CmsError) -> Self {
        tracing::error!(error_kind = err.kind(), error = %err, "{}", message);
        ApiError::Upstream {
            message,
            kind: err.kind(),
            detail: err.to_string(),
        }
    }

    fn provider(message: &'static str, err: ProviderError) -> Self {
        tracing::error!(error_kind = err.kind(), error = %err, "{}", message);
        ApiError::Upstream {
            message,
            kind: err.kind(),
            detail: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Treat empty query values the same as absent ones.
fn required(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub async fn get_users_inner(state: &HttpState) -> Result<UsersResponse, ApiError> {
    let user_names = catalog::list_users(state.events.as_ref(), &state.config.cms)
        .await
        .map_err(|e| ApiError::cms("Error fetching user names", e))?;
    Ok(UsersResponse { user_names })
}

pub async fn get_photos_inner(
    state: &HttpState,
    query: PhotoQuery,
) -> Result<PhotosResponse, ApiError> {
    let photo_urls = catalog::list_photos(
        state.events.as_ref(),
        &state.config.cms,
        query.user.as_deref(),
    )
    .await
    .map_err(|e| {
        if e.is_shape_error() {
            ApiError::cms("Unexpected response structure from CMS", e)
        } else {
            ApiError::cms("Error fetching photos", e)
        }
    })?;
    Ok(PhotosResponse { photo_urls })
}

/// Validates `photoUrl` before any provider call.
pub async fn analyze_image_inner(
    state: &HttpState,
    query: AnalyzeQuery,
) -> Result<serde_json::Value, ApiError> {
    let photo_url =
        required(query.photo_url).ok_or(ApiError::BadRequest("Missing photoUrl query parameter"))?;

    narration::analyze_photo(state.vision.as_ref(), &photo_url)
        .await
        .map_err(|e| ApiError::provider("Error processing your OpenAI request", e))
}

/// Validates `text` before any provider call.
pub async fn generate_speech_inner(
    state: &HttpState,
    query: SpeechQuery,
) -> Result<Bytes, ApiError> {
    let text = required(query.text).ok_or(ApiError::BadRequest("Missing text query parameter"))?;

    narration::synthesize_speech(state.speech.as_ref(), &text)
        .await
        .map_err(|e| ApiError::provider("Error generating speech", e))
}

pub fn health_inner() -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    })
}

pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "service": "worklink-insight",
    })
}

// ============================================================================
// Axum handler wrappers (thin, delegating to inner functions)
// ============================================================================

pub async fn get_users_handler(
    State(state): State<Arc<HttpState>>,
) -> Result<Json<UsersResponse>, ApiError> {
    get_users_inner(&state).await.map(Json)
}

pub async fn get_photo_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<PhotoQuery>,
) -> Result<Json<PhotosResponse>, ApiError> {
    get_photos_inner(&state, query).await.map(Json)
}

pub async fn analyze_image_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    analyze_image_inner(&state, query).await.map(Json)
}

pub async fn generate_speech_handler(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<SpeechQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let audio = generate_speech_inner(&state, query).await?;
    Ok(([(header::CONTENT_TYPE, AUDIO_MPEG)], audio))
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner()))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

// ============================================================================
// Unit Tests, calling inner functions directly with fake providers
// ============================================================================
