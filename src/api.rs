use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::{ApiError, ModelError},
    types::{AnalysisRequest, AnalyzeResponse, HealthResponse},
    AppState,
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Validates the payload, loads the model if needed and scores the text.
/// The body is taken raw so malformed JSON maps to our own 400 message.
pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let AnalysisRequest { text, url } = AnalysisRequest::from_json(content_type, &body)?;

    tracing::info!(%url, chars = text.chars().count(), "analyzing text");
    tracing::debug!(%text, "analysis input");

    state.host.ensure_ready().await?;

    let worker = Arc::clone(&state);
    let (text, result) = tokio::task::spawn_blocking(move || {
        let result = worker.host.infer(&text);
        (text, result)
    })
    .await
    .map_err(|e| ModelError::Inference(e.into()))?;
    let result = result?;

    tracing::info!(%url, %result, "analysis complete");

    Ok(Json(AnalyzeResponse { text, url, result }))
}

/// Never triggers a load.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.host.status(),
    })
}
