//! HTTP surface of the gateway.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backends::BackendKey;
use crate::completion::{CompletionError, CompletionService};
use crate::registry::residency::ResidencyStore;
use crate::registry::router::{self, ResolutionKind};

const INFO_MESSAGE: &str = "Inference gateway for locally resident language models.";

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub(crate) struct AppState {
    pub store: Arc<ResidencyStore>,
    pub completions: Arc<CompletionService>,
    pub default_key: Option<BackendKey>,
}

pub(crate) fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api_info))
        .route("/api", get(api_info))
        .route("/health", get(health_check))
        .route("/completion", post(completion))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CompletionParams {
    model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct CompletionResponse {
    answer: String,
    model: BackendKey,
    resolution: ResolutionKind,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for CompletionError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = ErrorResponse {
            detail: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

async fn api_info() -> impl IntoResponse {
    Json(serde_json::json!({ "message": INFO_MESSAGE }))
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn completion(
    State(state): State<AppState>,
    Query(params): Query<CompletionParams>,
    Json(request): Json<PromptRequest>,
) -> Result<Json<CompletionResponse>, CompletionError> {
    let resolution = router::resolve(
        params.model_name.as_deref(),
        state.default_key.as_ref().map(|k| k.as_str()),
        &state.store,
    );

    let key = resolution.handle.key().clone();

    match resolution.kind {
        ResolutionKind::Exact => info!(model = %key, "completion requested"),
        kind => warn!(
            requested = params.model_name.as_deref().unwrap_or("-"),
            model = %key,
            resolution = %kind,
            "completion routed to a fallback backend"
        ),
    }

    let completion = state
        .completions
        .complete(&request.prompt, resolution.handle)
        .await
        .map_err(|err| {
            if !err.is_client_error() {
                error!(model = %key, "{}", err);
            }

            err
        })?;

    info!(model = %key, tokens = completion.generated_tokens, "completion finished");

    Ok(Json(CompletionResponse {
        answer: completion.text,
        model: key,
        resolution: resolution.kind,
    }))
}
