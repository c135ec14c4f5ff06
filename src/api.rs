//! HTTP API endpoints.
//!
//! Read-only views used by clients before they open a socket: which bots
//! can be added, and whether a join code points at a live room.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Response structure for available models
#[derive(Debug, Clone, Serialize)]
pub struct AvailableModelsResponse {
    /// Bots that `add_llm_to_room` accepts, sorted by name
    pub bots: Vec<CatalogEntry>,
    /// Providers that were configured at startup
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    /// Short name used in `@name` mentions
    pub name: String,
    /// Model binding in format "provider:model" (e.g., "openai:gpt-4o-mini")
    pub model: String,
    /// Whether the binding's provider is actually configured
    pub available: bool,
}

/// List the model catalog.
///
/// GET /api/models
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<AvailableModelsResponse> {
    let providers = state
        .llm
        .as_ref()
        .map(|llm| llm.provider_names())
        .unwrap_or_default();

    let bots = state
        .catalog
        .entries()
        .map(|(name, model)| CatalogEntry {
            name: name.to_string(),
            model: model.to_string(),
            available: model
                .split_once(':')
                .is_some_and(|(provider, _)| providers.iter().any(|p| p == provider)),
        })
        .collect();

    Json(AvailableModelsResponse { bots, providers })
}

/// Summary of a live room.
///
/// GET /api/rooms/{code}
pub async fn room_summary(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    match state.rooms.summary(&code).await {
        Some(summary) => Json(summary).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "Room not found" })),
        )
            .into_response(),
    }
}
