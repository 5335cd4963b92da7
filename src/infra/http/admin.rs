use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::{
    error::HttpError,
    pdf::CacheInvalidator,
    repos::DocumentsRepo,
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

#[derive(Clone)]
pub struct AdminState {
    pub documents: Arc<dyn DocumentsRepo>,
    pub invalidator: CacheInvalidator,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_health", get(admin_health))
        .route("/documents/{id}/saved", post(document_saved))
        .route("/documents/{id}/reset-key", post(reset_key))
        .route("/cache", delete(purge_cache))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Deserialize)]
struct SavedEvent {
    #[serde(default)]
    revision: bool,
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.documents.health_check().await)
}

/// Save notification from the content system. Always 204; eviction
/// failures are only logged.
async fn document_saved(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
    event: Option<Json<SavedEvent>>,
) -> Response {
    let revision = event.is_some_and(|Json(event)| event.revision);
    state.invalidator.on_document_saved(id, revision).await;
    StatusCode::NO_CONTENT.into_response()
}

async fn reset_key(State(state): State<AdminState>, Path(id): Path<Uuid>) -> Response {
    match state.invalidator.reset_key(id).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn purge_cache(State(state): State<AdminState>) -> Response {
    match state.invalidator.purge_all().await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}
