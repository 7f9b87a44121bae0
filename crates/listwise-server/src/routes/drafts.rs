//! Read-only draft review endpoints

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use listwise_core::storage::DraftFilter;
use listwise_core::types::ProductDraft;

use crate::error::AppError;
use crate::types::DraftQuery;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_drafts))
        .route("/:id", get(get_draft))
}

async fn list_drafts(
    State(state): State<AppState>,
    Query(query): Query<DraftQuery>,
) -> Result<Json<Vec<ProductDraft>>, AppError> {
    query.validate().map_err(AppError::BadRequest)?;
    let filter = DraftFilter {
        batch_id: query.batch_id.clone(),
        status: query.status,
    };
    let drafts = state.stores().drafts.list(&query.scope(), &filter)?;
    Ok(Json(drafts))
}

async fn get_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DraftQuery>,
) -> Result<Json<ProductDraft>, AppError> {
    query.validate().map_err(AppError::BadRequest)?;
    state
        .stores()
        .drafts
        .get(&id, &query.scope())?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Draft {} not found", id)))
}
