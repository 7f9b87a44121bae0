//! Chat endpoints: one streamed manager turn per request

use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;

use listwise_core::agent::{archive_in_background, StreamFrame};
use listwise_core::{AgentError, ManagerRequest};

use crate::error::AppError;
use crate::types::{ResetRequest, ResetResponse};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(chat))
        .route("/reset", post(reset))
}

/// Map a turn frame to an SSE event named after the frame type.
pub fn frame_event(frame: &StreamFrame) -> Event {
    Event::default()
        .event(frame.event_name())
        .data(frame.payload().to_string())
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ManagerRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    req.validate().map_err(AgentError::InvalidRequest)?;
    tracing::info!(
        merchant_id = %req.context.merchant_id,
        store_id = %req.context.store_id,
        messages = req.history.len(),
        images = req.images.len() + req.image_urls.len(),
        confirmation = req.confirmation.is_some(),
        "Chat turn"
    );

    // The turn keeps running if the client disconnects; its frames are dropped
    let rx = state.orchestrator.stream_turn(req);
    let stream = UnboundedReceiverStream::new(rx).map(|frame| Ok(frame_event(&frame)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Clear the conversation. The old history is archived in the background and
/// the response does not wait for it.
async fn reset(
    State(state): State<AppState>,
    Json(req): Json<ResetRequest>,
) -> Result<(StatusCode, Json<ResetResponse>), AppError> {
    if req.context.merchant_id.trim().is_empty() || req.context.store_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "context.merchantId and context.storeId are required".into(),
        ));
    }
    let archive_id = archive_in_background(
        &state.orchestrator.services().stores.conversations,
        &req.context,
        req.messages,
    );
    Ok((StatusCode::ACCEPTED, Json(ResetResponse { archive_id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use listwise_core::agent::StepUpdate;

    #[test]
    fn test_frame_events_are_named_by_type() {
        // Event has no public accessors; its Debug output carries the fields
        let step = frame_event(&StreamFrame::Step(StepUpdate::planning("Reading")));
        assert!(format!("{:?}", step).contains("step"));
        let done = frame_event(&StreamFrame::Done);
        assert!(format!("{:?}", done).contains("done"));
    }
}
