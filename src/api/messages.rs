use crate::api::AppState;
use crate::api::dto::messages::{MessageResponse, SendMessageRequest};
use crate::domain::MessageId;
use crate::error::{AppError, Result};
use crate::transport::SendContext;
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::time::Duration;

/// Dispatches a message to the requested channels.
///
/// Responds `201` with the persisted message even when some or all
/// channels failed; the per-channel results carry the outcome.
///
/// # Errors
/// Returns `AppError::BadRequest` for a malformed body or an empty channel list.
/// Returns `AppError::Internal` if the message could not be persisted.
pub async fn send_message(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse> {
    let req: SendMessageRequest =
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("Invalid request body: {e}")))?;

    let ctx = SendContext::with_timeout(Duration::from_millis(state.config.dispatch.request_deadline_ms));
    // Dropping the handler (client gone) cancels in-flight sends.
    let _cancel_on_drop = ctx.token().clone().drop_guard();
    spawn_shutdown_watch(&state, &ctx);

    let message = state.dispatch.send_message(&ctx, req.channel_ids, req.variables, req.overrides).await?;
    tracing::Span::current().record("message_id", tracing::field::display(&message.id));

    Ok((StatusCode::CREATED, Json(MessageResponse::from(message))))
}

/// Returns a stored message with its per-channel results.
///
/// # Errors
/// Returns `AppError::NotFound` if no message has this id.
pub async fn get_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let message = state.dispatch.get_message(&MessageId::new(id)).await?;
    Ok(Json(MessageResponse::from(message)))
}

fn spawn_shutdown_watch(state: &AppState, ctx: &SendContext) {
    let mut shutdown_rx = state.shutdown_rx.clone();
    let token = ctx.token().clone();
    tokio::spawn(async move {
        tokio::select! {
            () = token.cancelled() => {}
            res = shutdown_rx.wait_for(|stop| *stop) => {
                if res.is_ok() {
                    tracing::info!("shutdown requested, cancelling in-flight dispatch");
                    token.cancel();
                }
            }
        }
    });
}
