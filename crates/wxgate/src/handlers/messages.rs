//! Message handlers: long-poll receive and the send operations.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;
use wxgate_protocol::{ForwardMsgRequest, Message, SendFileRequest, SendImageRequest, SendTextRequest};

use crate::response::{ApiError, ApiResult, empty, ok};
use crate::server::AppState;

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("`{field}` is required")));
    }
    Ok(())
}

fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(value.trim())
        .map_err(|e| ApiError::bad_request(format!("`{field}` is not valid base64: {e}")))
}

/// GET /api/sync-message
///
/// Waits up to the configured sync wait for one message. An empty list
/// means nothing arrived in time.
pub async fn sync_message(State(state): State<AppState>) -> ApiResult<Vec<Message>> {
    let msg = state
        .buffer
        .get(state.session.context(), state.sync_wait)
        .await?;
    if let Some(msg) = &msg {
        debug!(msg_id = msg.msg_id, "Delivering message");
    }
    ok(msg.into_iter().collect())
}

/// POST /api/send-text
pub async fn send_text(
    State(state): State<AppState>,
    body: Result<Json<SendTextRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(req) = body?;
    require("to", &req.to)?;
    state
        .session
        .context()
        .run(state.remote.send_text(&req.to, &req.content))
        .await??;
    empty()
}

/// POST /api/send-image
pub async fn send_image(
    State(state): State<AppState>,
    body: Result<Json<SendImageRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(req) = body?;
    require("to", &req.to)?;
    let image = decode_base64("image", &req.image)?;
    state
        .session
        .context()
        .run(state.remote.send_image(&req.to, &image))
        .await??;
    empty()
}

/// POST /api/send-file
pub async fn send_file(
    State(state): State<AppState>,
    body: Result<Json<SendFileRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(req) = body?;
    require("to", &req.to)?;
    let file = decode_base64("file", &req.file)?;
    state
        .session
        .context()
        .run(state.remote.send_file(&req.to, &file))
        .await??;
    empty()
}

/// POST /api/forward-msg
pub async fn forward_msg(
    State(state): State<AppState>,
    body: Result<Json<ForwardMsgRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(req) = body?;
    require("wxid", &req.wxid)?;
    require("msgId", &req.msg_id)?;
    state
        .session
        .context()
        .run(state.remote.forward_message(&req.wxid, &req.msg_id))
        .await??;
    empty()
}
