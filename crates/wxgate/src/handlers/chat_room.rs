//! Group (chat room) handlers.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use tracing::debug;
use wxgate_protocol::{ChatRoomInfo, ChatRoomMembersRequest, ChatRoomRequest, Profile, SendAtTextRequest};

use crate::response::{ApiError, ApiResult, empty, ok};
use crate::server::AppState;

fn require_room(field: &str, chat_room_id: &str) -> Result<(), ApiError> {
    if chat_room_id.trim().is_empty() {
        return Err(ApiError::bad_request(format!("`{field}` is required")));
    }
    Ok(())
}

/// POST /api/chat-room-detail
pub async fn chat_room_detail(
    State(state): State<AppState>,
    body: Result<Json<ChatRoomRequest>, JsonRejection>,
) -> ApiResult<ChatRoomInfo> {
    let Json(req) = body?;
    require_room("chatRoomId", &req.chat_room_id)?;
    let info = state
        .session
        .context()
        .run(state.remote.chat_room_detail(&req.chat_room_id))
        .await??;
    ok(info)
}

/// POST /api/member-from-chat-room
///
/// Resolves every member's profile concurrently. One failed lookup fails the
/// whole request.
pub async fn member_from_chat_room(
    State(state): State<AppState>,
    body: Result<Json<ChatRoomRequest>, JsonRejection>,
) -> ApiResult<Vec<Profile>> {
    let Json(req) = body?;
    require_room("chatRoomId", &req.chat_room_id)?;
    let ctx = state.session.context();

    let member_ids = ctx
        .run(state.remote.chat_room_member_ids(&req.chat_room_id))
        .await??;
    debug!(chat_room = %req.chat_room_id, members = member_ids.len(), "Resolving member profiles");

    let remote = state.remote.clone();
    let profiles = state
        .fanout
        .run(ctx, member_ids, move |wxid: String| {
            let remote = remote.clone();
            async move { remote.contact_profile(&wxid).await }
        })
        .await?;
    ok(profiles)
}

/// POST /api/send-at-text
pub async fn send_at_text(
    State(state): State<AppState>,
    body: Result<Json<SendAtTextRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(req) = body?;
    require_room("groupId", &req.group_id)?;
    state
        .session
        .context()
        .run(state.remote.send_at_text(&req.group_id, &req.at_list, &req.content))
        .await??;
    empty()
}

/// POST /api/add-member-into-chatroom
pub async fn add_member_into_chat_room(
    State(state): State<AppState>,
    body: Result<Json<ChatRoomMembersRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(req) = body?;
    require_room("chatRoomId", &req.chat_room_id)?;
    state
        .session
        .context()
        .run(state.remote.add_chat_room_members(&req.chat_room_id, &req.member_ids))
        .await??;
    empty()
}

/// POST /api/invite-member-into-chatroom
pub async fn invite_member_into_chat_room(
    State(state): State<AppState>,
    body: Result<Json<ChatRoomMembersRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Json(req) = body?;
    require_room("chatRoomId", &req.chat_room_id)?;
    state
        .session
        .context()
        .run(state.remote.invite_chat_room_members(&req.chat_room_id, &req.member_ids))
        .await??;
    empty()
}
