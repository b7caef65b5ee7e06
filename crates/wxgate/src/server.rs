use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;
use wxgate_protocol::paths;

use crate::buffer::MessageBuffer;
use crate::fanout::FanOut;
use crate::handlers;
use crate::remote::RemoteEndpoint;
use crate::session::SessionController;
use crate::upload::FileMerger;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub remote: Arc<dyn RemoteEndpoint>,
    pub session: SessionController,
    pub buffer: Arc<dyn MessageBuffer>,
    pub merger: Arc<FileMerger>,
    pub fanout: FanOut,
    /// Server-side wait of one `sync-message` long-poll.
    pub sync_wait: Duration,
    /// Largest raw chunk accepted by `upload`.
    pub max_chunk_bytes: usize,
    /// Body limit of every other route, sized for base64 JSON sends.
    pub max_body_bytes: usize,
}

/// Room for the text fields and part headers around an upload chunk.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Body limit of the upload route: one raw chunk plus multipart framing.
pub fn upload_limit(max_chunk_bytes: usize) -> usize {
    max_chunk_bytes.saturating_add(MULTIPART_OVERHEAD)
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let body_limit = state.max_body_bytes;
    let upload_limit = upload_limit(state.max_chunk_bytes);

    let logged_in = Router::new()
        .route(paths::USER_INFO, get(handlers::account::user_info))
        .route(paths::CONTACT_LIST, get(handlers::account::contact_list))
        .route(paths::SYNC_MESSAGE, get(handlers::messages::sync_message))
        .route(paths::SEND_TEXT, post(handlers::messages::send_text))
        .route(paths::SEND_IMAGE, post(handlers::messages::send_image))
        .route(paths::SEND_FILE, post(handlers::messages::send_file))
        .route(paths::FORWARD_MSG, post(handlers::messages::forward_msg))
        .route(
            paths::UPLOAD,
            post(handlers::upload::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            paths::CHAT_ROOM_DETAIL,
            post(handlers::chat_room::chat_room_detail),
        )
        .route(
            paths::MEMBER_FROM_CHAT_ROOM,
            post(handlers::chat_room::member_from_chat_room),
        )
        .route(paths::SEND_AT_TEXT, post(handlers::chat_room::send_at_text))
        .route(
            paths::ADD_MEMBER_INTO_CHAT_ROOM,
            post(handlers::chat_room::add_member_into_chat_room),
        )
        .route(
            paths::INVITE_MEMBER_INTO_CHAT_ROOM,
            post(handlers::chat_room::invite_member_into_chat_room),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_login,
        ));

    let gated = Router::new()
        .route(paths::CHECK_LOGIN, get(handlers::account::check_login))
        .merge(logged_in)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            handlers::require_active,
        ));

    Router::new()
        .route(paths::PING, get(handlers::ping))
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route(paths::STATUS, get(handlers::status))
        .merge(gated)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}
