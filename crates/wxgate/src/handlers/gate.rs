use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::response::ApiError;
use crate::server::AppState;

/// Reject requests once the serve context has stopped.
pub async fn require_active(State(state): State<AppState>, request: Request, next: Next) -> Response {
    match state.session.context().cause() {
        Some(cause) => ApiError::Stopped(cause).into_response(),
        None => next.run(request).await,
    }
}

/// Reject requests while the remote account is not logged in.
pub async fn require_login(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.session.is_logged_in() {
        return ApiError::not_login().into_response();
    }
    next.run(request).await
}
