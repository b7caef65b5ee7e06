use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use wxgate_protocol::{Envelope, GatewayStatus};

use crate::server::AppState;

pub async fn ping() -> &'static str {
    "pong"
}

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Ready while serving and logged in.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.session.context().is_active() && state.session.is_logged_in() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Json<Envelope<GatewayStatus>> {
    Json(Envelope::ok(state.session.status()))
}
