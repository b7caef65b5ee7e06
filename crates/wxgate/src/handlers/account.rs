//! Account and contact handlers.

use axum::extract::State;
use wxgate_protocol::{Account, Contact};

use crate::response::{ApiResult, ok};
use crate::server::AppState;

/// GET /api/check-login
pub async fn check_login(State(state): State<AppState>) -> ApiResult<bool> {
    let logged_in = state
        .session
        .context()
        .run(state.remote.check_login())
        .await??;
    ok(logged_in)
}

/// GET /api/userinfo
pub async fn user_info(State(state): State<AppState>) -> ApiResult<Account> {
    let account = state
        .session
        .context()
        .run(state.remote.user_info())
        .await??;
    ok(account)
}

/// GET /api/contact-list
pub async fn contact_list(State(state): State<AppState>) -> ApiResult<Vec<Contact>> {
    let contacts = state
        .session
        .context()
        .run(state.remote.contact_list())
        .await??;
    ok(contacts)
}
