//! Disconnect endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use crate::models::{ClearScope, IdentitySnapshot};
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;

/// Registers disconnect routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/auth/disconnect/{target}", post(disconnect))
}

/// Clears `wallet`, `github` or `all` from the auth state and the persisted
/// record, then brings the local sources in line so a stale adapter value
/// cannot reconnect the cleared half.
///
/// The in-memory state is cleared even when the store cleanup fails; that
/// failure is reported as a 500.
async fn disconnect(
    State(state): State<AppState>,
    Path(scope): Path<ClearScope>,
) -> Result<StatusCode, HTTPError> {
    let result = state.reconciler.disconnect(scope).await;

    if matches!(scope, ClearScope::Wallet | ClearScope::All) {
        state.wallet.publish(IdentitySnapshot::disconnected());
    }
    if matches!(scope, ClearScope::GitHub | ClearScope::All) {
        state.github.refresh().await;
    }

    result?;
    Ok(StatusCode::NO_CONTENT)
}
