//! Endpoints the SDK bridges use to push identity changes.
//!
//! Every push is accepted once the source has it; the reconciler applies it
//! from its subscription right after.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::models::IdentitySnapshot;
use crate::state::AppState;
use crate::utils::http_helpers::HTTPError;
use crate::utils::value::metadata_from_json;

/// Registers source bridge routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sources/wallet", post(push_wallet))
        .route("/sources/github/session", post(push_github_session))
        .route(
            "/sources/github/token",
            put(store_github_token).delete(clear_github_token),
        )
}

#[derive(Deserialize)]
struct SnapshotPayload {
    connected: bool,
    #[serde(default)]
    identifier: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

impl From<SnapshotPayload> for IdentitySnapshot {
    fn from(payload: SnapshotPayload) -> Self {
        IdentitySnapshot {
            connected: payload.connected,
            identifier: payload.identifier,
            metadata: payload.metadata.and_then(metadata_from_json),
        }
    }
}

#[derive(Deserialize)]
struct TokenPayload {
    token: String,
}

async fn push_wallet(
    State(state): State<AppState>,
    Json(payload): Json<SnapshotPayload>,
) -> StatusCode {
    state.wallet.publish(payload.into());
    StatusCode::ACCEPTED
}

async fn push_github_session(
    State(state): State<AppState>,
    Json(payload): Json<SnapshotPayload>,
) -> StatusCode {
    state.github.report_session(payload.into()).await;
    StatusCode::ACCEPTED
}

async fn store_github_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenPayload>,
) -> Result<StatusCode, HTTPError> {
    let token = payload.token.trim();
    if token.is_empty() {
        return Err(HTTPError::bad_request("Access token must not be empty"));
    }
    state.github.store_access_token(token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_github_token(State(state): State<AppState>) -> Result<StatusCode, HTTPError> {
    state.github.clear_access_token().await?;
    Ok(StatusCode::NO_CONTENT)
}
