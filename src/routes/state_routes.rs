//! Read-only views of the authentication state.

use std::collections::BTreeSet;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::gate::AuthRequirement;
use crate::models::{AuthState, SourceKind};
use crate::state::AppState;

/// Registers state query routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/state", get(get_state))
        .route("/auth/missing", get(get_missing))
}

#[derive(Deserialize)]
struct MissingQuery {
    #[serde(default)]
    requirement: AuthRequirement,
}

#[derive(Serialize)]
struct MissingResponse {
    requirement: AuthRequirement,
    missing: BTreeSet<SourceKind>,
}

async fn get_state(State(state): State<AppState>) -> Json<AuthState> {
    Json(state.reconciler.get_state().as_ref().clone())
}

async fn get_missing(
    State(state): State<AppState>,
    Query(query): Query<MissingQuery>,
) -> Json<MissingResponse> {
    Json(MissingResponse {
        requirement: query.requirement,
        missing: state.reconciler.get_missing_requirements(query.requirement),
    })
}
