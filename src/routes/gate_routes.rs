//! Access decision endpoints.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::gate::{decide, AccessDecision, AuthRequirement, GateMode, GateOptions, GuardResponse};
use crate::metrics::MetricsRecorder;
use crate::state::AppState;

/// Registers access decision routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/decide", get(decide_handler))
        .route("/auth/access", get(access_handler))
        .route("/auth/staleness", get(staleness_handler))
}

fn default_target() -> String {
    "/".to_string()
}

#[derive(Deserialize)]
struct DecideQuery {
    #[serde(default)]
    requirement: AuthRequirement,
    #[serde(default)]
    mode: GateMode,
    #[serde(default = "default_target")]
    target: String,
}

#[derive(Deserialize)]
struct AccessQuery {
    path: String,
}

#[derive(Serialize)]
struct StalenessResponse {
    stale: bool,
    max_age_secs: u64,
}

fn record(state: &AppState, requirement: AuthRequirement, decision: &AccessDecision) {
    state
        .metrics
        .record_decision(requirement.as_str(), decision.kind());
}

/// Evaluates an ad-hoc requirement. Always 200; the decision is in the body.
async fn decide_handler(
    State(state): State<AppState>,
    Query(query): Query<DecideQuery>,
) -> Json<AccessDecision> {
    let options = GateOptions {
        mode: query.mode,
        target: query.target,
    };
    let decision = decide(&state.reconciler.get_state(), query.requirement, &options);
    record(&state, query.requirement, &decision);
    Json(decision)
}

/// Route guard for the configured resources. Undeclared paths are public.
///
/// Protected paths also run the lazy staleness check; a stale summary only
/// asks the UI to re-validate and never changes the decision itself.
async fn access_handler(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> GuardResponse {
    let (requirement, options) = match state.config.resource(&query.path) {
        Some(resource) => (
            resource.requirement,
            GateOptions {
                mode: resource.mode,
                target: resource.target.clone(),
            },
        ),
        None => (AuthRequirement::None, GateOptions::redirect(default_target())),
    };

    let revalidate = match requirement {
        AuthRequirement::None => false,
        _ => {
            state
                .reconciler
                .check_staleness(state.config.auth.max_age())
                .await
        }
    };

    let decision = decide(&state.reconciler.get_state(), requirement, &options);
    debug!(
        event_name = "gate.access.decided",
        event_domain = "gate",
        path = query.path.as_str(),
        requirement = requirement.as_str(),
        decision = decision.kind(),
        revalidate,
        "access decision"
    );
    record(&state, requirement, &decision);
    GuardResponse {
        decision,
        revalidate,
    }
}

async fn staleness_handler(State(state): State<AppState>) -> Json<StalenessResponse> {
    let max_age = state.config.auth.max_age();
    let stale = state.reconciler.check_staleness(max_age).await;
    Json(StalenessResponse {
        stale,
        max_age_secs: max_age.as_secs(),
    })
}
