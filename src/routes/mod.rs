//! HTTP route definitions and handlers.
//!
//! This module organizes all HTTP endpoints into logical groups:
//! auth state queries, access decisions, disconnects, source bridges,
//! health checks and metrics.

mod disconnect_routes;
mod gate_routes;
mod health_routes;
mod metrics;
mod source_routes;
mod state_routes;

use crate::state::AppState;
use axum::Router;

/// Creates the application router with all configured routes.
///
/// Combines all route modules into a single router and attaches
/// the application state for access in handlers.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(state_routes::routes())
        .merge(gate_routes::routes())
        .merge(disconnect_routes::routes())
        .merge(source_routes::routes())
        .merge(health_routes::routes())
        .merge(metrics::routes())
        .with_state(state)
}
