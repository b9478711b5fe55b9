//! Shared application state.
//!
//! Everything the HTTP handlers need: configuration, the reconciler and the
//! two identity sources the SDK bridges push into.

use crate::config::ConfigV1;
use crate::metrics::Metrics;
use crate::reconciler::AuthReconciler;
use crate::sources::{GitHubIdentitySource, PushSource};
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// Owner of the canonical authentication state.
    pub reconciler: Arc<AuthReconciler>,
    /// Wallet source, fed by the wallet SDK bridge.
    pub wallet: Arc<PushSource>,
    /// GitHub source, fed by the OAuth bridge.
    pub github: Arc<GitHubIdentitySource>,
    /// Prometheus metrics for observability.
    pub metrics: Metrics,
}
