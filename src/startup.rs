//! Application startup and server initialization.
//!
//! Wires the store, the identity sources and the reconciler together, then
//! serves the HTTP surface until shutdown.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ConfigV1;
use crate::error::StoreError;
use crate::metrics::Metrics;
use crate::models::SourceKind;
use crate::reconciler::AuthReconciler;
use crate::routes;
use crate::sources::{GitHubIdentitySource, IdentitySource, PushSource};
use crate::state::AppState;
use crate::store::create_store;

/// Builds the shared state and starts the reconciler.
///
/// # Errors
///
/// Returns an error if the configured store cannot be created.
pub async fn build_state(config: Arc<ConfigV1>) -> Result<AppState, StoreError> {
    let store = create_store(&config.store).await?;
    if !store.is_enabled() {
        warn!("Store is disabled; authentication progress will not survive a restart");
    }

    let metrics = Metrics::new();
    let wallet = Arc::new(PushSource::new("wallet-bridge", SourceKind::Wallet));
    let github = Arc::new(GitHubIdentitySource::new(
        "github-oauth",
        store.clone(),
        &config.github,
    ));

    let reconciler = Arc::new(AuthReconciler::new(
        config.auth.clone(),
        store,
        wallet.clone() as Arc<dyn IdentitySource>,
        github.clone() as Arc<dyn IdentitySource>,
        metrics.clone(),
    ));
    reconciler.initialize().await;

    Ok(AppState {
        config,
        reconciler,
        wallet,
        github,
        metrics,
    })
}

/// Initializes and runs the application server.
///
/// Binds to the address specified in the configuration and serves requests
/// until Ctrl-C, then stops the reconciler and drains pending store writes.
///
/// # Errors
///
/// Returns an error if the store cannot be created, the server fails to bind
/// to the specified address or encounters a runtime error during execution.
pub async fn run(config: Arc<ConfigV1>) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state(config.clone()).await?;
    let reconciler = state.reconciler.clone();
    let app = routes::create_router(state);

    info!("Starting server on {}", config.bind_address);
    let listener = TcpListener::bind(&config.bind_address).await?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    reconciler.dispose().await;
    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for the shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
