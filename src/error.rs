//! Error types shared by the identity sources, the store and the reconciler.
//!
//! None of these ever escape the public query methods of the reconciler;
//! they are absorbed into a degraded (disconnected, fail-closed) state and
//! logged. Only the mutating operations hand a `StoreError` back to callers.

use thiserror::Error;

/// An identity source could not deliver a snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("identity source '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },
    #[error("identity source '{name}' has been closed")]
    Closed { name: String },
}

/// Failures of the durable key/value store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store is disabled")]
    Disabled,
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("persistence worker is not running")]
    WorkerStopped,
}
