//! Single-writer access to the auth record store.
//!
//! Every store operation the reconciler performs goes through one queue and
//! is applied in arrival order, so a fire-and-forget completion write can
//! never land after a later disconnect.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::metrics::{Metrics, MetricsRecorder};
use crate::models::record::{
    is_stale, parse_timestamp, ClearScope, PersistedAuthRecord, AUTH_COMPLETE_KEY,
    LAST_CHECKED_KEY,
};
use crate::store::Store;
use crate::utils::log_throttle::should_emit;

const FAILURE_LOG_WINDOW: Duration = Duration::from_secs(30);

enum PersistCommand {
    Load {
        reply: oneshot::Sender<PersistedAuthRecord>,
    },
    SaveCompletion {
        record: PersistedAuthRecord,
    },
    Clear {
        scope: ClearScope,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    CheckStaleness {
        max_age: Duration,
        now: DateTime<Utc>,
        reply: oneshot::Sender<bool>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable sender side of the persistence queue.
#[derive(Clone)]
pub struct PersistenceHandle {
    sender: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceHandle {
    /// Starts the worker on the current tokio runtime. It stops once every
    /// handle is dropped.
    pub fn spawn(store: Arc<dyn Store>, metrics: Metrics) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = PersistenceWorker {
            store,
            metrics,
            receiver,
        };
        (PersistenceHandle { sender }, tokio::spawn(worker.run()))
    }

    /// Loads the record; a stopped worker yields an empty record.
    pub async fn load(&self) -> PersistedAuthRecord {
        let (reply, response) = oneshot::channel();
        if self.sender.send(PersistCommand::Load { reply }).is_err() {
            warn!("Persistence worker stopped; starting from an empty record");
            return PersistedAuthRecord::default();
        }
        response.await.unwrap_or_default()
    }

    /// Queues the completion summary without waiting for it.
    pub fn save_completion(&self, record: PersistedAuthRecord) {
        if self
            .sender
            .send(PersistCommand::SaveCompletion { record })
            .is_err()
        {
            warn!("Persistence worker stopped; completion summary not written");
        }
    }

    pub async fn clear(&self, scope: ClearScope) -> Result<(), StoreError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(PersistCommand::Clear { scope, reply })
            .map_err(|_| StoreError::WorkerStopped)?;
        response.await.map_err(|_| StoreError::WorkerStopped)?
    }

    /// A stopped worker reports stale, forcing re-validation.
    pub async fn check_staleness(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(PersistCommand::CheckStaleness {
                max_age,
                now,
                reply,
            })
            .is_err()
        {
            return true;
        }
        response.await.unwrap_or(true)
    }

    /// Resolves once everything queued before it has been applied.
    pub async fn flush(&self) {
        let (reply, response) = oneshot::channel();
        if self.sender.send(PersistCommand::Flush { reply }).is_ok() {
            let _ = response.await;
        }
    }
}

struct PersistenceWorker {
    store: Arc<dyn Store>,
    metrics: Metrics,
    receiver: mpsc::UnboundedReceiver<PersistCommand>,
}

impl PersistenceWorker {
    async fn run(mut self) {
        debug!(
            "Persistence worker started (store enabled: {})",
            self.store.is_enabled()
        );
        while let Some(command) = self.receiver.recv().await {
            self.handle(command).await;
        }
        debug!("Persistence worker stopped");
    }

    async fn handle(&self, command: PersistCommand) {
        match command {
            PersistCommand::Load { reply } => {
                let record = PersistedAuthRecord::load(self.store.as_ref()).await;
                let _ = reply.send(record);
            }
            PersistCommand::SaveCompletion { record } => {
                if let Err(e) = record.save_completion(self.store.as_ref()).await {
                    self.failed("save_completion", &e);
                }
            }
            PersistCommand::Clear { scope, reply } => {
                let result = PersistedAuthRecord::clear(self.store.as_ref(), scope).await;
                if let Err(e) = &result {
                    self.failed("clear", e);
                }
                let _ = reply.send(result);
            }
            PersistCommand::CheckStaleness {
                max_age,
                now,
                reply,
            } => {
                let stale = self.check_staleness(max_age, now).await;
                let _ = reply.send(stale);
            }
            PersistCommand::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }

    async fn check_staleness(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let last_checked_at = match self.store.get(LAST_CHECKED_KEY).await {
            Ok(raw) => raw.as_deref().and_then(parse_timestamp),
            Err(e) => {
                self.failed("read_last_checked", &e);
                None
            }
        };
        let stale = is_stale(last_checked_at, max_age, now);
        if stale {
            debug!(
                event_name = "reconciler.record.stale",
                event_domain = "persistence",
                last_checked_at = ?last_checked_at,
                max_age_secs = max_age.as_secs(),
                "persisted auth record is stale, clearing completion flag"
            );
            if let Err(e) = self.store.remove(AUTH_COMPLETE_KEY).await {
                self.failed("clear_auth_complete", &e);
            }
        }
        stale
    }

    fn failed(&self, operation: &str, error: &StoreError) {
        self.metrics.record_persistence_failure(operation);
        let key = format!("persistence.{}.failed", operation);
        if let Some(suppressed_count) = should_emit(&key, FAILURE_LOG_WINDOW) {
            warn!(
                event_name = "persistence.operation.failed",
                event_domain = "persistence",
                operation,
                error = %error,
                suppressed_count,
                "auth record store operation failed"
            );
        }
    }
}
