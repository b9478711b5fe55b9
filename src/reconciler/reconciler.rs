use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::persistence::PersistenceHandle;
use crate::error::{SourceError, StoreError};
use crate::gate::AuthRequirement;
use crate::metrics::{Metrics, MetricsRecorder};
use crate::models::{
    AuthState, ClearScope, IdentitySnapshot, PersistedAuthRecord, SnapshotOrigin, SourceKind,
};
use crate::sources::IdentitySource;
use crate::store::Store;

fn default_stale_after_secs() -> u64 {
    3600
}

fn default_source_retry_ms() -> u64 {
    1000
}

fn default_seed_from_store() -> bool {
    true
}

/// Reconciler policy, the `auth` section of the config.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct ReconcilerConfig {
    /// Age after which the persisted summary must be re-validated.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Delay before re-subscribing to an unavailable identity source.
    #[serde(default = "default_source_retry_ms")]
    pub source_retry_ms: u64,
    /// Optimistically show GitHub as linked from the persisted record until
    /// the live source reports.
    #[serde(default = "default_seed_from_store")]
    pub seed_from_store: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        ReconcilerConfig {
            stale_after_secs: default_stale_after_secs(),
            source_retry_ms: default_source_retry_ms(),
            seed_from_store: default_seed_from_store(),
        }
    }
}

impl ReconcilerConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.source_retry_ms)
    }
}

/// Owns the canonical `AuthState`.
///
/// Every change goes through one mutex, so events apply strictly in arrival
/// order; readers only ever get immutable `Arc<AuthState>` values. Store I/O
/// is delegated to the persistence worker and never blocks a state update.
pub struct AuthReconciler {
    config: ReconcilerConfig,
    wallet_source: Arc<dyn IdentitySource>,
    github_source: Arc<dyn IdentitySource>,
    state: Mutex<Arc<AuthState>>,
    observers: watch::Sender<Arc<AuthState>>,
    persistence: PersistenceHandle,
    initialized: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: Metrics,
}

impl AuthReconciler {
    /// Must be called inside a tokio runtime: it starts the persistence worker.
    pub fn new(
        config: ReconcilerConfig,
        store: Arc<dyn Store>,
        wallet_source: Arc<dyn IdentitySource>,
        github_source: Arc<dyn IdentitySource>,
        metrics: Metrics,
    ) -> Self {
        for (expected, source) in [
            (SourceKind::Wallet, &wallet_source),
            (SourceKind::GitHub, &github_source),
        ] {
            if source.get_kind() != expected {
                warn!(
                    "Source '{}' reports kind '{}' but is wired as the {} source",
                    source.get_name(),
                    source.get_kind(),
                    expected
                );
            }
        }

        let (persistence, _worker) = PersistenceHandle::spawn(store, metrics.clone());
        let initial = Arc::new(AuthState::initial(Utc::now()));
        let (observers, _) = watch::channel(Arc::clone(&initial));

        AuthReconciler {
            config,
            wallet_source,
            github_source,
            state: Mutex::new(initial),
            observers,
            persistence,
            initialized: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            metrics,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Seeds from the persisted record, then subscribes to both sources.
    /// A stale record is not seeded from. Calling it again is a no-op.
    pub async fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            warn!("Auth reconciler is already initialized");
            return;
        }

        if self.config.seed_from_store {
            if self.check_staleness(self.config.max_age()).await {
                info!(
                    event_name = "reconciler.seed.skipped",
                    event_domain = "reconciler",
                    max_age_secs = self.config.stale_after_secs,
                    "persisted record is stale, waiting for the live sources"
                );
            } else {
                let record = self.persistence.load().await;
                self.seed_github(&record);
            }
        }

        let sources = [
            (SourceKind::Wallet, Arc::clone(&self.wallet_source)),
            (SourceKind::GitHub, Arc::clone(&self.github_source)),
        ];
        let handles = sources.map(|(kind, source)| {
            let reconciler = Arc::clone(self);
            tokio::spawn(async move { reconciler.watch_source(kind, source).await })
        });
        self.lock_tasks().extend(handles);
        info!("Auth reconciler initialized");
    }

    /// Stops watching the sources and waits for queued store writes.
    pub async fn dispose(&self) {
        let tasks = std::mem::take(&mut *self.lock_tasks());
        let stopped = tasks.len();
        for task in &tasks {
            task.abort();
        }
        // Aborted tasks resolve with a cancellation error.
        join_all(tasks).await;
        self.persistence.flush().await;
        info!("Auth reconciler disposed ({} subscriptions stopped)", stopped);
    }

    /// Provisional GitHub link from the cache. Only applies while the live
    /// source has not reported; the wallet is never seeded.
    fn seed_github(&self, record: &PersistedAuthRecord) {
        if !record.can_seed_github() {
            debug!("Persisted record cannot seed the GitHub source");
            return;
        }
        let snapshot = IdentitySnapshot {
            connected: true,
            identifier: record.github_identifier.clone(),
            metadata: record.github_metadata.clone(),
        };

        let mut state = self.lock_state();
        match state.seed(SourceKind::GitHub, snapshot, Utc::now()) {
            Some(next) => {
                info!(
                    event_name = "reconciler.github.seeded",
                    event_domain = "reconciler",
                    identifier = record.github_identifier.as_deref().unwrap_or_default(),
                    "GitHub link seeded from persisted record"
                );
                self.replace_state(&mut state, next);
            }
            None => debug!("GitHub source already confirmed; seed skipped"),
        }
    }

    async fn watch_source(self: Arc<Self>, kind: SourceKind, source: Arc<dyn IdentitySource>) {
        let retry_delay = self.config.retry_delay();
        let mut unavailable = false;
        loop {
            match source.subscribe() {
                Ok(mut receiver) => {
                    unavailable = false;
                    debug!("Subscribed to {} source '{}'", kind, source.get_name());
                    let current = receiver.borrow_and_update().clone();
                    if let Some(snapshot) = current {
                        self.on_source_changed(kind, snapshot);
                    }
                    while receiver.changed().await.is_ok() {
                        let next = receiver.borrow_and_update().clone();
                        if let Some(snapshot) = next {
                            self.on_source_changed(kind, snapshot);
                        }
                    }
                    let error = SourceError::Closed {
                        name: source.get_name().to_string(),
                    };
                    self.on_source_unavailable(kind, &error, &mut unavailable);
                }
                Err(error) => self.on_source_unavailable(kind, &error, &mut unavailable),
            }
            tokio::time::sleep(retry_delay).await;
        }
    }

    /// An unavailable source counts as disconnected, once per failure streak.
    fn on_source_unavailable(&self, kind: SourceKind, error: &SourceError, unavailable: &mut bool) {
        if *unavailable {
            debug!("{} source still unavailable: {}", kind, error);
            return;
        }
        *unavailable = true;
        warn!(
            event_name = "reconciler.source.unavailable",
            event_domain = "reconciler",
            source = kind.as_str(),
            error = %error,
            "identity source unavailable, treating it as disconnected"
        );
        self.on_source_changed(kind, IdentitySnapshot::disconnected());
    }

    /// Applies an authoritative snapshot from a source.
    pub fn on_source_changed(&self, kind: SourceKind, snapshot: IdentitySnapshot) {
        let (snapshot, downgraded) = snapshot.into_consistent();
        if downgraded {
            warn!(
                event_name = "reconciler.snapshot.inconsistent",
                event_domain = "reconciler",
                source = kind.as_str(),
                "connected snapshot without identifier treated as disconnected"
            );
        }
        self.metrics
            .record_source_event(kind.as_str(), snapshot.connected);

        let mut state = self.lock_state();
        let next = state.confirm(kind, snapshot, Utc::now());
        if !state.is_fully_authenticated() && next.is_fully_authenticated() {
            info!(
                event_name = "reconciler.auth.complete",
                event_domain = "reconciler",
                wallet = next.wallet().identifier().unwrap_or_default(),
                github = next.github().identifier().unwrap_or_default(),
                "wallet and GitHub are both connected"
            );
            self.metrics.record_full_transition();
        }
        // A seeded half never refreshes the record; only live reports do.
        if !is_confirmed_complete(&state) && is_confirmed_complete(&next) {
            self.persistence.save_completion(completion_record(&next));
        } else if let Some(link) = confirmed_github_link(&state, &next) {
            debug!(
                event_name = "reconciler.github.linked",
                event_domain = "reconciler",
                identifier = link.github_identifier.as_deref().unwrap_or_default(),
                "persisting GitHub link"
            );
            self.persistence.save_completion(link);
        }
        self.replace_state(&mut state, next);
    }

    fn replace_state(&self, state: &mut MutexGuard<'_, Arc<AuthState>>, next: AuthState) {
        let next = Arc::new(next);
        **state = Arc::clone(&next);
        self.observers.send_replace(next);
    }

    /// Current state; never blocks on I/O.
    pub fn get_state(&self) -> Arc<AuthState> {
        Arc::clone(&self.lock_state())
    }

    pub fn get_missing_requirements(&self, requirement: AuthRequirement) -> BTreeSet<SourceKind> {
        self.get_state().missing_requirements(requirement)
    }

    /// Notified with every recomputed state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AuthState>> {
        self.observers.subscribe()
    }

    pub async fn disconnect_wallet(&self) -> Result<(), StoreError> {
        self.disconnect(ClearScope::Wallet).await
    }

    pub async fn disconnect_github(&self) -> Result<(), StoreError> {
        self.disconnect(ClearScope::GitHub).await
    }

    pub async fn disconnect_all(&self) -> Result<(), StoreError> {
        self.disconnect(ClearScope::All).await
    }

    /// Clears the reconciler's own view. Terminating the SDK sessions is left
    /// to the caller. The in-memory clear always happens; only the store
    /// cleanup can fail.
    pub async fn disconnect(&self, scope: ClearScope) -> Result<(), StoreError> {
        {
            let mut state = self.lock_state();
            let now = Utc::now();
            let cleared = |state: &AuthState, kind: SourceKind| {
                state.confirm(kind, IdentitySnapshot::disconnected(), now)
            };
            let current: &AuthState = &state;
            let next = match scope {
                ClearScope::Wallet => cleared(current, SourceKind::Wallet),
                ClearScope::GitHub => cleared(current, SourceKind::GitHub),
                ClearScope::All => cleared(
                    &cleared(current, SourceKind::Wallet),
                    SourceKind::GitHub,
                ),
            };
            self.replace_state(&mut state, next);
        }
        info!("Disconnected {} from the auth state", scope.as_str());

        let result = self.persistence.clear(scope).await;
        if let Err(e) = &result {
            warn!("Persisted record not cleared for {}: {}", scope.as_str(), e);
        }
        result
    }

    /// Compares the persisted `last checked` time against `max_age`. When
    /// stale, the persisted completion flag is dropped and `true` tells the
    /// caller to re-validate. Live state is left untouched.
    pub async fn check_staleness(&self, max_age: Duration) -> bool {
        let stale = self.persistence.check_staleness(max_age, Utc::now()).await;
        self.metrics.record_staleness_check(stale);
        stale
    }

    /// Waits for every queued store operation to finish.
    pub async fn flush_persistence(&self) {
        self.persistence.flush().await;
    }

    fn lock_state(&self) -> MutexGuard<'_, Arc<AuthState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Both halves connected and reported by the live sources.
fn is_confirmed_complete(state: &AuthState) -> bool {
    state.is_fully_authenticated()
        && state.origin(SourceKind::Wallet) == SnapshotOrigin::Confirmed
        && state.origin(SourceKind::GitHub) == SnapshotOrigin::Confirmed
}

fn is_confirmed_github(state: &AuthState) -> bool {
    state.is_github_connected() && state.origin(SourceKind::GitHub) == SnapshotOrigin::Confirmed
}

/// The GitHub half of the record, when `next` newly confirms a live link (or
/// a different account). Written without the wallet so the link survives a
/// restart on its own.
fn confirmed_github_link(prev: &AuthState, next: &AuthState) -> Option<PersistedAuthRecord> {
    if !is_confirmed_github(next) {
        return None;
    }
    if is_confirmed_github(prev) && prev.github().identifier() == next.github().identifier() {
        return None;
    }
    Some(PersistedAuthRecord {
        github_identifier: next.github().identifier().map(str::to_string),
        github_metadata: next.github().metadata.clone(),
        last_checked_at: Some(next.last_computed_at()),
        ..PersistedAuthRecord::default()
    })
}

/// Summary written when authentication becomes complete.
fn completion_record(state: &AuthState) -> PersistedAuthRecord {
    PersistedAuthRecord {
        github_identifier: state.github().identifier().map(str::to_string),
        github_metadata: state.github().metadata.clone(),
        github_access_token: None,
        wallet_address_hint: state.wallet().identifier().map(str::to_string),
        auth_complete_flag: Some(true),
        last_checked_at: Some(state.last_computed_at()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{
        AUTH_COMPLETE_KEY, GITHUB_USER_KEY, LAST_CHECKED_KEY, WALLET_HINT_KEY,
    };
    use crate::sources::PushSource;
    use crate::store::memory_store::MemoryStore;

    fn reconciler(store: Arc<dyn Store>) -> AuthReconciler {
        AuthReconciler::new(
            ReconcilerConfig::default(),
            store,
            Arc::new(PushSource::new("wallet", SourceKind::Wallet)),
            Arc::new(PushSource::new("github", SourceKind::GitHub)),
            Metrics::new(),
        )
    }

    #[tokio::test]
    async fn test_completion_is_persisted_once() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());

        reconciler.on_source_changed(SourceKind::Wallet, IdentitySnapshot::connected("0xABC"));
        reconciler.flush_persistence().await;
        assert_eq!(store.get(AUTH_COMPLETE_KEY).await.unwrap(), None);

        reconciler.on_source_changed(SourceKind::GitHub, IdentitySnapshot::connected("octocat"));
        reconciler.flush_persistence().await;
        assert_eq!(
            store.get(AUTH_COMPLETE_KEY).await.unwrap().as_deref(),
            Some("true")
        );
        assert_eq!(
            store.get(WALLET_HINT_KEY).await.unwrap().as_deref(),
            Some("0xABC")
        );

        // Already complete: a repeated event does not rewrite the record.
        store.remove(WALLET_HINT_KEY).await.unwrap();
        reconciler.on_source_changed(SourceKind::Wallet, IdentitySnapshot::connected("0xABC"));
        reconciler.flush_persistence().await;
        assert_eq!(store.get(WALLET_HINT_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_github_link_is_persisted_without_wallet() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());

        reconciler.on_source_changed(SourceKind::GitHub, IdentitySnapshot::connected("octocat"));
        reconciler.flush_persistence().await;
        let user = store.get(GITHUB_USER_KEY).await.unwrap().unwrap();
        assert!(user.contains("\"login\":\"octocat\""));
        assert!(store.get(LAST_CHECKED_KEY).await.unwrap().is_some());
        assert_eq!(store.get(AUTH_COMPLETE_KEY).await.unwrap(), None);
        assert_eq!(store.get(WALLET_HINT_KEY).await.unwrap(), None);

        // Same account again: nothing is rewritten.
        store.remove(GITHUB_USER_KEY).await.unwrap();
        reconciler.on_source_changed(SourceKind::GitHub, IdentitySnapshot::connected("octocat"));
        reconciler.flush_persistence().await;
        assert_eq!(store.get(GITHUB_USER_KEY).await.unwrap(), None);

        // A different account is linked over the old one.
        reconciler.on_source_changed(SourceKind::GitHub, IdentitySnapshot::connected("hubot"));
        reconciler.flush_persistence().await;
        let user = store.get(GITHUB_USER_KEY).await.unwrap().unwrap();
        assert!(user.contains("\"login\":\"hubot\""));
    }

    #[tokio::test]
    async fn test_seeded_half_does_not_complete_the_record() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let reconciler = reconciler(store.clone());
        reconciler.seed_github(&PersistedAuthRecord {
            github_identifier: Some("octocat".to_string()),
            github_access_token: Some("gho_cached".to_string()),
            ..PersistedAuthRecord::default()
        });

        reconciler.on_source_changed(SourceKind::Wallet, IdentitySnapshot::connected("0xABC"));
        reconciler.flush_persistence().await;
        assert!(reconciler.get_state().is_fully_authenticated());
        assert_eq!(store.get(AUTH_COMPLETE_KEY).await.unwrap(), None);
        assert_eq!(store.get(LAST_CHECKED_KEY).await.unwrap(), None);

        // The live report confirms the seeded half.
        reconciler.on_source_changed(SourceKind::GitHub, IdentitySnapshot::connected("octocat"));
        reconciler.flush_persistence().await;
        assert_eq!(
            store.get(AUTH_COMPLETE_KEY).await.unwrap().as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_inconsistent_snapshot_counts_as_disconnected() {
        let reconciler = reconciler(Arc::new(MemoryStore::new()));
        reconciler.on_source_changed(
            SourceKind::Wallet,
            IdentitySnapshot {
                connected: true,
                identifier: None,
                metadata: None,
            },
        );
        let state = reconciler.get_state();
        assert!(!state.is_wallet_connected());
        assert_eq!(state.origin(SourceKind::Wallet), SnapshotOrigin::Confirmed);
    }

    #[tokio::test]
    async fn test_observers_see_every_recomputation() {
        let reconciler = reconciler(Arc::new(MemoryStore::new()));
        let mut observer = reconciler.subscribe();

        reconciler.on_source_changed(SourceKind::Wallet, IdentitySnapshot::connected("0xABC"));
        observer.changed().await.unwrap();
        assert!(observer.borrow_and_update().is_wallet_connected());

        reconciler.disconnect_wallet().await.unwrap();
        observer.changed().await.unwrap();
        assert!(!observer.borrow_and_update().is_wallet_connected());
    }

    #[test]
    fn test_config_defaults() {
        let config: ReconcilerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_age(), Duration::from_secs(3600));
        assert_eq!(config.retry_delay(), Duration::from_millis(1000));
        assert!(config.seed_from_store);
    }
}
