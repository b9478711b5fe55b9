use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::token_verifier::TokenVerifier;
use super::IdentitySource;
use crate::error::{SourceError, StoreError};
use crate::models::record::GITHUB_TOKEN_KEY;
use crate::models::{IdentitySnapshot, SourceKind};
use crate::store::Store;

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

/// Settings of the GitHub identity source.
#[derive(Deserialize, Serialize, Debug, JsonSchema, Clone)]
pub struct GitHubConfig {
    /// Check the stored token against the GitHub API before reporting a link.
    #[serde(default)]
    pub verify_token: bool,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            verify_token: false,
            api_url: default_api_url(),
        }
    }
}

/// GitHub linkage needs two signals: a signed-in identity-provider session
/// and an access token present in the durable store.
pub struct GitHubIdentitySource {
    name: String,
    store: Arc<dyn Store>,
    verifier: Option<TokenVerifier>,
    /// Last session reported by the OAuth bridge; the lock also orders publishes.
    session: Mutex<Option<IdentitySnapshot>>,
    sender: watch::Sender<Option<IdentitySnapshot>>,
}

impl GitHubIdentitySource {
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>, config: &GitHubConfig) -> Self {
        let name = name.into();
        info!(
            "Creating GitHub identity source '{}' (token verification: {})",
            name, config.verify_token
        );
        let (sender, _) = watch::channel(None);
        GitHubIdentitySource {
            name,
            store,
            verifier: config
                .verify_token
                .then(|| TokenVerifier::new(&config.api_url)),
            session: Mutex::new(None),
            sender,
        }
    }

    /// Records the identity-provider session and publishes the combined view.
    pub async fn report_session(&self, snapshot: IdentitySnapshot) {
        let mut session = self.session.lock().await;
        *session = Some(snapshot);
        self.publish(session.as_ref()).await;
    }

    /// Stores the OAuth access token, then re-publishes.
    pub async fn store_access_token(&self, token: &str) -> Result<(), StoreError> {
        let session = self.session.lock().await;
        self.store.set(GITHUB_TOKEN_KEY, token).await?;
        self.publish(session.as_ref()).await;
        Ok(())
    }

    /// Removes the OAuth access token. The combined view is re-published even
    /// when the removal fails.
    pub async fn clear_access_token(&self) -> Result<(), StoreError> {
        let session = self.session.lock().await;
        let result = self.store.remove(GITHUB_TOKEN_KEY).await;
        self.publish(session.as_ref()).await;
        result
    }

    /// Re-derives the combined view, e.g. after the token key changed behind
    /// the source's back.
    pub async fn refresh(&self) {
        let session = self.session.lock().await;
        self.publish(session.as_ref()).await;
    }

    async fn publish(&self, session: Option<&IdentitySnapshot>) {
        // Nothing to report before the identity provider spoke.
        let Some(session) = session else {
            debug!("GitHub source '{}' has no session yet", self.name);
            return;
        };
        let combined = self.combine(session).await;
        debug!(
            event_name = "sources.github.publish",
            event_domain = "sources",
            source_name = self.name.as_str(),
            session_connected = session.connected,
            connected = combined.connected,
            "GitHub identity source published a snapshot"
        );
        self.sender.send_replace(Some(combined));
    }

    async fn combine(&self, session: &IdentitySnapshot) -> IdentitySnapshot {
        if !session.connected {
            return session.clone();
        }
        let unlinked = || IdentitySnapshot {
            connected: false,
            ..session.clone()
        };

        let token = match self.store.get(GITHUB_TOKEN_KEY).await {
            Ok(Some(token)) if !token.trim().is_empty() => token,
            Ok(_) => {
                debug!("No GitHub access token stored; session alone is not a link");
                return unlinked();
            }
            Err(e) => {
                warn!("Unable to read the GitHub access token: {}", e);
                return unlinked();
            }
        };

        if let Some(verifier) = &self.verifier {
            if !verifier.verify(&token, session.identifier()).await {
                return unlinked();
            }
        }
        session.clone()
    }
}

impl IdentitySource for GitHubIdentitySource {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_kind(&self) -> SourceKind {
        SourceKind::GitHub
    }

    fn current_snapshot(&self) -> Option<IdentitySnapshot> {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> Result<watch::Receiver<Option<IdentitySnapshot>>, SourceError> {
        Ok(self.sender.subscribe())
    }
}
