use tokio::sync::watch;
use tracing::debug;

use super::IdentitySource;
use crate::error::SourceError;
use crate::models::{IdentitySnapshot, SourceKind};

/// A source fed from outside, e.g. by the wallet SDK bridge posting every
/// connection change.
pub struct PushSource {
    name: String,
    kind: SourceKind,
    sender: watch::Sender<Option<IdentitySnapshot>>,
}

impl PushSource {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        let (sender, _) = watch::channel(None);
        PushSource {
            name: name.into(),
            kind,
            sender,
        }
    }

    /// Replaces the current snapshot and notifies every subscriber.
    pub fn publish(&self, snapshot: IdentitySnapshot) {
        debug!(
            event_name = "sources.push.publish",
            event_domain = "sources",
            source_name = self.name.as_str(),
            source_kind = self.kind.as_str(),
            connected = snapshot.connected,
            subscribers = self.sender.receiver_count() as u64,
            "identity source published a snapshot"
        );
        self.sender.send_replace(Some(snapshot));
    }
}

impl IdentitySource for PushSource {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn get_kind(&self) -> SourceKind {
        self.kind
    }

    fn current_snapshot(&self) -> Option<IdentitySnapshot> {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> Result<watch::Receiver<Option<IdentitySnapshot>>, SourceError> {
        Ok(self.sender.subscribe())
    }
}
