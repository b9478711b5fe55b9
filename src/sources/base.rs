use tokio::sync::watch;

use crate::error::SourceError;
use crate::models::{IdentitySnapshot, SourceKind};

/// An identity source hides one SDK (wallet connector, OAuth identity provider)
/// behind a snapshot plus change feed.
///
/// The channel value is `None` until the source has reported for the first
/// time. Dropping the receiver unsubscribes.
pub trait IdentitySource: Send + Sync {
    fn get_name(&self) -> &str;
    fn get_kind(&self) -> SourceKind;
    /// Best-effort synchronous peek.
    fn current_snapshot(&self) -> Option<IdentitySnapshot>;
    fn subscribe(&self) -> Result<watch::Receiver<Option<IdentitySnapshot>>, SourceError>;
}
