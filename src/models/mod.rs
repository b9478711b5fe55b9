pub mod auth_state;
pub mod record;
pub mod snapshot;

pub use auth_state::{AuthState, SnapshotOrigin};
pub use record::{ClearScope, PersistedAuthRecord};
pub use snapshot::{IdentitySnapshot, SourceKind};
