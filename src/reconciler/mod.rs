pub mod persistence;
pub mod reconciler;

// Re-export from reconciler.rs so we can do "use crate::reconciler::*;"
pub use reconciler::{AuthReconciler, ReconcilerConfig};
