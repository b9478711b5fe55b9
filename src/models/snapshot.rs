use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The two identity sources that make up a complete login.
#[derive(
    Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Wallet,
    GitHub,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Wallet => "wallet",
            SourceKind::GitHub => "github",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one identity source.
///
/// Snapshots are never mutated in place: every adapter event produces a new one
/// and the previous value is dropped.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentitySnapshot {
    pub connected: bool,
    /// Wallet address or GitHub login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Chain name, display name, avatar URL and similar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl IdentitySnapshot {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connected(identifier: impl Into<String>) -> Self {
        IdentitySnapshot {
            connected: true,
            identifier: Some(identifier.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The identifier, if it carries any non-whitespace content.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// A snapshot claiming a connection without an identifier cannot satisfy
    /// any requirement.
    pub fn is_consistent(&self) -> bool {
        !self.connected || self.identifier().is_some()
    }

    /// Returns the snapshot with an inconsistent connection downgraded to
    /// disconnected, plus whether a downgrade happened.
    pub fn into_consistent(mut self) -> (Self, bool) {
        if self.is_consistent() {
            return (self, false);
        }
        self.connected = false;
        (self, true)
    }
}
