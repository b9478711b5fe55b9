use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::snapshot::{IdentitySnapshot, SourceKind};
use crate::gate::AuthRequirement;

/// Where the current snapshot of a source came from.
///
/// Allowed transitions: `Unknown -> Seeded`, anything `-> Confirmed`.
/// A confirmed source is never seeded again.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrigin {
    #[default]
    Unknown,
    Seeded,
    Confirmed,
}

/// Canonical merged view of both identity sources.
///
/// `is_fully_authenticated` is private and recomputed by every constructor,
/// so it always equals `wallet.connected && github.connected`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    wallet: IdentitySnapshot,
    github: IdentitySnapshot,
    wallet_origin: SnapshotOrigin,
    github_origin: SnapshotOrigin,
    is_fully_authenticated: bool,
    last_computed_at: DateTime<Utc>,
}

impl AuthState {
    /// Both sources unknown and disconnected.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self::compute(
            IdentitySnapshot::disconnected(),
            SnapshotOrigin::Unknown,
            IdentitySnapshot::disconnected(),
            SnapshotOrigin::Unknown,
            now,
        )
    }

    fn compute(
        wallet: IdentitySnapshot,
        wallet_origin: SnapshotOrigin,
        github: IdentitySnapshot,
        github_origin: SnapshotOrigin,
        now: DateTime<Utc>,
    ) -> Self {
        AuthState {
            is_fully_authenticated: wallet.connected && github.connected,
            wallet,
            github,
            wallet_origin,
            github_origin,
            last_computed_at: now,
        }
    }

    /// New state with `kind` replaced by an authoritative snapshot.
    pub fn confirm(&self, kind: SourceKind, snapshot: IdentitySnapshot, now: DateTime<Utc>) -> Self {
        self.replace(kind, snapshot, SnapshotOrigin::Confirmed, now)
    }

    /// New state with `kind` provisionally seeded, or `None` once the source
    /// has been confirmed.
    pub fn seed(
        &self,
        kind: SourceKind,
        snapshot: IdentitySnapshot,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if self.origin(kind) == SnapshotOrigin::Confirmed {
            return None;
        }
        Some(self.replace(kind, snapshot, SnapshotOrigin::Seeded, now))
    }

    fn replace(
        &self,
        kind: SourceKind,
        snapshot: IdentitySnapshot,
        origin: SnapshotOrigin,
        now: DateTime<Utc>,
    ) -> Self {
        match kind {
            SourceKind::Wallet => Self::compute(
                snapshot,
                origin,
                self.github.clone(),
                self.github_origin,
                now,
            ),
            SourceKind::GitHub => Self::compute(
                self.wallet.clone(),
                self.wallet_origin,
                snapshot,
                origin,
                now,
            ),
        }
    }

    pub fn wallet(&self) -> &IdentitySnapshot {
        &self.wallet
    }

    pub fn github(&self) -> &IdentitySnapshot {
        &self.github
    }

    pub fn snapshot(&self, kind: SourceKind) -> &IdentitySnapshot {
        match kind {
            SourceKind::Wallet => &self.wallet,
            SourceKind::GitHub => &self.github,
        }
    }

    pub fn origin(&self, kind: SourceKind) -> SnapshotOrigin {
        match kind {
            SourceKind::Wallet => self.wallet_origin,
            SourceKind::GitHub => self.github_origin,
        }
    }

    pub fn is_connected(&self, kind: SourceKind) -> bool {
        self.snapshot(kind).connected
    }

    pub fn is_wallet_connected(&self) -> bool {
        self.wallet.connected
    }

    pub fn is_github_connected(&self) -> bool {
        self.github.connected
    }

    pub fn is_fully_authenticated(&self) -> bool {
        self.is_fully_authenticated
    }

    pub fn last_computed_at(&self) -> DateTime<Utc> {
        self.last_computed_at
    }

    /// Every source the requirement needs that is not connected right now.
    pub fn missing_requirements(&self, requirement: AuthRequirement) -> BTreeSet<SourceKind> {
        requirement
            .required_sources()
            .iter()
            .copied()
            .filter(|kind| !self.is_connected(*kind))
            .collect()
    }
}
