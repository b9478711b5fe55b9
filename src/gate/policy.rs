use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{AuthState, SourceKind};

/// What a protected resource needs before it may be shown.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthRequirement {
    #[default]
    None,
    Wallet,
    GitHub,
    Both,
}

impl AuthRequirement {
    pub fn required_sources(&self) -> &'static [SourceKind] {
        match self {
            AuthRequirement::None => &[],
            AuthRequirement::Wallet => &[SourceKind::Wallet],
            AuthRequirement::GitHub => &[SourceKind::GitHub],
            AuthRequirement::Both => &[SourceKind::Wallet, SourceKind::GitHub],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthRequirement::None => "none",
            AuthRequirement::Wallet => "wallet",
            AuthRequirement::GitHub => "github",
            AuthRequirement::Both => "both",
        }
    }
}

/// How a denial is presented to the user.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    #[default]
    Redirect,
    Prompt,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
pub struct GateOptions {
    pub mode: GateMode,
    /// Where a redirect denial sends the user.
    pub target: String,
}

impl GateOptions {
    pub fn redirect(target: impl Into<String>) -> Self {
        GateOptions {
            mode: GateMode::Redirect,
            target: target.into(),
        }
    }

    pub fn prompt() -> Self {
        GateOptions {
            mode: GateMode::Prompt,
            target: String::new(),
        }
    }
}

/// Outcome of evaluating an `AuthState` against a requirement. There is no
/// error variant: failures upstream already show up as disconnected sources.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Allow,
    DenyRedirect { target: String },
    DenyPrompt { missing: BTreeSet<SourceKind> },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AccessDecision::Allow => "allow",
            AccessDecision::DenyRedirect { .. } => "deny_redirect",
            AccessDecision::DenyPrompt { .. } => "deny_prompt",
        }
    }
}

/// Pure access policy. A prompt denial lists every missing source at once.
pub fn decide(state: &AuthState, requirement: AuthRequirement, options: &GateOptions) -> AccessDecision {
    let missing = state.missing_requirements(requirement);
    if missing.is_empty() {
        return AccessDecision::Allow;
    }
    match options.mode {
        GateMode::Redirect => AccessDecision::DenyRedirect {
            target: options.target.clone(),
        },
        GateMode::Prompt => AccessDecision::DenyPrompt { missing },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentitySnapshot;
    use chrono::Utc;

    fn state(wallet: bool, github: bool) -> AuthState {
        let snapshot = |connected: bool, id: &str| {
            if connected {
                IdentitySnapshot::connected(id)
            } else {
                IdentitySnapshot::disconnected()
            }
        };
        AuthState::initial(Utc::now())
            .confirm(SourceKind::Wallet, snapshot(wallet, "0xABC"), Utc::now())
            .confirm(SourceKind::GitHub, snapshot(github, "octocat"), Utc::now())
    }

    #[test]
    fn test_none_always_allows() {
        for (wallet, github) in [(false, false), (true, false), (false, true), (true, true)] {
            let state = state(wallet, github);
            assert_eq!(
                decide(&state, AuthRequirement::None, &GateOptions::prompt()),
                AccessDecision::Allow
            );
            assert_eq!(
                decide(&state, AuthRequirement::None, &GateOptions::redirect("/connect")),
                AccessDecision::Allow
            );
        }
    }

    #[test]
    fn test_wallet_only_session() {
        let state = state(true, false);
        assert_eq!(
            decide(&state, AuthRequirement::Wallet, &GateOptions::redirect("/connect")),
            AccessDecision::Allow
        );
        assert_eq!(
            decide(&state, AuthRequirement::GitHub, &GateOptions::redirect("/connect")),
            AccessDecision::DenyRedirect {
                target: "/connect".to_string()
            }
        );
        assert_eq!(
            decide(&state, AuthRequirement::Both, &GateOptions::prompt()),
            AccessDecision::DenyPrompt {
                missing: BTreeSet::from([SourceKind::GitHub])
            }
        );
    }

    #[test]
    fn test_prompt_lists_every_missing_source() {
        let decision = decide(&state(false, false), AuthRequirement::Both, &GateOptions::prompt());
        assert_eq!(
            decision,
            AccessDecision::DenyPrompt {
                missing: BTreeSet::from([SourceKind::Wallet, SourceKind::GitHub])
            }
        );
    }

    #[test]
    fn test_fully_authenticated_allows_everything() {
        let state = state(true, true);
        for requirement in [
            AuthRequirement::None,
            AuthRequirement::Wallet,
            AuthRequirement::GitHub,
            AuthRequirement::Both,
        ] {
            assert!(decide(&state, requirement, &GateOptions::prompt()).is_allowed());
        }
    }

    #[test]
    fn test_decision_json_shape() {
        let decision = AccessDecision::DenyPrompt {
            missing: BTreeSet::from([SourceKind::GitHub, SourceKind::Wallet]),
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"decision": "deny_prompt", "missing": ["wallet", "github"]})
        );
    }
}
