use std::time::Duration;

use cached::Return;
#[allow(unused_imports)]
use cached::proc_macro::cached;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::utils::log_throttle::should_emit;

const CACHE_HIT_LOG_WINDOW: Duration = Duration::from_secs(30);

/// Checks a stored GitHub token against the GitHub API, so a token revoked
/// upstream stops counting as a linked account.
pub struct TokenVerifier {
    api_url: String,
}

impl TokenVerifier {
    pub fn new(api_url: &str) -> Self {
        info!("Creating GitHub token verifier against '{}'", api_url);
        TokenVerifier {
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// True only when GitHub accepts the token and it belongs to `expected_login`.
    pub async fn verify(&self, token: &str, expected_login: Option<&str>) -> bool {
        let Some(expected_login) = expected_login else {
            return false;
        };
        let login = match query_login(self.api_url.clone(), token.to_string()).await {
            Ok(login) => login,
            Err(e) => {
                warn!(
                    event_name = "sources.github.verify.failed",
                    event_domain = "sources",
                    error = e.as_str(),
                    "GitHub token verification failed"
                );
                return false;
            }
        };
        if login.was_cached {
            if let Some(suppressed_count) =
                should_emit("sources.github.verify.cache.hit", CACHE_HIT_LOG_WINDOW)
            {
                debug!(
                    event_name = "sources.github.verify.cache.hit",
                    event_domain = "sources",
                    cache_result = "hit",
                    cache_ttl_seconds = 60,
                    suppressed_count,
                    "token verification served from cache"
                );
            }
        }
        let matches = login.eq_ignore_ascii_case(expected_login);
        if !matches {
            warn!(
                "GitHub token belongs to '{}', session reports '{}'",
                *login, expected_login
            );
        }
        matches
    }
}

/// Asks GitHub who owns the token, returning the login on success.
#[cfg_attr(
    not(test),
    cached(time = 60, result = true, with_cached_flag = true)
)]
async fn query_login(api_url: String, token: String) -> Result<Return<String>, String> {
    let client = reqwest::Client::new();
    let url = format!("{}/user", api_url);

    debug!("Sending GitHub user request to: {}", url);
    let response = match client
        .get(&url)
        .bearer_auth(&token)
        .header("Accept", "application/vnd.github+json")
        .header("User-Agent", "authlink")
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => return Err(format!("Error sending request: {}", e)),
    };

    if response.status().is_success() {
        let user_info: Value = response
            .json()
            .await
            .map_err(|e| format!("Error parsing JSON: {}", e))?;
        match user_info["login"].as_str() {
            Some(login) if !login.is_empty() => Ok(Return::new(login.to_string())),
            _ => Err("GitHub response carries no login".to_string()),
        }
    } else if response.status() == 401 {
        Err("Invalid GitHub token".to_string())
    } else {
        Err(format!("Unexpected status code: {}", response.status()))
    }
}
