use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::policy::AccessDecision;

pub const REVALIDATE_HEADER: &str = "X-Auth-Revalidate";

/// Route-guard answer: the decision mapped onto an HTTP status.
///
/// - `Allow` -> 200
/// - `DenyRedirect` -> 303 with `Location`
/// - `DenyPrompt` -> 401 with the missing sources in the body
pub struct GuardResponse {
    pub decision: AccessDecision,
    /// The persisted summary is stale and the UI should re-validate.
    pub revalidate: bool,
}

impl IntoResponse for GuardResponse {
    fn into_response(self) -> Response {
        let status = match &self.decision {
            AccessDecision::Allow => StatusCode::OK,
            AccessDecision::DenyRedirect { .. } => StatusCode::SEE_OTHER,
            AccessDecision::DenyPrompt { .. } => StatusCode::UNAUTHORIZED,
        };
        let body = json!({
            "decision": &self.decision,
            "revalidate": self.revalidate,
        });
        let mut response = (status, Json(body)).into_response();

        if let AccessDecision::DenyRedirect { target } = &self.decision {
            match HeaderValue::from_str(target) {
                Ok(location) => {
                    response.headers_mut().insert(header::LOCATION, location);
                }
                Err(_) => {
                    tracing::warn!("Redirect target '{}' is not a valid header value", target);
                }
            }
        }
        if self.revalidate {
            response
                .headers_mut()
                .insert(REVALIDATE_HEADER, HeaderValue::from_static("true"));
        }
        response
    }
}
