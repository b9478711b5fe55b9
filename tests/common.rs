#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use authlink::config::{extract_config, ConfigV1};
use authlink::models::AuthState;
use authlink::routes::create_router;
use authlink::startup::build_state;
use authlink::state::AppState;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use figment::{
    providers::{Format, Yaml},
    Figment,
};
use serde_json::Value;

pub const TEST_CONFIG: &str = r#"
version: "1.0.0"
bind_address: "127.0.0.1:0"
logging:
  level: "debug"
  format: "json"
store:
  enabled: true
  type: memory
auth:
  stale_after_secs: 3600
  source_retry_ms: 50
resources:
  - path: /dashboard
    requirement: both
    mode: redirect
    target: /connect
  - path: /repositories
    requirement: github
    mode: prompt
  - path: /wallet
    requirement: wallet
"#;

pub fn config_from_yaml(yaml: &str) -> ConfigV1 {
    extract_config(Figment::new().merge(Yaml::string(yaml))).expect("valid test config")
}

pub async fn build_app(yaml: &str) -> (Router, AppState) {
    let config = Arc::new(config_from_yaml(yaml));
    let state = build_state(config).await.expect("state builds");
    (create_router(state.clone()), state)
}

pub fn request(method: Method, path: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("failed to build request")
}

pub fn json_request(method: Method, path: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(path)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

/// Waits until the reconciler has applied the pushed events.
pub async fn wait_for_state(
    state: &AppState,
    predicate: impl FnMut(&Arc<AuthState>) -> bool,
) -> Arc<AuthState> {
    let mut observer = state.reconciler.subscribe();
    let current = tokio::time::timeout(Duration::from_secs(2), observer.wait_for(predicate))
        .await
        .expect("state reached in time")
        .expect("reconciler alive");
    Arc::clone(&*current)
}
