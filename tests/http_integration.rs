mod common;

use axum::http::{header, Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{body_json, body_text, build_app, json_request, request, wait_for_state, TEST_CONFIG};

const REVALIDATE_HEADER: &str = "X-Auth-Revalidate";

#[tokio::test]
async fn health_reports_service() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app.oneshot(request(Method::GET, "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "authlink");
}

#[tokio::test]
async fn fresh_state_is_unauthenticated() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .oneshot(request(Method::GET, "/auth/state"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_fully_authenticated"], false);
    assert_eq!(body["wallet"]["connected"], false);
    assert_eq!(body["github_origin"], "unknown");
}

#[tokio::test]
async fn protected_path_redirects_and_asks_for_revalidation() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .oneshot(request(Method::GET, "/auth/access?path=/dashboard"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/connect");
    // Nothing persisted yet, so the summary counts as stale.
    assert_eq!(response.headers().get(REVALIDATE_HEADER).unwrap(), "true");
}

#[tokio::test]
async fn prompt_resource_lists_missing_sources() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .oneshot(request(Method::GET, "/auth/access?path=/repositories"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["decision"]["decision"], "deny_prompt");
    assert_eq!(body["decision"]["missing"], json!(["github"]));
}

#[tokio::test]
async fn undeclared_path_is_public() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .oneshot(request(Method::GET, "/auth/access?path=/about"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(REVALIDATE_HEADER).is_none());
}

#[tokio::test]
async fn decide_always_answers_200() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .clone()
        .oneshot(request(
            Method::GET,
            "/auth/decide?requirement=both&mode=prompt",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({ "decision": "deny_prompt", "missing": ["wallet", "github"] })
    );

    let response = app
        .oneshot(request(Method::GET, "/auth/decide?requirement=none"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!({ "decision": "allow" }));
}

#[tokio::test]
async fn unknown_requirement_is_rejected() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .oneshot(request(Method::GET, "/auth/missing?requirement=email"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bridges_complete_authentication() {
    let (app, state) = build_app(TEST_CONFIG).await;

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/sources/wallet",
            json!({ "connected": true, "identifier": "0xABC", "metadata": { "chain_id": 8453 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let current = wait_for_state(&state, |s| s.is_wallet_connected()).await;
    assert_eq!(
        current.wallet().metadata.as_ref().unwrap()["chain_id"],
        "8453"
    );

    // A signed-in session without a stored token is not a GitHub link yet.
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/sources/github/session",
            json!({ "connected": true, "identifier": "octocat" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(!state.reconciler.get_state().is_github_connected());

    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            "/sources/github/token",
            json!({ "token": "gho_secret" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    wait_for_state(&state, |s| s.is_fully_authenticated()).await;

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/auth/access?path=/dashboard"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // The completion write was queued before the check and stamps a fresh time.
    assert!(response.headers().get(REVALIDATE_HEADER).is_none());

    let response = app
        .oneshot(request(Method::GET, "/auth/missing?requirement=both"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["missing"], json!([]));
}

#[tokio::test]
async fn disconnect_github_clears_state_and_token() {
    let (app, state) = build_app(TEST_CONFIG).await;

    for (method, path, body) in [
        (
            Method::POST,
            "/sources/wallet",
            json!({ "connected": true, "identifier": "0xABC" }),
        ),
        (
            Method::POST,
            "/sources/github/session",
            json!({ "connected": true, "identifier": "octocat" }),
        ),
        (Method::PUT, "/sources/github/token", json!({ "token": "gho_secret" })),
    ] {
        app.clone()
            .oneshot(json_request(method, path, body))
            .await
            .unwrap();
    }
    wait_for_state(&state, |s| s.is_fully_authenticated()).await;

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/auth/disconnect/github"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let current = state.reconciler.get_state();
    assert!(!current.is_github_connected());
    assert!(!current.is_fully_authenticated());
    assert!(current.is_wallet_connected());

    // The last-checked time written at completion survives a GitHub clear.
    let response = app
        .clone()
        .oneshot(request(Method::GET, "/auth/staleness"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["stale"], false);
    assert_eq!(body["max_age_secs"], 3600);

    // The source re-derives its view from the store: the token is gone.
    let current = wait_for_state(&state, |s| {
        s.github().identifier() == Some("octocat") && !s.is_github_connected()
    })
    .await;
    assert!(!current.is_fully_authenticated());
}

#[tokio::test]
async fn unknown_disconnect_target_is_rejected() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .oneshot(request(Method::POST, "/auth/disconnect/email"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_token_is_rejected() {
    let (app, _) = build_app(TEST_CONFIG).await;

    let response = app
        .oneshot(json_request(
            Method::PUT,
            "/sources/github/token",
            json!({ "token": "  " }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

const NO_STORE_CONFIG: &str = r#"
version: "1.0.0"
bind_address: "127.0.0.1:0"
logging:
  level: "info"
  format: "console"
store:
  enabled: false
"#;

#[tokio::test]
async fn disabled_store_fails_closed() {
    let (app, state) = build_app(NO_STORE_CONFIG).await;

    app.clone()
        .oneshot(json_request(
            Method::POST,
            "/sources/wallet",
            json!({ "connected": true, "identifier": "0xABC" }),
        ))
        .await
        .unwrap();
    wait_for_state(&state, |s| s.is_wallet_connected()).await;

    // The token cannot be stored, so GitHub never counts as linked.
    let response = app
        .clone()
        .oneshot(json_request(
            Method::PUT,
            "/sources/github/token",
            json!({ "token": "gho_secret" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The in-memory disconnect still happens; only the store cleanup fails.
    let response = app
        .clone()
        .oneshot(request(Method::POST, "/auth/disconnect/wallet"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!state.reconciler.get_state().is_wallet_connected());

    let response = app
        .oneshot(request(Method::GET, "/auth/staleness"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["stale"], true);
}

#[tokio::test]
async fn metrics_count_decisions() {
    let (app, _) = build_app(TEST_CONFIG).await;

    app.clone()
        .oneshot(request(Method::GET, "/auth/decide?requirement=wallet"))
        .await
        .unwrap();

    let response = app
        .oneshot(request(Method::GET, "/metrics"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("auth_decisions_total"));
    assert!(text.contains("decision=\"deny_redirect\""));
    assert!(text.contains("requirement=\"wallet\""));
}

#[tokio::test]
async fn disconnect_all_removes_stored_token() {
    let (app, state) = build_app(TEST_CONFIG).await;

    app.clone()
        .oneshot(json_request(
            Method::PUT,
            "/sources/github/token",
            json!({ "token": "gho_secret" }),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request(Method::POST, "/auth/disconnect/all"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let current = state.reconciler.get_state();
    assert!(!current.is_wallet_connected());
    assert!(!current.is_github_connected());

    // A later session finds no token to pair with.
    app.oneshot(json_request(
        Method::POST,
        "/sources/github/session",
        json!({ "connected": true, "identifier": "octocat" }),
    ))
    .await
    .unwrap();
    let current = wait_for_state(&state, |s| s.github().identifier() == Some("octocat")).await;
    assert!(!current.is_github_connected());
}
