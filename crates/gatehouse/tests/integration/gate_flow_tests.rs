//! End-to-end guard flows against a mock JWKS endpoint.
//!
//! Tests follow the convention: `test_<feature>_<scenario>_<expected_result>`

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use chrono::Utc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{
    app, body_json, gate, get_request, jwks_body, policy, sign, user_claims, RSA_N_A, RSA_PEM_A,
    RSA_PEM_B,
};

async fn mock_jwks_once(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[("key-a", RSA_N_A)])))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_required_auth_valid_token_returns_identity() {
    let mock_server = MockServer::start().await;
    mock_jwks_once(&mock_server).await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let mut claims = user_claims();
    claims
        .extra
        .insert("extension_q_Company".to_string(), serde_json::json!("Corp"));
    claims
        .extra
        .insert("extension_q_Roles".to_string(), serde_json::json!("admin"));
    let token = sign(&claims, RSA_PEM_A, "key-a");

    // two requests, one JWKS fetch: the .expect(1) on the mock verifies
    // the cache absorbed the second resolution
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get_request("/me", Some(&token)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["id"], "u1");
        assert_eq!(body["email"], "u1@x.com");
        assert_eq!(body["identity_provider"], "local");
        assert_eq!(body["company"], "Corp");
        assert_eq!(body["roles"][0], "admin");
    }
}

#[tokio::test]
async fn test_required_auth_missing_token_is_401() {
    let mock_server = MockServer::start().await;
    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let response = app.oneshot(get_request("/me", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "AUTHENTICATION_REQUIRED");
    assert_eq!(body["error"]["action"], "reauthenticate");
}

#[tokio::test]
async fn test_required_auth_expired_token_is_expired_kind() {
    let mock_server = MockServer::start().await;
    mock_jwks_once(&mock_server).await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let mut claims = user_claims();
    claims.exp = Some(Utc::now().timestamp() - 4000);
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "EXPIRED_TOKEN");
}

#[tokio::test]
async fn test_required_auth_tampered_signature_is_invalid_signature() {
    let mock_server = MockServer::start().await;
    mock_jwks_once(&mock_server).await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    // signed by a key the trust domain never published, claiming key-a
    let token = sign(&user_claims(), RSA_PEM_B, "key-a");

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn test_required_auth_key_source_down_is_503_with_retry_after() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let token = sign(&user_claims(), RSA_PEM_A, "key-a");
    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok()),
        Some("30")
    );
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "KEY_SOURCE_UNAVAILABLE");
    assert_eq!(body["error"]["retry_after_seconds"], 30);
}

#[tokio::test]
async fn test_optional_auth_never_rejects() {
    let mock_server = MockServer::start().await;
    mock_jwks_once(&mock_server).await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    // anonymous
    let response = app
        .clone()
        .oneshot(get_request("/feed", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // invalid token still passes through
    let response = app
        .clone()
        .oneshot(get_request("/feed", Some("garbage")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // valid token attaches the identity
    let token = sign(&user_claims(), RSA_PEM_A, "key-a");
    let response = app
        .oneshot(get_request("/feed", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_role_guard_denies_and_reports_allow_list() {
    let mock_server = MockServer::start().await;
    mock_jwks_once(&mock_server).await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let mut claims = user_claims();
    claims
        .extra
        .insert("roles".to_string(), serde_json::json!(["user"]));
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app
        .oneshot(get_request("/admin", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INSUFFICIENT_PERMISSIONS");
    assert_eq!(body["error"]["required"][0], "admin");
    assert_eq!(body["error"]["provided"][0], "user");
    assert_eq!(body["error"]["action"], "contact_administrator");
}

#[tokio::test]
async fn test_role_guard_allows_admin() {
    let mock_server = MockServer::start().await;
    mock_jwks_once(&mock_server).await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let mut claims = user_claims();
    claims
        .extra
        .insert("roles".to_string(), serde_json::json!(["admin"]));
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app
        .oneshot(get_request("/admin", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_google_bridged_token_normalizes_provider_fields() {
    let mock_server = MockServer::start().await;
    mock_jwks_once(&mock_server).await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let mut claims = user_claims();
    claims
        .extra
        .insert("idp".to_string(), serde_json::json!("google.com"));
    claims
        .extra
        .insert("hd".to_string(), serde_json::json!("x.com"));
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["identity_provider"], "google.com");
    assert_eq!(body["company"], "x.com");
    assert_eq!(body["email_verified"], false);
}
