//! Clock-tolerance configuration scenarios.
//!
//! These validate that a custom tolerance propagates through the whole
//! pipeline, as boundary pairs: one token just inside the window, one
//! just beyond it.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use chrono::Utc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{
    app, body_json, gate, get_request, jwks_body, policy, sign, user_claims, RSA_N_A, RSA_PEM_A,
};

async fn mock_jwks(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[("key-a", RSA_N_A)])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_custom_tolerance_accepts_expiry_within_window() {
    let mock_server = MockServer::start().await;
    mock_jwks(&mock_server).await;

    let policy = policy(&format!("{}/keys", mock_server.uri()))
        .with_clock_tolerance(Duration::from_secs(60));
    let app = app(&gate(policy));

    // expired 30 seconds ago: inside the 60 second window
    let mut claims = user_claims();
    claims.exp = Some(Utc::now().timestamp() - 30);
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_custom_tolerance_rejects_expiry_beyond_window() {
    let mock_server = MockServer::start().await;
    mock_jwks(&mock_server).await;

    let policy = policy(&format!("{}/keys", mock_server.uri()))
        .with_clock_tolerance(Duration::from_secs(60));
    let app = app(&gate(policy));

    // expired 90 seconds ago: beyond the 60 second window
    let mut claims = user_claims();
    claims.exp = Some(Utc::now().timestamp() - 90);
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "EXPIRED_TOKEN");
}

#[tokio::test]
async fn test_custom_tolerance_accepts_nbf_within_window() {
    let mock_server = MockServer::start().await;
    mock_jwks(&mock_server).await;

    let policy = policy(&format!("{}/keys", mock_server.uri()))
        .with_clock_tolerance(Duration::from_secs(60));
    let app = app(&gate(policy));

    // not valid for another 30 seconds: inside the window
    let mut claims = user_claims();
    claims.nbf = Some(Utc::now().timestamp() + 30);
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_custom_tolerance_rejects_nbf_beyond_window() {
    let mock_server = MockServer::start().await;
    mock_jwks(&mock_server).await;

    let policy = policy(&format!("{}/keys", mock_server.uri()))
        .with_clock_tolerance(Duration::from_secs(60));
    let app = app(&gate(policy));

    // not valid for another 90 seconds: beyond the window
    let mut claims = user_claims();
    claims.nbf = Some(Utc::now().timestamp() + 90);
    let token = sign(&claims, RSA_PEM_A, "key-a");

    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "TOKEN_NOT_YET_VALID");
}
