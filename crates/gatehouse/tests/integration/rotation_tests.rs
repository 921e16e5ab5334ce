//! Key rotation and key-source degradation scenarios.
//!
//! Tests follow the convention: `test_<feature>_<scenario>_<expected_result>`

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use axum::http::StatusCode;
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::support::{
    app, body_json, gate, get_request, jwks_body, policy, sign, user_claims, RSA_N_A, RSA_N_B,
    RSA_PEM_A, RSA_PEM_B,
};

#[tokio::test]
async fn test_rotation_new_kid_triggers_refresh_and_succeeds() {
    let mock_server = MockServer::start().await;

    // first fetch publishes key-a; every later fetch publishes key-b only
    let fetches = Arc::new(AtomicU32::new(0));
    let fetches_clone = Arc::clone(&fetches);
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(move |_: &wiremock::Request| {
            let n = fetches_clone.fetch_add(1, Ordering::SeqCst);
            let body = if n == 0 {
                jwks_body(&[("key-a", RSA_N_A)])
            } else {
                jwks_body(&[("key-b", RSA_N_B)])
            };
            ResponseTemplate::new(200).set_body_json(body)
        })
        .mount(&mock_server)
        .await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    // pre-rotation token verifies against the first key set
    let old_token = sign(&user_claims(), RSA_PEM_A, "key-a");
    let response = app
        .clone()
        .oneshot(get_request("/me", Some(&old_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    // rotated token: unknown kid forces a refresh, then verifies
    let new_token = sign(&user_claims(), RSA_PEM_B, "key-b");
    let response = app
        .clone()
        .oneshot(get_request("/me", Some(&new_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetches.load(Ordering::SeqCst), 2);

    // the rotated-out key is gone for good
    let response = app
        .oneshot(get_request("/me", Some(&old_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "KEY_NOT_FOUND");
}

#[tokio::test]
async fn test_stale_key_set_served_during_source_outage() {
    let mock_server = MockServer::start().await;

    // one good fetch, then the source goes down
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(&[("key-a", RSA_N_A)])))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    // zero TTL forces a refresh attempt on every resolution
    let gate = gate(policy(&format!("{}/keys", mock_server.uri())).with_key_ttl(Duration::ZERO));
    let app = app(&gate);

    let token = sign(&user_claims(), RSA_PEM_A, "key-a");

    let response = app
        .clone()
        .oneshot(get_request("/me", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // the refresh now fails, but the previously known key still verifies
    let response = app.oneshot(get_request("/me", Some(&token))).await.unwrap();
    assert_eq!(
        response.status(),
        StatusCode::OK,
        "stale key set must be served while the source is down"
    );
}

#[tokio::test]
async fn test_concurrent_cold_requests_share_one_fetch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(jwks_body(&[("key-a", RSA_N_A)]))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let gate = gate(policy(&format!("{}/keys", mock_server.uri())));
    let app = app(&gate);

    let token = sign(&user_claims(), RSA_PEM_A, "key-a");

    let requests: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            let token = token.clone();
            tokio::spawn(async move { app.oneshot(get_request("/me", Some(&token))).await })
        })
        .collect();

    for result in join_all(requests).await {
        let response = result.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    // the .expect(1) on the mock asserts the coalescing on drop
}
