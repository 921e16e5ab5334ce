//! Shared fixtures for unit tests: checked-in RSA keypairs, token
//! builders, and a scriptable in-memory key source.
//!
//! The RSA keys are 2048-bit test fixtures with no other use; their JWK
//! components below were derived from the same PEMs.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ProviderPolicy;
use crate::jwks::{KeySource, KeySourceFailure, SigningKey};
use crate::validator::Claims;

pub(crate) const TEST_ISSUER: &str = "https://login.example.com/tenant-42/v2.0/";
pub(crate) const TEST_AUDIENCE: &str = "portal-client";

pub(crate) const TEST_RSA_PEM_A: &str = include_str!("../tests/fixtures/test_rsa_a.pem");
pub(crate) const TEST_RSA_PEM_B: &str = include_str!("../tests/fixtures/test_rsa_b.pem");

/// JWK modulus of `TEST_RSA_PEM_A`.
pub(crate) const TEST_RSA_N_A: &str = "2ChjrwAfeV8rHWvbrpJeYChzyNrpHv4WT_WaKTDm2g-Bsyx8-8Kan3PWlOCAVXYJ428P2Jl260cXnwKD_2UBzSjtug56I1FBiNmDKoIeBzjN8ZajmlmJSKpUNYh06iDL0CHLIIXGg5_iTwqiKYN_HLrGUI7oLE78KRQqADF_RUcozrTitZcXaF7h9OI0QTAB7DnqzlPuOq1kwA04GL7bv7amRfoGQg4IuGN6DCvrLIakJFTeomXVizqugcXnsXwg_Hy0-C8Puc36VddLcJ3nUjKfOLdE6KvaUeAAI1FPrfXXNFJthAhV9PysNWqwS_4KS6MMvC46VnqlAqk2VXiHAw";

pub(crate) const TEST_RSA_E: &str = "AQAB";

/// A policy pointing at nothing routable; unit tests inject the key
/// source directly.
pub(crate) fn test_policy() -> ProviderPolicy {
    ProviderPolicy::new(TEST_ISSUER, TEST_AUDIENCE, "https://keys.invalid/jwks")
}

/// A verification key for `TEST_RSA_PEM_A` under the given kid.
pub(crate) fn test_signing_key(kid: &str) -> SigningKey {
    SigningKey::from_rsa_components(kid, Algorithm::RS256, TEST_RSA_N_A, TEST_RSA_E)
        .expect("test key components are valid")
}

/// Sign claims with an RS256 header carrying the given kid.
pub(crate) fn sign_token(claims: &Claims, pem: &str, kid: &str) -> String {
    sign_token_with_header(claims, pem, kid, "RS256")
}

/// Sign claims with an arbitrary RSA algorithm in the header.
pub(crate) fn sign_token_with_header(claims: &Claims, pem: &str, kid: &str, alg: &str) -> String {
    let algorithm: Algorithm = alg.parse().expect("test algorithm");
    let mut header = Header::new(algorithm);
    header.kid = Some(kid.to_string());

    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).expect("test signing key");
    jsonwebtoken::encode(&header, claims, &key).expect("token encodes")
}

/// In-memory key source with scriptable contents, failures, and latency.
pub(crate) struct ScriptedKeySource {
    keys: Mutex<Vec<SigningKey>>,
    failure: Mutex<Option<String>>,
    delay: Option<Duration>,
    fetch_count: AtomicU32,
}

impl ScriptedKeySource {
    pub(crate) fn new(keys: Vec<SigningKey>) -> Self {
        Self {
            keys: Mutex::new(keys),
            failure: Mutex::new(None),
            delay: None,
            fetch_count: AtomicU32::new(0),
        }
    }

    /// Delay every fetch, for coalescing and cancellation tests.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the published key set (simulates rotation).
    pub(crate) fn set_keys(&self, keys: Vec<SigningKey>) {
        *self.keys.lock().expect("keys lock") = keys;
    }

    /// Make every subsequent fetch fail.
    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().expect("failure lock") = Some(message.to_string());
    }

    /// Number of fetches attempted so far.
    pub(crate) fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for ScriptedKeySource {
    async fn fetch_keys(&self) -> Result<Vec<SigningKey>, KeySourceFailure> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().expect("failure lock").clone();
        if let Some(message) = failure {
            return Err(KeySourceFailure::Transport(message));
        }

        Ok(self.keys.lock().expect("keys lock").clone())
    }
}
