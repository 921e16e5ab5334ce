//! Signing-key discovery for a trust domain.
//!
//! A [`KeySource`] yields the current set of published verification keys.
//! The production implementation, [`HttpKeySource`], fetches a JWKS
//! document (RFC 7517) over HTTPS and converts its RSA signature entries
//! into ready-to-use decoding keys. Entries that cannot be used (missing
//! kid, wrong key type, undecodable components) are skipped with a debug
//! log rather than failing the whole set, since providers routinely
//! publish encryption keys alongside signature keys.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::DEFAULT_CONNECT_TIMEOUT;

// =============================================================================
// Error Types
// =============================================================================

/// Why a key-source fetch failed.
#[derive(Error, Debug, Clone)]
pub enum KeySourceFailure {
    /// The request could not be sent or timed out.
    #[error("key source transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("key source returned status {0}")]
    Status(u16),

    /// The response body was not a usable JWKS document.
    #[error("key source document invalid: {0}")]
    Decode(String),
}

// =============================================================================
// Key Types
// =============================================================================

/// One verification key published by a trust domain.
///
/// Immutable once built; the key cache replaces whole sets, never
/// individual entries.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    algorithm: Algorithm,
    key: Arc<DecodingKey>,
}

impl SigningKey {
    /// Build a signing key from RSA public components (base64url modulus
    /// and exponent, as published in a JWK).
    ///
    /// # Errors
    ///
    /// Returns `KeySourceFailure::Decode` when the components are not a
    /// valid RSA public key.
    pub fn from_rsa_components(
        kid: impl Into<String>,
        algorithm: Algorithm,
        modulus: &str,
        exponent: &str,
    ) -> Result<Self, KeySourceFailure> {
        let key = DecodingKey::from_rsa_components(modulus, exponent)
            .map_err(|e| KeySourceFailure::Decode(format!("invalid RSA components: {e}")))?;
        Ok(Self {
            kid: kid.into(),
            algorithm,
            key: Arc::new(key),
        })
    }

    /// Key id, as published.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm the key verifies.
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The decoding key for signature verification.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // DecodingKey holds no Debug impl and the material is not ours to print
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

// =============================================================================
// Key Source
// =============================================================================

/// Source of the current published key set for one trust domain.
///
/// Injected into the key cache so tests can substitute deterministic
/// fakes and assert coalescing and staleness behavior.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Fetch the full current key set.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceFailure` when the set cannot be obtained; the
    /// cache decides whether a stale set can still be served.
    async fn fetch_keys(&self) -> Result<Vec<SigningKey>, KeySourceFailure>;
}

// =============================================================================
// JWKS Document
// =============================================================================

/// A JWKS document as served by the trust domain.
#[derive(Debug, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<JsonWebKey>,
}

/// One JWK entry. Only RSA signature keys are converted; everything else
/// is skipped.
#[derive(Debug, Deserialize)]
pub struct JsonWebKey {
    #[serde(default)]
    pub kid: Option<String>,
    pub kty: String,
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default, rename = "use")]
    pub use_: Option<String>,
    #[serde(default)]
    pub n: Option<String>,
    #[serde(default)]
    pub e: Option<String>,
}

impl JsonWebKey {
    /// Convert this entry into a [`SigningKey`], or `None` when the entry
    /// is not a usable RSA signature key.
    #[must_use]
    pub fn to_signing_key(&self) -> Option<SigningKey> {
        let kid = self.kid.as_deref().filter(|k| !k.is_empty())?;

        if self.kty != "RSA" {
            tracing::debug!(target: "gatehouse.jwks", kid, kty = %self.kty, "Skipping non-RSA key");
            return None;
        }
        if let Some(use_) = &self.use_ {
            if use_ != "sig" {
                tracing::debug!(target: "gatehouse.jwks", kid, key_use = %use_, "Skipping non-signature key");
                return None;
            }
        }

        let algorithm = match self.alg.as_deref() {
            None | Some("RS256") => Algorithm::RS256,
            Some("RS384") => Algorithm::RS384,
            Some("RS512") => Algorithm::RS512,
            Some(other) => {
                tracing::debug!(target: "gatehouse.jwks", kid, alg = other, "Skipping key with unsupported algorithm");
                return None;
            }
        };

        let (n, e) = match (self.n.as_deref(), self.e.as_deref()) {
            (Some(n), Some(e)) => (n, e),
            _ => {
                tracing::debug!(target: "gatehouse.jwks", kid, "Skipping RSA key without modulus/exponent");
                return None;
            }
        };

        match SigningKey::from_rsa_components(kid, algorithm, n, e) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::debug!(target: "gatehouse.jwks", kid, error = %err, "Skipping undecodable key");
                None
            }
        }
    }
}

// =============================================================================
// HTTP Key Source
// =============================================================================

/// Fetches a trust domain's JWKS endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    http_client: reqwest::Client,
    url: String,
}

impl HttpKeySource {
    /// Build an HTTP key source with a bounded fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns `KeySourceFailure::Transport` when the HTTP client cannot
    /// be constructed.
    pub fn new(url: impl Into<String>, fetch_timeout: Duration) -> Result<Self, KeySourceFailure> {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| KeySourceFailure::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl KeySource for HttpKeySource {
    async fn fetch_keys(&self) -> Result<Vec<SigningKey>, KeySourceFailure> {
        tracing::debug!(target: "gatehouse.jwks", url = %self.url, "Fetching key set");

        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(target: "gatehouse.jwks", error = %e, "Key set request failed");
                KeySourceFailure::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                target: "gatehouse.jwks",
                url = %self.url,
                status = %status,
                "Key source returned non-success status"
            );
            return Err(KeySourceFailure::Status(status.as_u16()));
        }

        let document: JwksDocument = response.json().await.map_err(|e| {
            tracing::warn!(target: "gatehouse.jwks", error = %e, "Failed to parse key set document");
            KeySourceFailure::Decode(e.to_string())
        })?;

        let keys: Vec<SigningKey> = document
            .keys
            .iter()
            .filter_map(JsonWebKey::to_signing_key)
            .collect();

        tracing::debug!(
            target: "gatehouse.jwks",
            published = document.keys.len(),
            usable = keys.len(),
            "Key set fetched"
        );

        Ok(keys)
    }
}

// =============================================================================
// Tests
// =============================================================================
