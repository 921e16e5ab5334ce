//! Policy-parameterized token validation.
//!
//! One validator serves every federated provider; provider differences
//! live in the [`ProviderPolicy`] and in the identity normalizer's
//! claim-mapping table, not in separate code paths.
//!
//! Validation is a sequence of hard gates; failing one aborts
//! immediately with no partial success:
//!
//! 1. size gate and structural header decode (no signature work yet)
//! 2. algorithm pinning (the token's own `alg` is never trusted beyond
//!    this comparison; `none` and everything unpinned dies here)
//! 3. key resolution via the key cache
//! 4. signature verification
//! 5. issuer / audience / lifetime checks per policy, with clock
//!    tolerance
//!
//! The validator only reads shared state (the key cache); it performs no
//! writes and no retries.

use chrono::Utc;
use common::{jwt, types::RequestContext};
use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ProviderPolicy;
use crate::errors::AuthFailure;
use crate::key_cache::KeyCache;
use crate::observability::metrics;

// =============================================================================
// Claims
// =============================================================================

/// Verified token claims.
///
/// Registered claims are typed; everything provider-specific stays in
/// `extra` for the identity normalizer. The `sub` field contains a user
/// identifier and is redacted in Debug output.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Subject (user identifier) - redacted in Debug output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience; providers emit either a string or an array.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds). Not every federated
    /// provider emits one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Provider-specific claims (idp discriminator, emails, extension
    /// attributes, and so on).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// A provider-specific claim by name.
    #[must_use]
    pub fn extra(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }

    /// A provider-specific string claim by name.
    #[must_use]
    pub fn str_extra(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(|v| v.as_str())
    }

    /// A provider-specific boolean claim by name.
    #[must_use]
    pub fn bool_extra(&self, name: &str) -> Option<bool> {
        self.extra.get(name).and_then(serde_json::Value::as_bool)
    }
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("iss", &self.iss)
            .field("sub", &"[REDACTED]")
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("iat", &self.iat)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Verifies raw tokens for one trust domain.
pub struct TokenValidator {
    policy: ProviderPolicy,
    keys: Arc<KeyCache>,
}

impl TokenValidator {
    /// Create a validator over a policy and its trust domain's key cache.
    #[must_use]
    pub fn new(policy: ProviderPolicy, keys: Arc<KeyCache>) -> Self {
        Self { policy, keys }
    }

    /// The policy this validator enforces.
    #[must_use]
    pub fn policy(&self) -> &ProviderPolicy {
        &self.policy
    }

    /// Validate a raw token and return its verified claims.
    ///
    /// # Errors
    ///
    /// Returns the pipeline [`AuthFailure`] for the first gate the token
    /// fails; the authentication gate classifies it at the boundary.
    pub async fn validate(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<Claims, AuthFailure> {
        let started = Instant::now();
        let result = self.validate_inner(token).await;

        match &result {
            Ok(_) => metrics::record_token_validation("success", None, started.elapsed()),
            Err(failure) => {
                metrics::record_token_validation(
                    "error",
                    Some(failure.category()),
                    started.elapsed(),
                );
                tracing::debug!(
                    target: "gatehouse.validator",
                    request_id = ctx.request_id.as_deref().unwrap_or("-"),
                    error = %failure,
                    "Token rejected"
                );
            }
        }

        result
    }

    async fn validate_inner(&self, token: &str) -> Result<Claims, AuthFailure> {
        // Structural gates before any cryptography
        let header = jwt::decode_header(token)?;

        // The token's alg claim is only ever compared against the pinned
        // algorithm; "none" fails to parse and dies here too
        match header.alg.parse::<Algorithm>() {
            Ok(alg) if alg == self.policy.algorithm => {}
            _ => {
                return Err(AuthFailure::AlgorithmRejected { alg: header.alg });
            }
        }

        let key = self.keys.resolve(&header.kid).await?;

        let validation = self.policy.to_validation();
        let data = jsonwebtoken::decode::<Claims>(token, key.decoding_key(), &validation)
            .map_err(|e| AuthFailure::from_jwt_error(&e))?;

        if self.policy.validate_lifetime {
            check_not_before(
                data.claims.nbf,
                Utc::now().timestamp(),
                self.policy.clock_tolerance,
            )?;
        }

        Ok(data.claims)
    }
}

impl fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenValidator")
            .field("issuer", &self.policy.issuer)
            .field("audience", &self.policy.audience)
            .finish_non_exhaustive()
    }
}

/// Enforce `nbf` against an explicit `now`, with clock tolerance.
///
/// Delegating `nbf` to the JWT library would reject tokens from providers
/// that never emit the claim, so it is checked here and only when
/// present. Kept deterministic so boundary conditions can be unit-tested
/// without wall-clock dependence.
fn check_not_before(
    nbf: Option<i64>,
    now: i64,
    tolerance: Duration,
) -> Result<(), AuthFailure> {
    let Some(nbf) = nbf else {
        return Ok(());
    };

    // Safe cast: tolerance is capped at MAX_CLOCK_TOLERANCE (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let tolerance_secs = tolerance.as_secs() as i64;

    if nbf > now + tolerance_secs {
        tracing::debug!(
            target: "gatehouse.validator",
            nbf,
            now,
            tolerance_secs,
            "Token rejected: not valid yet"
        );
        return Err(AuthFailure::NotYetValid);
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
