//! Per-trust-domain validation policy.
//!
//! One [`ProviderPolicy`] describes everything the engine needs to verify
//! tokens for a single identity-provider configuration: where the signing
//! keys are published, which issuer and audience values are trusted, and
//! which checks are enforced. Provider differences beyond this policy are
//! claim-mapping data in the identity normalizer, not separate code paths.

use common::jwt::{DEFAULT_CLOCK_TOLERANCE, MAX_CLOCK_TOLERANCE};
use jsonwebtoken::{Algorithm, Validation};
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default key-set TTL (24 hours).
///
/// Identity-provider key rotation is infrequent and expensive to poll.
/// Staleness tolerance deliberately favors availability; a rotated-in key
/// still triggers an immediate refresh through the unknown-kid path.
pub const DEFAULT_KEY_TTL: Duration = Duration::from_secs(86_400);

/// Default timeout for one key-source fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout for the key-source HTTP client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {detail}")]
    InvalidValue { var: String, detail: String },
}

/// Validation policy for one trust domain.
#[derive(Debug, Clone)]
pub struct ProviderPolicy {
    /// Exact expected `iss` value.
    pub issuer: String,

    /// Expected audience (the application's client id).
    pub audience: String,

    /// JWKS endpoint publishing the trust domain's signing keys.
    pub jwks_url: String,

    /// The single accepted signing algorithm. Tokens claiming any other
    /// algorithm are rejected before signature verification.
    pub algorithm: Algorithm,

    /// Permitted clock drift when checking `exp` and `nbf`.
    pub clock_tolerance: Duration,

    /// Whether to enforce the issuer check.
    pub validate_issuer: bool,

    /// Whether to enforce the audience check.
    pub validate_audience: bool,

    /// Whether to enforce `exp`/`nbf` checks.
    pub validate_lifetime: bool,

    /// Freshness window for the cached key set.
    pub key_ttl: Duration,

    /// Bound on one key-source fetch.
    pub fetch_timeout: Duration,
}

impl ProviderPolicy {
    /// Create a policy with all checks enabled and default tolerances.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            jwks_url: jwks_url.into(),
            algorithm: Algorithm::RS256,
            clock_tolerance: DEFAULT_CLOCK_TOLERANCE,
            validate_issuer: true,
            validate_audience: true,
            validate_lifetime: true,
            key_ttl: DEFAULT_KEY_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Set the clock tolerance, capped at [`MAX_CLOCK_TOLERANCE`].
    ///
    /// Values beyond the cap are clamped and logged rather than accepted,
    /// so a bad deployment value cannot silently widen the expiry window.
    #[must_use]
    pub fn with_clock_tolerance(mut self, tolerance: Duration) -> Self {
        if tolerance > MAX_CLOCK_TOLERANCE {
            tracing::warn!(
                target: "gatehouse.config",
                requested_secs = tolerance.as_secs(),
                max_secs = MAX_CLOCK_TOLERANCE.as_secs(),
                "Clock tolerance clamped to maximum"
            );
            self.clock_tolerance = MAX_CLOCK_TOLERANCE;
        } else {
            self.clock_tolerance = tolerance;
        }
        self
    }

    /// Set the key-set TTL.
    #[must_use]
    pub fn with_key_ttl(mut self, ttl: Duration) -> Self {
        self.key_ttl = ttl;
        self
    }

    /// Set the key-source fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Toggle issuer enforcement.
    #[must_use]
    pub fn with_issuer_validation(mut self, enabled: bool) -> Self {
        self.validate_issuer = enabled;
        self
    }

    /// Toggle audience enforcement.
    #[must_use]
    pub fn with_audience_validation(mut self, enabled: bool) -> Self {
        self.validate_audience = enabled;
        self
    }

    /// Toggle `exp`/`nbf` enforcement.
    #[must_use]
    pub fn with_lifetime_validation(mut self, enabled: bool) -> Self {
        self.validate_lifetime = enabled;
        self
    }

    /// Load a policy from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a required variable is missing or a
    /// value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load a policy from a map (for testing).
    ///
    /// Required: `AUTH_ISSUER`, `AUTH_CLIENT_ID`, `AUTH_JWKS_URL`.
    /// Optional: `AUTH_ALGORITHM`, `AUTH_CLOCK_TOLERANCE_SECONDS`,
    /// `AUTH_KEY_TTL_SECONDS`, `AUTH_FETCH_TIMEOUT_SECONDS`,
    /// `AUTH_VALIDATE_ISSUER`, `AUTH_VALIDATE_AUDIENCE`,
    /// `AUTH_VALIDATE_LIFETIME`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when a required variable is missing or a
    /// value fails to parse.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer = require(vars, "AUTH_ISSUER")?;
        let audience = require(vars, "AUTH_CLIENT_ID")?;
        let jwks_url = require(vars, "AUTH_JWKS_URL")?;

        let mut policy = Self::new(issuer, audience, jwks_url);

        if let Some(raw) = vars.get("AUTH_ALGORITHM") {
            policy.algorithm = parse_algorithm(raw)?;
        }
        if let Some(secs) = parse_secs(vars, "AUTH_CLOCK_TOLERANCE_SECONDS")? {
            policy = policy.with_clock_tolerance(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_secs(vars, "AUTH_KEY_TTL_SECONDS")? {
            policy.key_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(vars, "AUTH_FETCH_TIMEOUT_SECONDS")? {
            policy.fetch_timeout = Duration::from_secs(secs);
        }
        policy.validate_issuer = parse_bool(vars, "AUTH_VALIDATE_ISSUER")?.unwrap_or(true);
        policy.validate_audience = parse_bool(vars, "AUTH_VALIDATE_AUDIENCE")?.unwrap_or(true);
        policy.validate_lifetime = parse_bool(vars, "AUTH_VALIDATE_LIFETIME")?.unwrap_or(true);

        Ok(policy)
    }

    /// Build the JWT-library validation settings this policy implies.
    ///
    /// `nbf` is never delegated to the library: the validator performs an
    /// explicit post-decode check so tokens without an `nbf` claim are not
    /// rejected outright.
    #[must_use]
    pub(crate) fn to_validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = self.clock_tolerance.as_secs();
        validation.validate_nbf = false;

        if self.validate_issuer {
            validation.set_issuer(&[&self.issuer]);
        }

        if self.validate_audience {
            validation.set_audience(&[&self.audience]);
        } else {
            validation.validate_aud = false;
        }

        if !self.validate_lifetime {
            validation.validate_exp = false;
            validation.required_spec_claims.remove("exp");
        }

        validation
    }
}

fn require(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match raw {
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        other => Err(ConfigError::InvalidValue {
            var: "AUTH_ALGORITHM".to_string(),
            detail: format!("unsupported algorithm {other:?}"),
        }),
    }
}

fn parse_secs(vars: &HashMap<String, String>, name: &str) -> Result<Option<u64>, ConfigError> {
    match vars.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                var: name.to_string(),
                detail: e.to_string(),
            }),
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<Option<bool>, ConfigError> {
    match vars.get(name).map(String::as_str) {
        None => Ok(None),
        Some("true") => Ok(Some(true)),
        Some("false") => Ok(Some(false)),
        Some(other) => Err(ConfigError::InvalidValue {
            var: name.to_string(),
            detail: format!("expected true or false, got {other:?}"),
        }),
    }
}
