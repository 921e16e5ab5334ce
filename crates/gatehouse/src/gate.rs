//! Request-level authentication gate.
//!
//! [`AuthGate`] composes the validator and the identity normalizer into
//! the guard behaviors requests are built on: required auth, optional
//! auth, and the role / company / verified-email restrictions. Every
//! failure leaves this module as exactly one [`ClassifiedError`]; no raw
//! error type crosses the boundary.

use common::types::RequestContext;
use std::sync::Arc;

use crate::config::ProviderPolicy;
use crate::errors::{AuthFailure, ClassifiedError, PermissionRequirement};
use crate::identity::{self, CanonicalIdentity};
use crate::jwks::KeySource;
use crate::key_cache::KeyCache;
use crate::observability::metrics;
use crate::validator::TokenValidator;

/// The engine's request-level entry point.
pub struct AuthGate {
    validator: TokenValidator,
}

impl AuthGate {
    /// Build a gate for one trust domain, wiring the key cache to the
    /// given source with the policy's TTL.
    #[must_use]
    pub fn new(policy: ProviderPolicy, source: Arc<dyn KeySource>) -> Self {
        let cache = Arc::new(KeyCache::new(source, policy.key_ttl));
        Self {
            validator: TokenValidator::new(policy, cache),
        }
    }

    /// Build a gate over an existing validator (shared cache setups).
    #[must_use]
    pub fn with_validator(validator: TokenValidator) -> Self {
        Self { validator }
    }

    /// Authenticate a request that requires an identity.
    ///
    /// # Errors
    ///
    /// - `AuthenticationRequired` when no token is presented
    /// - the classified pipeline error for any invalid token
    pub async fn authenticate_required(
        &self,
        token: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<CanonicalIdentity, ClassifiedError> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            metrics::record_guard_decision("required", "rejected");
            return Err(ClassifiedError::classify(AuthFailure::MissingToken, ctx));
        };

        match self.run_pipeline(token, ctx).await {
            Ok(identity) => {
                metrics::record_guard_decision("required", "allowed");
                Ok(identity)
            }
            Err(failure) => {
                metrics::record_guard_decision("required", "rejected");
                Err(ClassifiedError::classify(failure, ctx))
            }
        }
    }

    /// Authenticate a request where identity is optional.
    ///
    /// Never fails: a missing or invalid token yields no identity, and
    /// the failure is recorded for observability only.
    pub async fn authenticate_optional(
        &self,
        token: Option<&str>,
        ctx: &RequestContext,
    ) -> Option<CanonicalIdentity> {
        let token = token.map(str::trim).filter(|t| !t.is_empty())?;

        match self.run_pipeline(token, ctx).await {
            Ok(identity) => {
                metrics::record_guard_decision("optional", "allowed");
                Some(identity)
            }
            Err(failure) => {
                metrics::record_guard_decision("optional", "rejected");
                // classification still runs so the failure is logged with
                // a request id, then the error is deliberately dropped
                let classified = ClassifiedError::classify(failure, ctx);
                tracing::debug!(
                    target: "gatehouse.gate",
                    kind = classified.kind.code(),
                    request_id = %classified.request_id,
                    "Optional authentication failed, continuing without identity"
                );
                None
            }
        }
    }

    async fn run_pipeline(
        &self,
        token: &str,
        ctx: &RequestContext,
    ) -> Result<CanonicalIdentity, AuthFailure> {
        let claims = self.validator.validate(token, ctx).await?;
        identity::normalize(&claims)
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("validator", &self.validator)
            .finish()
    }
}

// =============================================================================
// Authorization Guards
// =============================================================================

/// Require the identity to hold at least one of the allowed roles.
///
/// # Errors
///
/// `InsufficientPermissions` carrying the allow-list and the identity's
/// actual roles.
pub fn authorize_roles<S: AsRef<str>>(
    identity: &CanonicalIdentity,
    allowed: &[S],
    ctx: &RequestContext,
) -> Result<(), ClassifiedError> {
    let permitted = allowed.iter().any(|role| identity.has_role(role.as_ref()));
    if permitted {
        metrics::record_guard_decision("roles", "allowed");
        return Ok(());
    }

    metrics::record_guard_decision("roles", "rejected");
    Err(ClassifiedError::classify(
        AuthFailure::NotPermitted {
            requirement: PermissionRequirement::Roles {
                required: allowed.iter().map(|s| s.as_ref().to_string()).collect(),
                provided: identity.roles.iter().cloned().collect(),
            },
        },
        ctx,
    ))
}

/// Require the identity's company to be on the allow-list.
///
/// # Errors
///
/// `InsufficientPermissions` carrying the allow-list and the identity's
/// actual company.
pub fn authorize_companies<S: AsRef<str>>(
    identity: &CanonicalIdentity,
    allowed: &[S],
    ctx: &RequestContext,
) -> Result<(), ClassifiedError> {
    let permitted = identity
        .company
        .as_deref()
        .is_some_and(|company| allowed.iter().any(|a| a.as_ref() == company));
    if permitted {
        metrics::record_guard_decision("companies", "allowed");
        return Ok(());
    }

    metrics::record_guard_decision("companies", "rejected");
    Err(ClassifiedError::classify(
        AuthFailure::NotPermitted {
            requirement: PermissionRequirement::Companies {
                required: allowed.iter().map(|s| s.as_ref().to_string()).collect(),
                provided: identity.company.iter().cloned().collect(),
            },
        },
        ctx,
    ))
}

/// Require a verified email address.
///
/// # Errors
///
/// `InsufficientPermissions` with guidance directing the user to verify
/// their email.
pub fn require_verified_email(
    identity: &CanonicalIdentity,
    ctx: &RequestContext,
) -> Result<(), ClassifiedError> {
    if identity.email_verified {
        metrics::record_guard_decision("verified_email", "allowed");
        return Ok(());
    }

    metrics::record_guard_decision("verified_email", "rejected");
    Err(ClassifiedError::classify(
        AuthFailure::NotPermitted {
            requirement: PermissionRequirement::VerifiedEmail,
        },
        ctx,
    ))
}

// =============================================================================
// Tests
// =============================================================================
