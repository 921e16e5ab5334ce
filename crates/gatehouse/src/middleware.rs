//! Axum middleware adapters for the authentication gate.
//!
//! These adapters do the transport-facing work: pull the bearer token and
//! diagnostic context out of the request, run the gate, and attach the
//! resulting [`CanonicalIdentity`] to the request extensions for
//! downstream handlers. Restriction middlewares compose on top of
//! `require_auth` and read the identity back out of the extensions.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header::{AUTHORIZATION, USER_AGENT},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use common::types::RequestContext;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::errors::{AuthFailure, ClassifiedError};
use crate::gate::{authorize_companies, authorize_roles, require_verified_email, AuthGate};
use crate::identity::CanonicalIdentity;

/// Correlation id header honored when the transport supplies one.
const REQUEST_ID_HEADER: &str = "x-request-id";

// =============================================================================
// Extraction Helpers
// =============================================================================

/// Pull the bearer token out of the Authorization header, if any.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(ToString::to_string)
}

/// Build the diagnostic context for a request.
#[must_use]
pub fn context_from_request(req: &Request) -> RequestContext {
    let headers = req.headers();
    RequestContext {
        request_id: headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        caller_ip: req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string()),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string),
        endpoint: Some(req.uri().path().to_string()),
        method: Some(req.method().to_string()),
    }
}

// =============================================================================
// Authentication Middleware
// =============================================================================

/// Require a valid identity; rejects the request otherwise.
///
/// On success the [`CanonicalIdentity`] and the [`RequestContext`] are
/// inserted into the request extensions.
///
/// # Errors
///
/// The classified pipeline error, rendered by `ClassifiedError`'s
/// `IntoResponse`.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ClassifiedError> {
    let ctx = context_from_request(&req);
    let token = bearer_token(req.headers());

    let identity = gate.authenticate_required(token.as_deref(), &ctx).await?;

    req.extensions_mut().insert(identity);
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Attach an identity when a valid token is presented; never rejects.
pub async fn optional_auth(
    State(gate): State<Arc<AuthGate>>,
    mut req: Request,
    next: Next,
) -> Response {
    let ctx = context_from_request(&req);
    let token = bearer_token(req.headers());

    if let Some(identity) = gate.authenticate_optional(token.as_deref(), &ctx).await {
        req.extensions_mut().insert(identity);
    }
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

// =============================================================================
// Restriction Middleware
// =============================================================================

/// Role allow-list for [`restricted_to_roles`].
#[derive(Clone)]
pub struct RoleRestriction(Arc<[String]>);

impl RoleRestriction {
    /// Allow any of the given roles.
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }
}

/// Company allow-list for [`restricted_to_companies`].
#[derive(Clone)]
pub struct CompanyRestriction(Arc<[String]>);

impl CompanyRestriction {
    /// Allow any of the given companies.
    pub fn new<I, S>(companies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(companies.into_iter().map(Into::into).collect())
    }
}

/// Reject unless the authenticated identity holds one of the allowed
/// roles. Must run after [`require_auth`].
///
/// # Errors
///
/// `AuthenticationRequired` when no identity was attached;
/// `InsufficientPermissions` when the roles do not match.
pub async fn restricted_to_roles(
    State(restriction): State<RoleRestriction>,
    req: Request,
    next: Next,
) -> Result<Response, ClassifiedError> {
    let ctx = attached_context(&req);
    let identity = attached_identity(&req, &ctx)?;
    authorize_roles(&identity, &restriction.0, &ctx)?;
    Ok(next.run(req).await)
}

/// Reject unless the authenticated identity belongs to one of the
/// allowed companies. Must run after [`require_auth`].
///
/// # Errors
///
/// `AuthenticationRequired` when no identity was attached;
/// `InsufficientPermissions` when the company does not match.
pub async fn restricted_to_companies(
    State(restriction): State<CompanyRestriction>,
    req: Request,
    next: Next,
) -> Result<Response, ClassifiedError> {
    let ctx = attached_context(&req);
    let identity = attached_identity(&req, &ctx)?;
    authorize_companies(&identity, &restriction.0, &ctx)?;
    Ok(next.run(req).await)
}

/// Reject unless the authenticated identity's email is verified. Must
/// run after [`require_auth`].
///
/// # Errors
///
/// `AuthenticationRequired` when no identity was attached;
/// `InsufficientPermissions` with email-verification guidance otherwise.
pub async fn verified_email_required(
    req: Request,
    next: Next,
) -> Result<Response, ClassifiedError> {
    let ctx = attached_context(&req);
    let identity = attached_identity(&req, &ctx)?;
    require_verified_email(&identity, &ctx)?;
    Ok(next.run(req).await)
}

fn attached_context(req: &Request) -> RequestContext {
    req.extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_else(|| context_from_request(req))
}

fn attached_identity(
    req: &Request,
    ctx: &RequestContext,
) -> Result<CanonicalIdentity, ClassifiedError> {
    req.extensions()
        .get::<CanonicalIdentity>()
        .cloned()
        .ok_or_else(|| ClassifiedError::classify(AuthFailure::MissingToken, ctx))
}

// =============================================================================
// Tests
// =============================================================================
