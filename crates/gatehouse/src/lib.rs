//! Gatehouse: token verification and identity normalization for
//! federated sign-in.
//!
//! The engine authenticates HTTP requests against JWTs issued by a
//! managed directory and the providers federated through it. One
//! policy-parameterized pipeline covers every provider:
//!
//! - [`jwks`] / [`key_cache`] fetch and cache the trust domain's signing
//!   keys (single-flight refresh, stale-serve on source outage)
//! - [`validator`] pins the algorithm, verifies the signature, and
//!   enforces issuer / audience / lifetime policy with clock tolerance
//! - [`identity`] normalizes provider-specific claims into one
//!   [`CanonicalIdentity`]
//! - [`errors`] classifies every failure into a closed taxonomy with an
//!   HTTP status, user-facing guidance, and retry semantics
//! - [`gate`] and [`middleware`] compose the pieces into required,
//!   optional, role-restricted, company-restricted, and verified-email
//!   guards
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gatehouse::{AuthGate, HttpKeySource, ProviderPolicy};
//!
//! # fn main() -> Result<(), gatehouse::KeySourceFailure> {
//! let policy = ProviderPolicy::new(
//!     "https://login.example.com/tenant/v2.0/",
//!     "portal-client",
//!     "https://login.example.com/tenant/discovery/v2.0/keys",
//! );
//! let source = Arc::new(HttpKeySource::new(
//!     policy.jwks_url.clone(),
//!     policy.fetch_timeout,
//! )?);
//! let gate = Arc::new(AuthGate::new(policy, source));
//! // wire `gate` into axum with gatehouse::middleware::require_auth
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]

/// Module for per-trust-domain validation policy
pub mod config;

/// Module for failure classification and the wire error contract
pub mod errors;

/// Module for the request-level authentication gate and guards
pub mod gate;

/// Module for canonical identity normalization
pub mod identity;

/// Module for signing-key discovery (JWKS)
pub mod jwks;

/// Module for cached key resolution
pub mod key_cache;

/// Module for axum middleware adapters
pub mod middleware;

/// Module for metrics recording
pub mod observability;

/// Module for policy-parameterized token validation
pub mod validator;

#[cfg(test)]
mod testutil;

pub use config::{ConfigError, ProviderPolicy};
pub use errors::{AuthFailure, ClassifiedError, ErrorKind, PermissionRequirement};
pub use gate::{authorize_companies, authorize_roles, require_verified_email, AuthGate};
pub use identity::{normalize, CanonicalIdentity};
pub use jwks::{HttpKeySource, JsonWebKey, JwksDocument, KeySource, KeySourceFailure, SigningKey};
pub use key_cache::KeyCache;
pub use validator::{Claims, TokenValidator};
