//! Raw JWT handling shared across Gatehouse components.
//!
//! This module covers everything that happens to a token BEFORE any
//! cryptographic verification:
//! - Size limits for DoS prevention
//! - Clock tolerance constants for temporal claim checks
//! - Unverified header extraction (key id, algorithm, type)
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Header extraction never validates a signature; the extracted key id
//!   is only trusted as a lookup handle into a trusted key set
//! - Error display messages are intentionally generic to prevent
//!   information leakage; details are logged at debug level only

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// This limit prevents denial-of-service attacks via oversized tokens.
/// JWTs larger than this are rejected BEFORE any base64 decode or
/// cryptographic operation.
///
/// Directory-issued tokens with a full set of extension attributes run
/// 1-2KB; 8KB leaves generous headroom without allowing abuse.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock tolerance for temporal claim checks (5 minutes).
///
/// Absorbs clock drift between the token issuer and this verifier when
/// checking `exp` and `nbf`.
pub const DEFAULT_CLOCK_TOLERANCE: Duration = Duration::from_secs(300);

/// Maximum allowed clock tolerance (10 minutes).
///
/// Prevents misconfiguration that would weaken expiry enforcement by
/// accepting an excessively large drift window.
pub const MAX_CLOCK_TOLERANCE: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while handling a raw, unverified token.
///
/// Display messages are uniform on purpose: the caller must not be able
/// to distinguish failure modes from the response body alone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RawTokenError {
    /// Token size exceeds the maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not structurally a JWT (segments, base64, or header JSON).
    #[error("The access token is invalid or expired")]
    MalformedToken,

    /// Token header carries no usable `kid`.
    #[error("The access token is invalid or expired")]
    MissingKeyId,
}

// =============================================================================
// Header Types
// =============================================================================

/// The unverified JOSE header of a token, decoded for key selection only.
///
/// Derived transiently from the raw token and discarded once the signing
/// key has been resolved. Nothing in it is trusted for security decisions
/// except as input to algorithm pinning and key lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct DecodedHeader {
    /// Key id selecting the published verification key.
    pub kid: String,

    /// Algorithm the token claims to be signed with. The validator pins
    /// this against a single allowed value; it is never trusted beyond
    /// that comparison.
    pub alg: String,

    /// Declared token type, when present (`"JWT"` for every provider we
    /// federate with).
    #[serde(default)]
    pub typ: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Decode a token's header without verifying the signature.
///
/// Used to select the verification key (`kid`) and to pin the algorithm
/// before any cryptographic work happens.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - The signature is NOT validated here; the token MUST still be
///   verified against the resolved key
///
/// # Errors
///
/// - [`RawTokenError::TokenTooLarge`] - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - [`RawTokenError::MalformedToken`] - not three segments, bad base64,
///   or header is not valid JSON
/// - [`RawTokenError::MissingKeyId`] - header `kid` absent, empty, or not
///   a string
pub fn decode_header(token: &str) -> Result<DecodedHeader, RawTokenError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(RawTokenError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut segments = token.split('.');
    let header_part = segments.next().ok_or(RawTokenError::MalformedToken)?;
    if segments.count() != 2 {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(RawTokenError::MalformedToken);
    }

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        RawTokenError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        RawTokenError::MalformedToken
    })?;

    // kid and alg are extracted by hand so a missing kid and a missing alg
    // can be told apart; empty strings are rejected outright
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(RawTokenError::MissingKeyId)?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(RawTokenError::MalformedToken)?;

    let typ = header
        .get("typ")
        .and_then(|v| v.as_str())
        .map(ToString::to_string);

    Ok(DecodedHeader { kid, alg, typ })
}

// =============================================================================
// Tests
// =============================================================================
