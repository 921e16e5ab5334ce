//! Failure classification for the authentication pipeline.
//!
//! Every failure inside the pipeline is one variant of the closed
//! [`AuthFailure`] enum. At the gate boundary it is converted, exactly
//! once, into a [`ClassifiedError`]: a member of the stable error taxonomy
//! carrying an HTTP status, user-facing message and guidance, a retry
//! policy, and a correlation id. [`ClassifiedError::classify`] is total so
//! no failure can cross the gate unclassified.
//!
//! # Security
//!
//! The classified form is safe to serialize straight to a client. The
//! original cause is retained for internal logging only and never appears
//! in the response body.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::{jwt::RawTokenError, types::RequestContext};
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Internal Failures
// =============================================================================

/// What a protected resource demanded and the caller lacked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRequirement {
    /// The caller holds none of the allowed roles.
    Roles {
        required: Vec<String>,
        provided: Vec<String>,
    },

    /// The caller's company is not on the allow-list.
    Companies {
        required: Vec<String>,
        provided: Vec<String>,
    },

    /// The caller's email address has not been verified.
    VerifiedEmail,
}

/// Internal failure raised anywhere in the validation pipeline.
///
/// Closed by design: the classifier maps every variant deterministically,
/// which is what makes [`ClassifiedError::classify`] total.
#[derive(Error, Debug)]
pub enum AuthFailure {
    #[error("no bearer token presented")]
    MissingToken,

    #[error("token failed structural checks: {detail}")]
    Malformed { detail: String },

    #[error("token algorithm {alg:?} is not accepted")]
    AlgorithmRejected { alg: String },

    #[error("signing key {kid:?} is not published by the trust domain")]
    KeyNotFound { kid: String },

    #[error("key source unavailable: {detail}")]
    KeySourceUnavailable { detail: String },

    #[error("token signature verification failed")]
    BadSignature,

    #[error("token issuer is not trusted")]
    IssuerMismatch,

    #[error("token audience does not match this application")]
    AudienceMismatch,

    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("token claims do not form a usable profile: {detail}")]
    IncompleteProfile { detail: String },

    #[error("caller does not satisfy an authorization requirement")]
    NotPermitted { requirement: PermissionRequirement },

    #[error("internal authentication error: {detail}")]
    Internal { detail: String },
}

impl From<RawTokenError> for AuthFailure {
    fn from(err: RawTokenError) -> Self {
        let detail = match err {
            RawTokenError::TokenTooLarge => "token exceeds size limit",
            RawTokenError::MalformedToken => "token is not a structurally valid JWT",
            RawTokenError::MissingKeyId => "token header carries no key id",
        };
        AuthFailure::Malformed {
            detail: detail.to_string(),
        }
    }
}

impl AuthFailure {
    /// Bounded metrics label for this failure family.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "missing_token",
            AuthFailure::Malformed { .. } | AuthFailure::AlgorithmRejected { .. } => "malformed",
            AuthFailure::KeyNotFound { .. } | AuthFailure::KeySourceUnavailable { .. } => "keys",
            AuthFailure::BadSignature => "signature",
            AuthFailure::IssuerMismatch
            | AuthFailure::AudienceMismatch
            | AuthFailure::Expired
            | AuthFailure::NotYetValid
            | AuthFailure::IncompleteProfile { .. } => "claims",
            AuthFailure::NotPermitted { .. } => "authorization",
            AuthFailure::Internal { .. } => "internal",
        }
    }

    /// Map a JWT-library error onto the closed failure set.
    ///
    /// The mapping is deterministic per library error kind; anything the
    /// library may add in the future lands on `Internal` rather than
    /// escaping unmapped.
    #[must_use]
    pub fn from_jwt_error(err: &jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind as JwtKind;

        match err.kind() {
            JwtKind::ExpiredSignature => AuthFailure::Expired,
            JwtKind::ImmatureSignature => AuthFailure::NotYetValid,
            JwtKind::InvalidSignature => AuthFailure::BadSignature,
            JwtKind::InvalidIssuer => AuthFailure::IssuerMismatch,
            JwtKind::InvalidAudience => AuthFailure::AudienceMismatch,
            JwtKind::MissingRequiredClaim(claim) => match claim.as_str() {
                "iss" => AuthFailure::IssuerMismatch,
                "aud" => AuthFailure::AudienceMismatch,
                other => AuthFailure::Malformed {
                    detail: format!("required claim {other:?} is absent"),
                },
            },
            JwtKind::InvalidToken
            | JwtKind::Base64(_)
            | JwtKind::Json(_)
            | JwtKind::Utf8(_)
            | JwtKind::InvalidAlgorithm
            | JwtKind::InvalidAlgorithmName => AuthFailure::Malformed {
                detail: err.to_string(),
            },
            _ => AuthFailure::Internal {
                detail: err.to_string(),
            },
        }
    }
}

// =============================================================================
// Taxonomy
// =============================================================================

/// The closed error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AuthenticationRequired,
    MalformedToken,
    InvalidSignature,
    ExpiredToken,
    TokenNotYetValid,
    InvalidIssuer,
    InvalidAudience,
    IncompleteProfile,
    KeyNotFound,
    KeySourceUnavailable,
    InsufficientPermissions,
    InternalError,
}

impl ErrorKind {
    /// Stable wire code for this kind.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::MalformedToken => "MALFORMED_TOKEN",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::TokenNotYetValid => "TOKEN_NOT_YET_VALID",
            Self::InvalidIssuer => "INVALID_ISSUER",
            Self::InvalidAudience => "INVALID_AUDIENCE",
            Self::IncompleteProfile => "INCOMPLETE_PROFILE",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::KeySourceUnavailable => "KEY_SOURCE_UNAVAILABLE",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this kind maps to.
    #[must_use]
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::AuthenticationRequired
            | Self::MalformedToken
            | Self::InvalidSignature
            | Self::ExpiredToken
            | Self::TokenNotYetValid
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::IncompleteProfile
            | Self::KeyNotFound => StatusCode::UNAUTHORIZED,
            Self::KeySourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InsufficientPermissions => StatusCode::FORBIDDEN,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Token failures share one generic message so
    /// the response body cannot be used to probe the verifier.
    #[must_use]
    pub fn user_message(self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "Authentication is required to access this resource.",
            Self::MalformedToken
            | Self::InvalidSignature
            | Self::ExpiredToken
            | Self::TokenNotYetValid
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::KeyNotFound => "The access token is invalid or expired.",
            Self::IncompleteProfile => "Your account profile is missing required information.",
            Self::KeySourceUnavailable => "The authentication service is temporarily unavailable.",
            Self::InsufficientPermissions => "You do not have permission to perform this action.",
            Self::InternalError => "Something went wrong while processing your request.",
        }
    }

    /// Default guidance for this kind. Permission failures override this
    /// with requirement-specific guidance at classification time.
    #[must_use]
    pub fn guidance(self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "Sign in and retry the request with a bearer token.",
            Self::MalformedToken | Self::InvalidSignature | Self::KeyNotFound => {
                "Sign in again to obtain a new access token."
            }
            Self::ExpiredToken => "Your session has expired. Sign in again to continue.",
            Self::TokenNotYetValid => "Check this device's clock, then sign in again.",
            Self::InvalidIssuer | Self::InvalidAudience => {
                "Sign in through the application's standard sign-in flow. Contact support if this persists."
            }
            Self::IncompleteProfile => {
                "Sign in again. Contact your administrator if this persists."
            }
            Self::KeySourceUnavailable => "Try again in a few moments.",
            Self::InsufficientPermissions => "Contact your administrator to request access.",
            Self::InternalError => "Try again later.",
        }
    }

    /// Retry policy label for clients.
    #[must_use]
    pub fn action(self) -> &'static str {
        match self {
            Self::AuthenticationRequired
            | Self::MalformedToken
            | Self::InvalidSignature
            | Self::ExpiredToken
            | Self::TokenNotYetValid
            | Self::InvalidIssuer
            | Self::InvalidAudience
            | Self::IncompleteProfile
            | Self::KeyNotFound => "reauthenticate",
            Self::KeySourceUnavailable | Self::InternalError => "retry",
            Self::InsufficientPermissions => "contact_administrator",
        }
    }

    /// Suggested client backoff, where one applies.
    #[must_use]
    pub fn retry_after_seconds(self) -> Option<u32> {
        match self {
            Self::KeySourceUnavailable => Some(30),
            _ => None,
        }
    }
}

// =============================================================================
// Classified Errors
// =============================================================================

/// A fully classified pipeline failure, safe to hand to an HTTP layer.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub http_status: StatusCode,
    pub user_message: &'static str,
    pub guidance: &'static str,
    pub action: &'static str,
    pub retry_after_seconds: Option<u32>,
    pub request_id: String,

    /// Allow-list a failed authorization demanded, for diagnostics.
    pub required: Option<Vec<String>>,

    /// What the caller actually held.
    pub provided: Option<Vec<String>>,

    /// Internal cause. Logged, never serialized.
    cause: String,
}

impl ClassifiedError {
    /// Classify an internal failure. Total: every [`AuthFailure`] variant
    /// maps to exactly one taxonomy member, and a request id is attached
    /// (generated if the context has none) so client response and server
    /// logs can be correlated.
    #[must_use]
    pub fn classify(failure: AuthFailure, ctx: &RequestContext) -> Self {
        let kind = match &failure {
            AuthFailure::MissingToken => ErrorKind::AuthenticationRequired,
            AuthFailure::Malformed { .. } | AuthFailure::AlgorithmRejected { .. } => {
                ErrorKind::MalformedToken
            }
            AuthFailure::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            AuthFailure::KeySourceUnavailable { .. } => ErrorKind::KeySourceUnavailable,
            AuthFailure::BadSignature => ErrorKind::InvalidSignature,
            AuthFailure::IssuerMismatch => ErrorKind::InvalidIssuer,
            AuthFailure::AudienceMismatch => ErrorKind::InvalidAudience,
            AuthFailure::Expired => ErrorKind::ExpiredToken,
            AuthFailure::NotYetValid => ErrorKind::TokenNotYetValid,
            AuthFailure::IncompleteProfile { .. } => ErrorKind::IncompleteProfile,
            AuthFailure::NotPermitted { .. } => ErrorKind::InsufficientPermissions,
            AuthFailure::Internal { .. } => ErrorKind::InternalError,
        };

        let (guidance, required, provided) = match &failure {
            AuthFailure::NotPermitted { requirement } => match requirement {
                PermissionRequirement::Roles { required, provided } => (
                    "Contact your administrator to request one of the required roles.",
                    Some(required.clone()),
                    Some(provided.clone()),
                ),
                PermissionRequirement::Companies { required, provided } => (
                    "Contact your administrator to request access for your company.",
                    Some(required.clone()),
                    Some(provided.clone()),
                ),
                PermissionRequirement::VerifiedEmail => (
                    "Verify your email address, then try again.",
                    None,
                    None,
                ),
            },
            _ => (kind.guidance(), None, None),
        };

        let request_id = ctx.request_id_or_new();

        let classified = Self {
            kind,
            http_status: kind.http_status(),
            user_message: kind.user_message(),
            guidance,
            action: kind.action(),
            retry_after_seconds: kind.retry_after_seconds(),
            request_id,
            required,
            provided,
            cause: failure.to_string(),
        };
        classified.log(ctx);
        classified
    }

    /// The internal cause, for logging and debug channels only.
    #[must_use]
    pub fn cause(&self) -> &str {
        &self.cause
    }

    fn log(&self, ctx: &RequestContext) {
        // 5xx means something on our side broke; everything else is
        // routine client-side failure and stays at debug
        if self.http_status.is_server_error() {
            tracing::warn!(
                target: "gatehouse.errors",
                kind = self.kind.code(),
                request_id = %self.request_id,
                endpoint = ctx.endpoint.as_deref().unwrap_or("-"),
                cause = %self.cause,
                "Authentication pipeline failure"
            );
        } else {
            tracing::debug!(
                target: "gatehouse.errors",
                kind = self.kind.code(),
                request_id = %self.request_id,
                endpoint = ctx.endpoint.as_deref().unwrap_or("-"),
                cause = %self.cause,
                "Request rejected"
            );
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'a str,
    status: u16,
    message: &'a str,
    guidance: &'a str,
    action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u32>,
    request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    provided: Option<&'a [String]>,
}

impl IntoResponse for ClassifiedError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.kind.code(),
                status: self.http_status.as_u16(),
                message: self.user_message,
                guidance: self.guidance,
                action: self.action,
                retry_after_seconds: self.retry_after_seconds,
                request_id: &self.request_id,
                required: self.required.as_deref(),
                provided: self.provided.as_deref(),
            },
        };

        let mut response = (self.http_status, Json(&body)).into_response();
        if let Some(secs) = self.retry_after_seconds {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

// =============================================================================
// Tests
// =============================================================================
