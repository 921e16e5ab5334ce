//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports from the [`secrecy`] crate with Gatehouse-specific guidance.
//! A raw bearer token is only plaintext for the duration of one validation
//! call; anywhere a token, API key, or other credential is held for longer
//! (host state, background refresh, config) it belongs in one of these
//! wrappers.
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so
//! any struct that derives `Debug` over them is safe to log via `{:?}` or
//! tracing. Values are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct StoredCredential {
//!     client_id: String,
//!     bearer_token: SecretString,
//! }
//!
//! let cred = StoredCredential {
//!     client_id: "portal".to_string(),
//!     bearer_token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! // Safe: the token renders as [REDACTED]
//! println!("{:?}", cred);
//!
//! // Access requires an explicit expose_secret() call
//! let raw: &str = cred.bearer_token.expose_secret();
//! ```
//!
//! Use `SecretString` for bearer tokens and client secrets; use
//! `SecretBox<T>` for binary material.

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
