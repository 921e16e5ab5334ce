//! Canonical identity normalization.
//!
//! Federated providers put the same facts in different claims: the
//! directory's native flow carries extension-prefixed custom attributes,
//! a Google identity bridged through the directory carries `hd` and
//! `picture`, and so on. This module maps every provider shape onto one
//! [`CanonicalIdentity`]. Provider differences are data in a mapping
//! table, not separate code paths.
//!
//! Only the subject and one email address are mandatory; roles and
//! company are optional and default to empty.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::errors::AuthFailure;
use crate::validator::Claims;

/// Identity-provider discriminator claim.
const CLAIM_IDP: &str = "idp";

/// Provider value reported for the directory's native sign-in flow,
/// which emits no `idp` claim.
pub const PROVIDER_LOCAL: &str = "local";

/// Provider value for Google identities bridged via the directory.
pub const PROVIDER_GOOGLE: &str = "google.com";

/// Prefix the directory puts on tenant-defined custom attributes.
const EXTENSION_PREFIX: &str = "extension_";

// =============================================================================
// Canonical Identity
// =============================================================================

/// The provider-agnostic representation of an authenticated user.
///
/// Constructed only from claims that passed every enabled validation
/// check; owned by the request for its duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalIdentity {
    /// Stable user identifier (the token subject).
    pub id: String,

    /// Primary email address.
    pub email: String,

    /// Display name, when the provider supplies one.
    pub display_name: Option<String>,

    /// Given name.
    pub given_name: Option<String>,

    /// Family name.
    pub family_name: Option<String>,

    /// Which provider asserted this identity (`idp` claim, or
    /// [`PROVIDER_LOCAL`] for the directory's native flow).
    pub identity_provider: String,

    /// Directory tenant the token was issued under.
    pub tenant_id: Option<String>,

    /// Roles granted through directory attributes or a `roles` claim.
    pub roles: BTreeSet<String>,

    /// Company affiliation, when asserted.
    pub company: Option<String>,

    /// Whether the provider asserts the email address as verified.
    pub email_verified: bool,
}

impl CanonicalIdentity {
    /// Whether the identity holds a given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

// =============================================================================
// Provider Mapping Table
// =============================================================================

/// Per-provider claim mapping. One entry per provider family; anything
/// not listed uses [`DIRECTORY_PROFILE`].
struct ProviderProfile {
    provider: &'static str,
    /// Claims consulted for company when no directory extension
    /// attribute supplies one, in precedence order.
    company_fallback_claims: &'static [&'static str],
}

/// The directory's native flow: everything interesting arrives as
/// extension attributes, nothing to fall back on.
const DIRECTORY_PROFILE: ProviderProfile = ProviderProfile {
    provider: PROVIDER_LOCAL,
    company_fallback_claims: &[],
};

const PROVIDER_PROFILES: &[ProviderProfile] = &[
    // Google workspace accounts carry the hosted domain in `hd`
    ProviderProfile {
        provider: PROVIDER_GOOGLE,
        company_fallback_claims: &["hd"],
    },
];

fn profile_for(provider: &str) -> &'static ProviderProfile {
    PROVIDER_PROFILES
        .iter()
        .find(|p| p.provider == provider)
        .unwrap_or(&DIRECTORY_PROFILE)
}

// =============================================================================
// Normalization
// =============================================================================

/// Map verified claims onto the canonical identity shape.
///
/// # Errors
///
/// Returns [`AuthFailure::IncompleteProfile`] when the subject or every
/// email-like claim is absent. Roles and company are optional; their
/// absence yields empty values, never a failure.
pub fn normalize(claims: &Claims) -> Result<CanonicalIdentity, AuthFailure> {
    let id = claims
        .sub
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthFailure::IncompleteProfile {
            detail: "subject claim is absent".to_string(),
        })?
        .to_string();

    let email = primary_email(claims).ok_or_else(|| AuthFailure::IncompleteProfile {
        detail: "no email-like claim present".to_string(),
    })?;

    let identity_provider = claims
        .str_extra(CLAIM_IDP)
        .filter(|s| !s.is_empty())
        .unwrap_or(PROVIDER_LOCAL)
        .to_string();
    let profile = profile_for(&identity_provider);

    let mut roles = BTreeSet::new();
    if let Some(value) = claims.extra("roles") {
        collect_roles(value, &mut roles);
    }
    for attribute in ["Roles", "Role"] {
        if let Some(value) = extension_value(claims, attribute) {
            collect_roles(value, &mut roles);
        }
    }

    let company = extension_value(claims, "Company")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .or_else(|| {
            profile
                .company_fallback_claims
                .iter()
                .find_map(|claim| claims.str_extra(claim))
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        });

    Ok(CanonicalIdentity {
        id,
        email,
        display_name: owned_str(claims, "name"),
        given_name: owned_str(claims, "given_name"),
        family_name: owned_str(claims, "family_name"),
        identity_provider,
        tenant_id: owned_str(claims, "tid"),
        roles,
        company,
        email_verified: email_verified(claims),
    })
}

/// Resolve the primary email with fixed precedence: explicit `email`
/// claim, then the first entry of an `emails` list.
fn primary_email(claims: &Claims) -> Option<String> {
    if let Some(email) = claims.str_extra("email").filter(|s| !s.is_empty()) {
        return Some(email.to_string());
    }

    claims
        .extra("emails")
        .and_then(Value::as_array)
        .and_then(|list| {
            list.iter()
                .filter_map(Value::as_str)
                .find(|s| !s.is_empty())
        })
        .map(ToString::to_string)
}

/// Some bridged flows assert verification as the string "true" rather
/// than a boolean.
fn email_verified(claims: &Claims) -> bool {
    match claims.extra("email_verified") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s == "true",
        _ => false,
    }
}

/// Look up a tenant-defined extension attribute by its trailing name,
/// tolerating both `extension_Company` and the app-id-qualified
/// `extension_<appid>_Company` the directory emits.
fn extension_value<'a>(claims: &'a Claims, attribute: &str) -> Option<&'a Value> {
    claims.extra.iter().find_map(|(key, value)| {
        let rest = key.strip_prefix(EXTENSION_PREFIX)?;
        let name = rest.rsplit('_').next()?;
        name.eq_ignore_ascii_case(attribute).then_some(value)
    })
}

/// Roles arrive as a JSON array or as a comma/space-separated string.
fn collect_roles(value: &Value, roles: &mut BTreeSet<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(role) = item.as_str() {
                    let role = role.trim();
                    if !role.is_empty() {
                        roles.insert(role.to_string());
                    }
                }
            }
        }
        Value::String(joined) => {
            for role in joined.split([',', ' ']) {
                let role = role.trim();
                if !role.is_empty() {
                    roles.insert(role.to_string());
                }
            }
        }
        _ => {}
    }
}

fn owned_str(claims: &Claims, name: &str) -> Option<String> {
    claims
        .str_extra(name)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

// =============================================================================
// Tests
// =============================================================================
