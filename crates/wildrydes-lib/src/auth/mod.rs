//! Caller authentication.
//!
//! - [`TokenVerifier`]: validates RS256 tokens from the configured issuer
//! - [`JwksCache`]: the shared, refreshable signing-key cache
//! - [`bearer_token`]: pulls the token out of an `Authorization` header value

pub mod jwks;
mod verifier;

pub use jwks::{JwkSet, JwksCache, JwksConfig, KeyLookupError};
pub use verifier::{TokenVerifier, VerifiedIdentity, VerifierConfig};

use crate::error::AuthError;

/// Extract the token from an `Authorization` header value.
///
/// Accepts `Bearer <token>` with any scheme casing, and a bare token with no
/// scheme (what the API Gateway Cognito authorizer reads). Any other scheme,
/// or an empty value, is `Malformed`.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let value = header.map(str::trim).unwrap_or_default();
    if value.is_empty() || value.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Malformed);
    }

    match value.split_once(char::is_whitespace) {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
            let token = token.trim();
            if token.is_empty() {
                Err(AuthError::Malformed)
            } else {
                Ok(token)
            }
        }
        Some(_) => Err(AuthError::Malformed),
        None => Ok(value),
    }
}
