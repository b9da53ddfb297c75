//! Bearer token verification against the identity provider's signing keys.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde::Deserialize;
use tracing::{debug, warn};

use super::jwks::{JwksCache, JwksConfig, KeyLookupError, ALLOWED_ALGORITHMS};
use crate::config::Config;
use crate::error::{AuthError, Error};

/// Identity extracted from a verified token.
///
/// Lives for a single request; never cached or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// The token's `sub` claim.
    pub subject: String,
    pub issuer: String,
    pub expires_at: DateTime<Utc>,
}

/// Expected claim values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub issuer: String,
    pub audience: String,
    /// Leeway applied to `exp` and `nbf`.
    pub leeway: Duration,
}

impl VerifierConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            issuer: config.issuer_url.clone(),
            audience: config.audience.clone(),
            leeway: config.clock_skew,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, expected: &str) -> bool {
        match self {
            Self::One(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    exp: i64,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    aud: Option<Audience>,
    /// Cognito access tokens carry the app client here instead of `aud`.
    #[serde(default)]
    client_id: Option<String>,
}

/// Verifies RS256 bearer tokens issued by the configured provider.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    config: VerifierConfig,
    keys: Arc<JwksCache>,
}

impl TokenVerifier {
    pub fn new(config: VerifierConfig, keys: Arc<JwksCache>) -> Self {
        Self { config, keys }
    }

    /// Build a verifier and an empty key cache from service configuration.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let keys = JwksCache::new(JwksConfig::from_config(config))?;
        Ok(Self::new(VerifierConfig::from_config(config), Arc::new(keys)))
    }

    /// The signing-key cache shared by all requests.
    pub fn keys(&self) -> &Arc<JwksCache> {
        &self.keys
    }

    /// Verify `token` and return the caller's identity.
    pub async fn verify(&self, token: &str) -> Result<VerifiedIdentity, AuthError> {
        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "token header could not be decoded");
            AuthError::Malformed
        })?;

        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            debug!(alg = ?header.alg, "token signed with disallowed algorithm");
            return Err(AuthError::InvalidSignature);
        }

        let kid = header.kid.ok_or_else(|| {
            debug!("token header has no key id");
            AuthError::Malformed
        })?;

        let key = self.keys.key(&kid).await.map_err(|e| {
            match &e {
                KeyLookupError::UnknownKey(_) => debug!(kid = %kid, "unknown signing key"),
                KeyLookupError::Fetch(reason) => {
                    warn!(kid = %kid, reason = %reason, "signing keys unavailable")
                }
            }
            AuthError::InvalidSignature
        })?;

        let claims = decode::<Claims>(token, &key, &signature_only_validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidRsaKey(_) => AuthError::InvalidSignature,
                _ => {
                    debug!(error = %e, "token claims could not be parsed");
                    AuthError::Malformed
                }
            })?;

        self.check_claims(&claims, Utc::now().timestamp())?;

        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::Malformed)?;

        Ok(VerifiedIdentity {
            subject: claims.sub,
            issuer: claims.iss,
            expires_at,
        })
    }

    fn check_claims(&self, claims: &Claims, now: i64) -> Result<(), AuthError> {
        let leeway = self.config.leeway.as_secs() as i64;

        if claims.exp.saturating_add(leeway) < now {
            return Err(AuthError::Expired);
        }
        if let Some(nbf) = claims.nbf {
            if now.saturating_add(leeway) < nbf {
                return Err(AuthError::Expired);
            }
        }

        if claims.iss.trim_end_matches('/') != self.config.issuer {
            return Err(AuthError::WrongIssuer);
        }

        let audience_matches = match (&claims.aud, &claims.client_id) {
            (Some(aud), _) => aud.contains(&self.config.audience),
            (None, Some(client_id)) => client_id == &self.config.audience,
            (None, None) => false,
        };
        if !audience_matches {
            return Err(AuthError::WrongAudience);
        }

        Ok(())
    }
}

/// Signature and algorithm checks only; time, issuer and audience are
/// checked afterwards so each failure maps to its own [`AuthError`].
fn signature_only_validation() -> Validation {
    let mut validation = Validation::new(ALLOWED_ALGORITHMS[0]);
    validation.algorithms = ALLOWED_ALGORITHMS.to_vec();
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation
}
