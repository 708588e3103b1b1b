//! Token issuance

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Header, encode};
use tracing::debug;

use super::keys::{KeyProvider, SIGNING_ALGORITHM};
use super::{Claims, Identity};

/// Mints RS256 tokens signed with the [`KeyProvider`]'s private key.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyProvider>,
    ttl: Duration,
}

impl TokenIssuer {
    /// Issuer whose tokens expire `ttl` after issuance
    #[must_use]
    pub fn new(keys: Arc<KeyProvider>, ttl: Duration) -> Self {
        Self { keys, ttl }
    }

    /// Sign a token for `identity` with `iat = now`, `exp = now + ttl`.
    ///
    /// # Errors
    ///
    /// Only if signing itself fails.
    pub fn issue(&self, identity: &Identity) -> Result<String, jsonwebtoken::errors::Error> {
        let iat = unix_now();
        let claims = Claims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            role: identity.role,
            iat,
            exp: iat + self.ttl.as_secs(),
        };
        let token = self.sign(&claims)?;
        debug!(user_id = %identity.id, exp = claims.exp, "Issued token");
        Ok(token)
    }

    /// Sign arbitrary claims with the issuer key and `kid` header.
    ///
    /// # Errors
    ///
    /// Only if signing itself fails.
    pub fn sign(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = Some(self.keys.kid().to_string());
        encode(&header, claims, self.keys.encoding_key())
    }
}

/// Seconds since the Unix epoch
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
