//! Token verification against the issuer's JWKS.
//!
//! The verifier caches one decoding key. It is fetched lazily on the first
//! token, reused for every later token with the same `kid`, and refetched when
//! a token names a `kid` the cache does not hold. Refetches are spaced at least
//! `refresh_cooldown` apart, including after a first fetch that found no match.
//! Only one fetch runs at a time; callers waiting on it reuse its result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{
    DecodingKey, Validation, decode, decode_header,
    errors::ErrorKind,
    jwk::{Jwk, JwkSet},
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::Claims;
use super::issuer::unix_now;
use super::keys::{KeyProvider, SIGNING_ALGORITHM};

/// Why a token was not accepted. Logged, never shown to clients.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Not a well-formed JWT
    #[error("malformed token: {0}")]
    Malformed(String),

    /// JWKS could not be fetched
    #[error("JWKS unavailable: {0}")]
    UpstreamUnavailable(String),

    /// No published key matches the token's `kid`
    #[error("no key for kid {0:?}")]
    UnknownKeyId(Option<String>),

    /// Published key cannot be used for RS256
    #[error("unsupported key: {0}")]
    UnsupportedKey(String),

    /// `exp` is not in the future
    #[error("token expired")]
    Expired,

    /// Bad signature, wrong algorithm or missing claims
    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Where the verifier gets the issuer's public keys
#[async_trait::async_trait]
pub trait JwksSource: Send + Sync + 'static {
    /// Fetch the current key set.
    async fn fetch(&self) -> Result<JwkSet, VerifyError>;
}

/// JWKS fetched over HTTP with a bounded timeout
#[derive(Debug, Clone)]
pub struct HttpJwksSource {
    client: reqwest::Client,
    url: String,
}

impl HttpJwksSource {
    /// Source reading `url`, giving up on each fetch after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch(&self) -> Result<JwkSet, VerifyError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| VerifyError::UpstreamUnavailable(e.to_string()))?;

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| VerifyError::UpstreamUnavailable(format!("invalid JWKS body: {e}")))
    }
}

/// In-process source for deployments where issuer and verifier share a process
#[async_trait::async_trait]
impl JwksSource for KeyProvider {
    async fn fetch(&self) -> Result<JwkSet, VerifyError> {
        Ok(self.jwks().clone())
    }
}

struct CachedKey {
    kid: Option<String>,
    key: DecodingKey,
}

/// Verifies RS256 tokens and extracts their claims.
pub struct TokenVerifier {
    source: Arc<dyn JwksSource>,
    cached: RwLock<Option<Arc<CachedKey>>>,
    last_refresh: Mutex<Option<Instant>>,
    fetch_lock: tokio::sync::Mutex<()>,
    refresh_cooldown: Duration,
    validation: Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field(
                "cached_kid",
                &self.cached.read().as_ref().map(|c| c.kid.clone()),
            )
            .field("refresh_cooldown", &self.refresh_cooldown)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Verifier backed by `source`
    #[must_use]
    pub fn new(source: Arc<dyn JwksSource>, refresh_cooldown: Duration) -> Self {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            source,
            cached: RwLock::new(None),
            last_refresh: Mutex::new(None),
            fetch_lock: tokio::sync::Mutex::new(()),
            refresh_cooldown,
            validation,
        }
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// Any [`VerifyError`]; callers should collapse them into one
    /// client-facing "unauthorized".
    pub async fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let header = decode_header(token).map_err(|e| VerifyError::Malformed(e.to_string()))?;
        let key = self.key_for(header.kid.as_deref()).await?;

        let claims = decode::<Claims>(token, &key.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => VerifyError::Expired,
                _ => VerifyError::Rejected(e.to_string()),
            })?;

        // jsonwebtoken still accepts exp == now
        if claims.exp <= unix_now() {
            return Err(VerifyError::Expired);
        }
        Ok(claims)
    }

    /// `kid` of the cached key, if any key has been fetched
    #[must_use]
    pub fn cached_kid(&self) -> Option<String> {
        self.cached.read().as_ref().and_then(|c| c.kid.clone())
    }

    async fn key_for(&self, kid: Option<&str>) -> Result<Arc<CachedKey>, VerifyError> {
        if let Some(key) = self.cached_match(kid) {
            return Ok(key);
        }

        let _fetching = self.fetch_lock.lock().await;
        if let Some(key) = self.cached_match(kid) {
            return Ok(key);
        }
        if !self.claim_refresh() {
            debug!(kid = ?kid, "Unknown kid, JWKS refresh on cooldown");
            return Err(VerifyError::UnknownKeyId(kid.map(str::to_string)));
        }
        info!(kid = ?kid, "No cached key for kid, fetching JWKS");
        self.fetch_and_cache(kid).await
    }

    /// Cached key usable for `kid`; a token without `kid` takes whatever is cached
    fn cached_match(&self, kid: Option<&str>) -> Option<Arc<CachedKey>> {
        self.cached
            .read()
            .as_ref()
            .filter(|key| kid.is_none() || key.kid.as_deref() == kid)
            .cloned()
    }

    /// Record a fetch now unless one happened within the cooldown
    fn claim_refresh(&self) -> bool {
        let mut last = self.last_refresh.lock();
        if let Some(at) = *last {
            if at.elapsed() < self.refresh_cooldown {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }

    async fn fetch_and_cache(&self, kid: Option<&str>) -> Result<Arc<CachedKey>, VerifyError> {
        let jwks = self.source.fetch().await.inspect_err(|e| {
            warn!(error = %e, "JWKS fetch failed");
        })?;

        let jwk = select_key(&jwks, kid)
            .ok_or_else(|| VerifyError::UnknownKeyId(kid.map(str::to_string)))?;
        let fresh = Arc::new(CachedKey {
            kid: jwk.common.key_id.clone(),
            key: DecodingKey::from_jwk(jwk)
                .map_err(|e| VerifyError::UnsupportedKey(e.to_string()))?,
        });

        let mut slot = self.cached.write();
        if let Some(existing) = slot.as_ref().filter(|existing| existing.kid == fresh.kid) {
            return Ok(Arc::clone(existing));
        }
        info!(kid = ?fresh.kid, "Cached issuer public key");
        *slot = Some(Arc::clone(&fresh));
        Ok(fresh)
    }
}

/// Key matching `kid`, or the first key when the token carries none
fn select_key<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks.find(kid),
        None => jwks.keys.first(),
    }
}
