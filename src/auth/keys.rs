//! Issuer signing key and its JWKS publication.
//!
//! One RSA-2048 key pair is generated per process at startup. There is no
//! rotation: the key lives as long as the process. The private half only ever
//! exists as an [`EncodingKey`] inside this type; the public half is exported
//! as PKCS#1 PEM and as a single-entry JWKS document.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey,
    jwk::{
        AlgorithmParameters, CommonParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
        RSAKeyParameters, RSAKeyType,
    },
};
use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding},
    traits::PublicKeyParts,
};
use tracing::info;

use crate::{Error, Result};

/// Modulus size of the generated key
pub const RSA_KEY_BITS: usize = 2048;

/// Signature algorithm used for every issued token
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// Holds the issuer key pair for the lifetime of the process.
pub struct KeyProvider {
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    public_pem: String,
    jwks: JwkSet,
}

impl std::fmt::Debug for KeyProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyProvider")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

impl KeyProvider {
    /// Generate a fresh RSA-2048 key pair labelled `kid`.
    ///
    /// Failure here is fatal: callers must not start serving without a key.
    pub fn generate(kid: impl Into<String>) -> Result<Self> {
        let kid = kid.into();
        let mut rng = rsa::rand_core::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;

        let provider = Self::from_private_key(kid, &private_key)?;
        info!(kid = %provider.kid, bits = RSA_KEY_BITS, "Generated signing key");
        Ok(provider)
    }

    /// Wrap an existing RSA private key.
    pub fn from_private_key(kid: impl Into<String>, private_key: &RsaPrivateKey) -> Result<Self> {
        let kid = kid.into();
        let public_key = RsaPublicKey::from(private_key);

        let private_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::KeyGeneration(format!("private key export: {e}")))?;
        let public_pem = public_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::KeyGeneration(format!("public key export: {e}")))?;

        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| Error::KeyGeneration(format!("signing key import: {e}")))?;

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|e| Error::KeyGeneration(format!("verification key import: {e}")))?;

        let jwks = JwkSet {
            keys: vec![rsa_signing_jwk(&kid, n, e)],
        };

        Ok(Self {
            kid,
            encoding_key,
            decoding_key,
            public_pem,
            jwks,
        })
    }

    /// Key identifier stamped into token headers
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Public key as PKCS#1 PEM
    #[must_use]
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    /// JWKS document `{keys: [JWK]}` containing only the public key
    #[must_use]
    pub fn jwks(&self) -> &JwkSet {
        &self.jwks
    }

    /// Public key for local verification
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

fn rsa_signing_jwk(kid: &str, n: String, e: String) -> Jwk {
    Jwk {
        common: CommonParameters {
            public_key_use: Some(PublicKeyUse::Signature),
            key_algorithm: Some(KeyAlgorithm::RS256),
            key_id: Some(kid.to_string()),
            ..CommonParameters::default()
        },
        algorithm: AlgorithmParameters::RSA(RSAKeyParameters {
            key_type: RSAKeyType::RSA,
            n,
            e,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, LazyLock};

    use super::*;

    static SHARED: LazyLock<Arc<KeyProvider>> =
        LazyLock::new(|| Arc::new(KeyProvider::generate("test-kid").unwrap()));

    /// One key per test binary; RSA generation is the slowest step in the suite.
    pub(crate) fn shared_keys() -> Arc<KeyProvider> {
        Arc::clone(&*SHARED)
    }

    #[test]
    fn jwks_document_has_expected_shape() {
        // GIVEN: a generated key provider
        let keys = shared_keys();

        // WHEN: the JWKS is serialized
        let doc = serde_json::to_value(keys.jwks()).unwrap();

        // THEN: exactly one RSA signing key with the configured kid
        let published = doc["keys"].as_array().unwrap();
        assert_eq!(published.len(), 1);
        let jwk = &published[0];
        assert_eq!(jwk["kty"], "RSA");
        assert_eq!(jwk["use"], "sig");
        assert_eq!(jwk["alg"], "RS256");
        assert_eq!(jwk["kid"], "test-kid");
        assert!(jwk["n"].as_str().unwrap().len() > 300);
        assert_eq!(jwk["e"], "AQAB");
    }

    #[test]
    fn jwks_never_contains_private_parameters() {
        let doc = serde_json::to_value(shared_keys().jwks()).unwrap();
        let jwk = &doc["keys"][0];
        for private in ["d", "p", "q", "dp", "dq", "qi"] {
            assert!(jwk.get(private).is_none(), "JWKS leaked {private}");
        }
    }

    #[test]
    fn public_pem_is_pkcs1() {
        assert!(
            shared_keys()
                .public_pem()
                .starts_with("-----BEGIN RSA PUBLIC KEY-----")
        );
    }

    #[test]
    fn debug_output_hides_key_material() {
        let rendered = format!("{:?}", shared_keys());
        assert!(rendered.contains("test-kid"));
        assert!(!rendered.contains("BEGIN"));
    }
}
