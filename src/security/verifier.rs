use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    errors::{Error as JwtError, ErrorKind},
    jwk::JwkSet,
};
use std::collections::HashMap;
use thiserror::Error;

use super::claims::TokenClaims;
use crate::config::KeySource;

/// Signing algorithms accepted for keys published through a JWKS document.
const ASYMMETRIC_ALGORITHMS: [Algorithm; 8] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::ES256,
    Algorithm::ES384,
];

/// AuthFailure
///
/// Why a request on a `REQUIRE_AUTH` rule could not be authenticated. The two
/// causes map onto the two fixed message pairs of the unauthorized response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// No `Authorization` header, a non-Bearer scheme, an empty token, or a value
    /// that is not structurally a JWT.
    #[error("bearer credential is missing or malformed")]
    MissingCredential,
    /// A structurally valid JWT that failed provider validation (signature,
    /// expiry, issuer, unknown key).
    #[error("bearer token failed provider validation")]
    InvalidToken,
}

impl AuthFailure {
    /// Returns the `(message, errors)` pair written by the unauthorized responder.
    pub fn message_pair(self) -> (&'static str, &'static str) {
        match self {
            AuthFailure::MissingCredential => (
                "Unauthorized request. Check token and try again.",
                "Invalid or missing Token",
            ),
            AuthFailure::InvalidToken => {
                ("Invalid JWT provided.", "JWT has expired or is invalid")
            }
        }
    }
}

impl From<JwtError> for AuthFailure {
    fn from(error: JwtError) -> Self {
        match error.kind() {
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthFailure::MissingCredential,
            _ => AuthFailure::InvalidToken,
        }
    }
}

/// VerifierError
///
/// Start-up failures while building the verification key material.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("invalid key material: {0}")]
    KeyMaterial(#[from] JwtError),
    #[error("failed to fetch JWKS document: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("JWKS document contains no usable signing key")]
    EmptyKeySet,
}

enum KeyRing {
    Single {
        key: DecodingKey,
        algorithm: Algorithm,
    },
    /// Keys indexed by `kid`, as published by the identity provider.
    Published(HashMap<String, DecodingKey>),
}

/// TokenVerifier
///
/// Read-only credential verification material, built once at start-up and shared
/// by reference across every request. Verification is synchronous and holds no lock.
pub struct TokenVerifier {
    keys: KeyRing,
    issuer: Option<String>,
}

impl TokenVerifier {
    /// HS256 verification with a shared secret.
    pub fn from_secret(secret: &str) -> Self {
        Self {
            keys: KeyRing::Single {
                key: DecodingKey::from_secret(secret.as_bytes()),
                algorithm: Algorithm::HS256,
            },
            issuer: None,
        }
    }

    /// RS256 verification with the provider's realm public key.
    pub fn from_rsa_pem(pem: &str) -> Result<Self, VerifierError> {
        Ok(Self {
            keys: KeyRing::Single {
                key: DecodingKey::from_rsa_pem(pem.as_bytes())?,
                algorithm: Algorithm::RS256,
            },
            issuer: None,
        })
    }

    /// Builds a key ring from a JWKS document. Keys without a `kid` or of an
    /// unsupported type are skipped.
    pub fn from_jwks(set: &JwkSet) -> Result<Self, VerifierError> {
        let keys: HashMap<String, DecodingKey> = set
            .keys
            .iter()
            .filter_map(|jwk| {
                let kid = jwk.common.key_id.clone()?;
                match DecodingKey::from_jwk(jwk) {
                    Ok(key) => Some((kid, key)),
                    Err(e) => {
                        tracing::warn!(kid = %kid, error = %e, "Skipping unusable JWKS key");
                        None
                    }
                }
            })
            .collect();

        if keys.is_empty() {
            return Err(VerifierError::EmptyKeySet);
        }

        Ok(Self {
            keys: KeyRing::Published(keys),
            issuer: None,
        })
    }

    /// Downloads the provider's JWKS document once. The key ring is not refreshed
    /// afterwards; rotating provider keys requires a restart.
    pub async fn fetch_jwks(uri: &str) -> Result<Self, VerifierError> {
        let set = reqwest::get(uri)
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        tracing::info!(uri = %uri, keys = set.keys.len(), "Loaded identity provider JWKS");
        Self::from_jwks(&set)
    }

    /// Resolves the configured key source into a verifier.
    pub async fn from_key_source(
        source: &KeySource,
        issuer: Option<String>,
    ) -> Result<Self, VerifierError> {
        let verifier = match source {
            KeySource::SharedSecret(secret) => Self::from_secret(secret),
            KeySource::RsaPublicKeyPem(pem) => Self::from_rsa_pem(pem)?,
            KeySource::JwksUri(uri) => Self::fetch_jwks(uri).await?,
        };
        Ok(verifier.with_issuer(issuer))
    }

    /// Requires the `iss` claim to equal `issuer` when set.
    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    /// verify
    ///
    /// Checks the token signature, `exp` and (when configured) `iss`, and returns
    /// the raw claims. Audience is not validated.
    pub fn verify(&self, token: &str) -> Result<TokenClaims, AuthFailure> {
        // Anything that fails before the signature check is not a JWT at all.
        let header = decode_header(token).map_err(|_| AuthFailure::MissingCredential)?;

        let (key, algorithm) = match &self.keys {
            KeyRing::Single { key, algorithm } => (key, *algorithm),
            KeyRing::Published(keys) => {
                if !ASYMMETRIC_ALGORITHMS.contains(&header.alg) {
                    return Err(AuthFailure::InvalidToken);
                }
                let key = match header.kid.as_deref() {
                    Some(kid) => keys.get(kid),
                    None if keys.len() == 1 => keys.values().next(),
                    None => None,
                };
                (key.ok_or(AuthFailure::InvalidToken)?, header.alg)
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = true;
        validation.validate_aud = false;
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        let data = decode::<TokenClaims>(token, key, &validation)?;
        Ok(data.claims)
    }
}
