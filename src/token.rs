//! Bearer token issuance and verification.
//!
//! Tokens are HS256 JWTs carrying `authorized`, `exp` and `userId`. They are
//! self-contained: nothing is stored server-side, so a token stays valid until
//! it expires.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use spin_sdk::http::Request;
use thiserror::Error;

use crate::config::TOKEN_LIFETIME_HOURS;
use crate::core::helpers::header;
use crate::models::models::Identity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub authorized: bool,
    /// Expiry, unix seconds.
    pub exp: i64,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Why a token was turned away.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    #[error("signature does not verify")]
    Signature,
    #[error("unexpected signing method")]
    Algorithm,
    #[error("token has expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("missing userId claim")]
    MissingIdentity,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    Invalid(Rejection),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Signs and checks tokens with the process-wide secret. Built once at
/// startup and shared read-only.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // Expiry is checked against an explicit clock in `decode_at`.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            lifetime: Duration::hours(TOKEN_LIFETIME_HOURS),
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            authorized: true,
            exp: (now + self.lifetime).timestamp(),
            user_id: identity.as_str().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Checks signature, algorithm and expiry.
    pub fn verify(&self, token: &str) -> Result<(), TokenError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<(), TokenError> {
        self.decode_at(token, now).map(|_| ())
    }

    /// Verifies the token and returns the identity it was issued to.
    pub fn extract_identity(&self, token: &str) -> Result<Identity, TokenError> {
        self.extract_identity_at(token, Utc::now())
    }

    pub fn extract_identity_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Identity, TokenError> {
        let identity = Identity::new(self.decode_at(token, now)?.user_id);
        if identity.is_empty() {
            return Err(TokenError::Invalid(Rejection::MissingIdentity));
        }
        Ok(identity)
    }

    fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| TokenError::Invalid(rejection(e.kind())))?;

        if data.claims.exp <= now.timestamp() {
            return Err(TokenError::Invalid(Rejection::Expired));
        }
        Ok(data.claims)
    }
}

fn rejection(kind: &JwtErrorKind) -> Rejection {
    match kind {
        JwtErrorKind::InvalidSignature => Rejection::Signature,
        JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => Rejection::Algorithm,
        JwtErrorKind::ExpiredSignature => Rejection::Expired,
        _ => Rejection::Malformed,
    }
}

/// Token from an `Authorization: Bearer <token>` header.
///
/// Anything other than exactly two space-separated parts starting with
/// `Bearer` yields an empty string, which then fails verification like any
/// other bad token.
pub fn bearer_token(req: &Request) -> &str {
    let Some(value) = header(req, "authorization") else {
        return "";
    };
    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        ["Bearer", token] => token,
        _ => "",
    }
}
