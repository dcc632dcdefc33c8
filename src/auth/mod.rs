use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::Role;

/// JWT claims carried by an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("JWT secret not configured")]
    MissingSecret,
}

/// Issues and verifies self-contained HS256 access tokens.
///
/// Verification is stateless; an external revocation check (if any) belongs
/// between `verify` and permission evaluation, in the caller.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    default_ttl: Duration,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str, default_ttl_secs: u64) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let mut validation = Validation::default();
        // Expiry boundaries are exact; the default 60s leeway would let an
        // expired token pass for a minute.
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            default_ttl: Duration::seconds(default_ttl_secs as i64),
            validation,
        })
    }

    pub fn default_ttl_secs(&self) -> i64 {
        self.default_ttl.num_seconds()
    }

    /// Issue a token for `subject_id` with the service default TTL.
    pub fn issue(&self, subject_id: &str, role: Role) -> Result<String, TokenError> {
        self.issue_with_ttl(subject_id, role, self.default_ttl)
    }

    /// Issue a token with an explicit TTL (negative TTLs produce an already
    /// expired token, which the tests rely on).
    pub fn issue_with_ttl(
        &self,
        subject_id: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject_id.to_string(),
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Invalid(e.to_string()))
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Expiry and malformation are distinct, separately observable failures.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }
}
