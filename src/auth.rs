use crate::schemas::MemberId;
use actix_web::{http::header::HeaderValue, HttpRequest};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::num::ParseIntError;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing authorization header")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("invalid token signature")]
    BadSignature,
}

/// Resolves a bearer token to the member it was issued for.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<MemberId, AuthError>;
}

/// Tokens of the form `<member>.<expiry unix seconds>.<hex hmac-sha256>`,
/// signed with a key derived from a shared secret.
pub struct HmacVerifier {
    key: Vec<u8>,
}

impl HmacVerifier {
    pub fn new(secret: &str) -> Self {
        let mut sha256_hasher = Sha256::new();
        sha256_hasher.update(secret.as_bytes());
        HmacVerifier {
            key: sha256_hasher.finalize().to_vec(),
        }
    }

    pub fn issue(&self, member: &str, expires_at: i64) -> String {
        let payload = format!("{member}.{expires_at}");
        let signature = self
            .mac(&payload)
            .finalize()
            .into_bytes()
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        format!("{payload}.{signature}")
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut hmac_hasher = match HmacSha256::new_from_slice(&self.key) {
            Ok(hasher) => hasher,
            Err(_) => unreachable!("HMAC accepts keys of any length"),
        };
        hmac_hasher.update(payload.as_bytes());
        hmac_hasher
    }
}

impl TokenVerifier for HmacVerifier {
    fn verify(&self, token: &str) -> Result<MemberId, AuthError> {
        let mut parts = token.rsplitn(3, '.');
        let (Some(signature), Some(expires_at), Some(member)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::Malformed);
        };
        if member.is_empty() || signature.len() % 2 != 0 {
            return Err(AuthError::Malformed);
        }
        let expires_at: i64 = expires_at.parse().map_err(|_| AuthError::Malformed)?;
        let signature = signature
            .chars()
            .collect::<Vec<_>>()
            .chunks(2)
            .map(|n| u8::from_str_radix(&String::from_iter(n), 16))
            .collect::<Result<Vec<u8>, ParseIntError>>()
            .map_err(|_| AuthError::Malformed)?;

        self.mac(&format!("{member}.{expires_at}"))
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;
        if expires_at <= Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }
        Ok(member.to_string())
    }
}

/// Reads the `Authorization` header (with or without a `Bearer ` prefix)
/// and verifies it.
pub fn authenticate(request: &HttpRequest, verifier: &dyn TokenVerifier) -> Result<MemberId, AuthError> {
    let authorization = request
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .map(HeaderValue::to_str)
        .ok_or(AuthError::Missing)?
        .map_err(|_| AuthError::Malformed)?;
    let token = authorization
        .strip_prefix("Bearer ")
        .unwrap_or(authorization)
        .trim();
    verifier.verify(token)
}
