//! WAMP challenge-response authentication.

use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Authentication method name for WAMP challenge-response.
pub const WAMP_CRA: &str = "wampcra";

/// Reasons a router challenge cannot be answered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The router picked a method this client never offered.
    #[error("unsupported authentication method `{0}`")]
    UnsupportedMethod(String),
    /// The challenge extra did not carry a `challenge` string.
    #[error("challenge payload is missing the `challenge` string")]
    MissingChallenge,
    /// Salted (PBKDF2-derived) secrets are not configured for this client.
    #[error("salted challenges are not supported")]
    SaltedChallenge,
    /// The secret was refused as an HMAC key.
    #[error("secret cannot be used as an HMAC key")]
    InvalidKey,
}

/// Answer a router challenge for `method` using the shared `secret`.
pub fn respond(method: &str, extra: &Map<String, Value>, secret: &str) -> Result<String, AuthError> {
    if method != WAMP_CRA {
        return Err(AuthError::UnsupportedMethod(method.to_string()));
    }
    if extra.contains_key("salt") {
        return Err(AuthError::SaltedChallenge);
    }
    let challenge = extra
        .get("challenge")
        .and_then(Value::as_str)
        .ok_or(AuthError::MissingChallenge)?;
    compute_signature(secret.as_bytes(), challenge.as_bytes())
}

/// Base64 encoded HMAC-SHA256 of `challenge` keyed with `secret`.
pub fn compute_signature(secret: &[u8], challenge: &[u8]) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| AuthError::InvalidKey)?;
    mac.update(challenge);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
