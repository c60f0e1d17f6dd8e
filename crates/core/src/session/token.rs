//! Client-side view of the bearer token. Claims are read without checking
//! the signature; the backend verifies it on every call.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Stored values the portal writes when a token is lost during serialization.
const SENTINELS: [&str; 2] = ["undefined", "null"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("no token is stored")]
    Missing,
    #[error("stored token is the sentinel `{0}`")]
    Sentinel(String),
    #[error("token is not a three-part signed token")]
    Malformed,
    #[error("token payload could not be decoded: {0}")]
    Payload(String),
    #[error("token has no numeric `exp` claim")]
    MissingExpiry,
    #[error("token has already expired")]
    Expired,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// Whole seconds until expiry, negative once expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.exp.saturating_sub(now.timestamp())
    }

    /// Milliseconds until expiry, saturating at the `i64` bounds.
    pub fn remaining_millis(&self, now: DateTime<Utc>) -> i64 {
        self.exp.saturating_mul(1000).saturating_sub(now.timestamp_millis())
    }

    pub fn subject(&self) -> Option<&str> {
        self.extra.get("sub").and_then(Value::as_str)
    }
}

pub fn decode(raw: Option<&str>) -> Result<TokenClaims, TokenError> {
    let token = raw.map(str::trim).filter(|token| !token.is_empty()).ok_or(TokenError::Missing)?;
    if SENTINELS.contains(&token) {
        return Err(TokenError::Sentinel(token.to_string()));
    }

    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|error| TokenError::Payload(error.to_string()))?;
    let claims: Map<String, Value> =
        serde_json::from_slice(&bytes).map_err(|error| TokenError::Payload(error.to_string()))?;

    let exp = claims.get("exp").and_then(expiry_seconds).ok_or(TokenError::MissingExpiry)?;
    let mut extra = claims;
    extra.remove("exp");

    Ok(TokenClaims { exp, extra })
}

fn expiry_seconds(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|secs| secs.floor() as i64))
}

/// True iff the token is present, not a sentinel, decodable, and its expiry
/// in milliseconds lies strictly after `now`.
pub fn is_valid(raw: Option<&str>, now: DateTime<Utc>) -> bool {
    decode(raw)
        .map(|claims| claims.remaining_millis(now) > 0)
        .unwrap_or(false)
}

/// Builds an unsigned token with the given claims. Used by tests and fixtures.
pub fn encode_unsigned(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.unsigned")
}
