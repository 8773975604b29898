//! Unverified JWT claim inspection.
//!
//! The client never validates admin JWTs (the service does that and answers
//! 401); it only reads the `exp` claim for diagnostics and refresh logging.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Decode the `exp` claim of a compact JWT without verifying its signature.
pub(crate) fn expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp?, 0)
}

#[cfg(test)]
pub(crate) fn fake_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"id":1,"exp":{exp}}}"#));
    format!("{header}.{payload}.signature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_from_claims() {
        let token = fake_token(1_900_000_000);
        let exp = expiry(&token).unwrap();
        assert_eq!(exp.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_expiry_missing_or_garbage() {
        assert!(expiry("not-a-jwt").is_none());
        assert!(expiry("a.b.c").is_none());

        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let payload = URL_SAFE_NO_PAD.encode(br#"{"id":1}"#);
        assert!(expiry(&format!("{header}.{payload}.sig")).is_none());
    }
}
