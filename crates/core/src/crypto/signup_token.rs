//! Short-lived signup tokens.
//!
//! A signup token binds an email (and optionally a Shopify customer ID) to a
//! shop for a few minutes after the email signup step. The phone/SMS update
//! endpoint accepts writes only when presented a token with
//! `allowPhoneCapture: true`.
//!
//! Token layout: `base64url(json_payload) + "." + base64url(hmac_sha256(payload_b64))`.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::hmac::{constant_time_eq, sign_base64url};

/// Current payload version.
pub const TOKEN_VERSION: u8 = 1;

/// Default lifetime of a signup token (15 minutes).
pub const DEFAULT_TTL_SECONDS: i64 = 15 * 60;

/// Errors returned by [`verify`].
///
/// Messages are returned verbatim to API clients.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SignupTokenError {
    #[error("Invalid signupToken format")]
    Format,
    #[error("Invalid signupToken signature")]
    Signature,
    #[error("Invalid signupToken payload")]
    Payload,
    #[error("Unsupported signupToken version")]
    Version,
    #[error("signupToken expired")]
    Expired,
    #[error("signupToken shop mismatch")]
    ShopMismatch,
}

/// What a token asserts, supplied by the issuer.
#[derive(Debug, Clone, Default)]
pub struct SignupTokenClaims {
    pub shop: String,
    pub email: String,
    pub customer_id: Option<String>,
    pub allow_phone_capture: bool,
}

/// Decoded token payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignupTokenPayload {
    pub v: u8,
    pub iat: i64,
    pub exp: i64,
    pub shop: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_phone_capture: Option<bool>,
}

impl SignupTokenPayload {
    /// Whether this token may authorize a phone/SMS write.
    #[must_use]
    pub fn allows_phone_capture(&self) -> bool {
        self.allow_phone_capture == Some(true)
    }
}

/// Loose view of a payload so version and field checks can report precise
/// errors instead of a generic decode failure.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default)]
    v: Option<serde_json::Value>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    shop: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    allow_phone_capture: Option<bool>,
}

/// Pick the signing secret: the dedicated signup secret, then the broker
/// shared secret, then the session secret. Empty values are skipped.
#[must_use]
pub fn resolve_secret<'a>(
    signup_secret: Option<&'a str>,
    broker_secret: Option<&'a str>,
    session_secret: Option<&'a str>,
) -> Option<&'a str> {
    [signup_secret, broker_secret, session_secret]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
}

/// Issue a token valid for `ttl_seconds` from `now`.
///
/// ```
/// use artfulfam_core::crypto::signup_token::{self, SignupTokenClaims};
/// use chrono::Utc;
///
/// let claims = SignupTokenClaims {
///     shop: "artfulfam.myshopify.com".into(),
///     email: "parent@example.com".into(),
///     ..Default::default()
/// };
/// let now = Utc::now();
/// let token = signup_token::issue("secret", &claims, 900, now);
/// let payload = signup_token::verify("secret", &token, None, now).unwrap();
/// assert_eq!(payload.email, "parent@example.com");
/// assert!(!payload.allows_phone_capture());
/// ```
#[must_use]
pub fn issue(secret: &str, claims: &SignupTokenClaims, ttl_seconds: i64, now: DateTime<Utc>) -> String {
    let iat = now.timestamp();
    let payload = SignupTokenPayload {
        v: TOKEN_VERSION,
        iat,
        exp: iat + ttl_seconds,
        shop: claims.shop.clone(),
        email: claims.email.clone(),
        customer_id: claims.customer_id.clone().filter(|id| !id.is_empty()),
        allow_phone_capture: claims.allow_phone_capture.then_some(true),
    };

    // Serializing a struct of strings and integers cannot fail.
    let json = serde_json::to_vec(&payload).unwrap_or_default();
    let payload_b64 = URL_SAFE_NO_PAD.encode(json);
    let signature = sign_base64url(secret, &payload_b64);
    format!("{payload_b64}.{signature}")
}

/// Verify a token and return its payload.
///
/// Checks run in a fixed order: format, signature, payload decoding, version,
/// required fields, expiry, then shop binding when `expected_shop` is given.
///
/// # Errors
///
/// Returns the first [`SignupTokenError`] encountered.
pub fn verify(
    secret: &str,
    token: &str,
    expected_shop: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SignupTokenPayload, SignupTokenError> {
    let mut parts = token.split('.');
    let (Some(payload_b64), Some(signature), None) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(SignupTokenError::Format);
    };
    if payload_b64.is_empty() || signature.is_empty() {
        return Err(SignupTokenError::Format);
    }

    let expected = sign_base64url(secret, payload_b64);
    if !constant_time_eq(&expected, signature) {
        return Err(SignupTokenError::Signature);
    }

    let raw: RawPayload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(SignupTokenError::Payload)?;

    if raw.v.as_ref().and_then(serde_json::Value::as_u64) != Some(u64::from(TOKEN_VERSION)) {
        return Err(SignupTokenError::Version);
    }

    let shop = raw.shop.filter(|s| !s.is_empty()).ok_or(SignupTokenError::Payload)?;
    let email = raw.email.filter(|s| !s.is_empty()).ok_or(SignupTokenError::Payload)?;

    let exp = match raw.exp {
        Some(exp) if exp > now.timestamp() => exp,
        _ => return Err(SignupTokenError::Expired),
    };

    if expected_shop.is_some_and(|expected| !expected.is_empty() && expected != shop) {
        return Err(SignupTokenError::ShopMismatch);
    }

    Ok(SignupTokenPayload {
        v: TOKEN_VERSION,
        iat: raw.iat.unwrap_or_default(),
        exp,
        shop,
        email,
        customer_id: raw.customer_id,
        allow_phone_capture: raw.allow_phone_capture,
    })
}

/// The signature segment of a token, used as its identity in the replay ledger.
#[must_use]
pub fn signature_of(token: &str) -> Option<&str> {
    token.split_once('.').map(|(_, sig)| sig).filter(|s| !s.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "test-signup-secret";
    const SHOP: &str = "artfulfam.myshopify.com";

    fn claims(allow: bool) -> SignupTokenClaims {
        SignupTokenClaims {
            shop: SHOP.to_string(),
            email: "parent@example.com".to_string(),
            customer_id: Some("gid://shopify/Customer/42".to_string()),
            allow_phone_capture: allow,
        }
    }

    fn encode_payload(json: &str) -> String {
        let b64 = URL_SAFE_NO_PAD.encode(json);
        let sig = sign_base64url(SECRET, &b64);
        format!("{b64}.{sig}")
    }

    #[test]
    fn test_issue_then_verify_returns_claims() {
        let now = Utc::now();
        let token = issue(SECRET, &claims(true), DEFAULT_TTL_SECONDS, now);
        let payload = verify(SECRET, &token, Some(SHOP), now).unwrap();

        assert_eq!(payload.v, 1);
        assert_eq!(payload.shop, SHOP);
        assert_eq!(payload.email, "parent@example.com");
        assert_eq!(payload.customer_id.as_deref(), Some("gid://shopify/Customer/42"));
        assert!(payload.allows_phone_capture());
        assert_eq!(payload.exp - payload.iat, DEFAULT_TTL_SECONDS);
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let claims = SignupTokenClaims {
            shop: SHOP.to_string(),
            email: "a@b.co".to_string(),
            customer_id: None,
            allow_phone_capture: false,
        };
        let token = issue(SECRET, &claims, 60, Utc::now());
        let (b64, _) = token.split_once('.').unwrap();
        let json = String::from_utf8(URL_SAFE_NO_PAD.decode(b64).unwrap()).unwrap();

        assert!(!json.contains("customerId"));
        assert!(!json.contains("allowPhoneCapture"));
        assert!(json.contains("\"v\":1"));
    }

    #[test]
    fn test_expired_after_ttl() {
        let issued = Utc::now();
        let token = issue(SECRET, &claims(true), 1, issued);
        let later = issued + Duration::seconds(2);
        assert_eq!(
            verify(SECRET, &token, None, later),
            Err(SignupTokenError::Expired)
        );
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let issued = Utc::now();
        let token = issue(SECRET, &claims(false), 10, issued);
        assert!(verify(SECRET, &token, None, issued + Duration::seconds(9)).is_ok());
        assert_eq!(
            verify(SECRET, &token, None, issued + Duration::seconds(10)),
            Err(SignupTokenError::Expired)
        );
    }

    #[test]
    fn test_format_errors() {
        let now = Utc::now();
        for bad in ["", "nodot", "a.b.c", ".sig", "payload."] {
            assert_eq!(
                verify(SECRET, bad, None, now),
                Err(SignupTokenError::Format),
                "input {bad:?}"
            );
        }
    }

    #[test]
    fn test_wrong_secret() {
        let now = Utc::now();
        let token = issue(SECRET, &claims(true), 60, now);
        assert_eq!(
            verify("other-secret", &token, None, now),
            Err(SignupTokenError::Signature)
        );
    }

    #[test]
    fn test_any_single_char_change_fails() {
        let now = Utc::now();
        let token = issue(SECRET, &claims(true), 60, now);

        for i in 0..token.len() {
            let mut bytes = token.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            if tampered == token {
                continue;
            }
            assert!(
                verify(SECRET, &tampered, None, now).is_err(),
                "accepted tampered token at position {i}"
            );
        }
    }

    #[test]
    fn test_signed_garbage_payload() {
        let b64 = URL_SAFE_NO_PAD.encode("not json");
        let token = format!("{b64}.{}", sign_base64url(SECRET, &b64));
        assert_eq!(
            verify(SECRET, &token, None, Utc::now()),
            Err(SignupTokenError::Payload)
        );
    }

    #[test]
    fn test_unsupported_version() {
        let token = encode_payload(r#"{"v":2,"iat":0,"exp":9999999999,"shop":"s","email":"e"}"#);
        assert_eq!(
            verify(SECRET, &token, None, Utc::now()),
            Err(SignupTokenError::Version)
        );

        let token = encode_payload(r#"{"iat":0,"exp":9999999999,"shop":"s","email":"e"}"#);
        assert_eq!(
            verify(SECRET, &token, None, Utc::now()),
            Err(SignupTokenError::Version)
        );
    }

    #[test]
    fn test_missing_shop_or_email() {
        let token = encode_payload(r#"{"v":1,"iat":0,"exp":9999999999,"shop":"","email":"e"}"#);
        assert_eq!(
            verify(SECRET, &token, None, Utc::now()),
            Err(SignupTokenError::Payload)
        );

        let token = encode_payload(r#"{"v":1,"iat":0,"exp":9999999999,"shop":"s"}"#);
        assert_eq!(
            verify(SECRET, &token, None, Utc::now()),
            Err(SignupTokenError::Payload)
        );
    }

    #[test]
    fn test_missing_exp_is_expired() {
        let token = encode_payload(r#"{"v":1,"iat":0,"shop":"s","email":"e"}"#);
        assert_eq!(
            verify(SECRET, &token, None, Utc::now()),
            Err(SignupTokenError::Expired)
        );
    }

    #[test]
    fn test_shop_mismatch() {
        let now = Utc::now();
        let token = issue(SECRET, &claims(true), 60, now);
        assert_eq!(
            verify(SECRET, &token, Some("other.myshopify.com"), now),
            Err(SignupTokenError::ShopMismatch)
        );
        // An empty expected shop is treated as unset.
        assert!(verify(SECRET, &token, Some(""), now).is_ok());
    }

    #[test]
    fn test_resolve_secret_order() {
        assert_eq!(resolve_secret(Some("a"), Some("b"), Some("c")), Some("a"));
        assert_eq!(resolve_secret(Some(""), Some("b"), Some("c")), Some("b"));
        assert_eq!(resolve_secret(None, None, Some("c")), Some("c"));
        assert_eq!(resolve_secret(None, Some(""), None), None);
    }

    #[test]
    fn test_signature_of() {
        assert_eq!(signature_of("payload.sig"), Some("sig"));
        assert_eq!(signature_of("payload."), None);
        assert_eq!(signature_of("nodot"), None);
    }
}
