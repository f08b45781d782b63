//! Storefront-to-broker request signing.
//!
//! The storefront signs the raw JSON body it sends to the broker:
//!
//! ```text
//! X-Broker-Timestamp: <unix millis>
//! X-Broker-Shop:      <shop domain>            (optional)
//! X-Broker-Signature: hex(hmac_sha256(secret, "{ts}.{shop}.{body}"))
//! ```
//!
//! When no shop header is sent the message is `"{ts}.{body}"`.

use super::hmac::{sign_hex, verify_hex};

pub const TIMESTAMP_HEADER: &str = "x-broker-timestamp";
pub const SIGNATURE_HEADER: &str = "x-broker-signature";
pub const SHOP_HEADER: &str = "x-broker-shop";

/// Accepted clock difference between signer and verifier.
pub const DEFAULT_MAX_SKEW_MS: i64 = 5 * 60 * 1000;

/// Reasons a broker request fails authentication.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerAuthError {
    #[error("Missing broker auth headers")]
    MissingHeaders,
    #[error("Invalid broker timestamp")]
    InvalidTimestamp,
    #[error("Broker request timestamp out of range")]
    TimestampOutOfRange,
    #[error("Invalid broker signature")]
    InvalidSignature,
}

/// Header values for one signed broker request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSignature {
    pub timestamp: String,
    pub signature: String,
    pub shop: Option<String>,
}

fn message(timestamp: &str, shop: Option<&str>, body: &str) -> String {
    match shop {
        Some(shop) => format!("{timestamp}.{shop}.{body}"),
        None => format!("{timestamp}.{body}"),
    }
}

impl BrokerSignature {
    /// Sign `body` at `timestamp_ms`, binding `shop` when given.
    #[must_use]
    pub fn sign(secret: &str, body: &str, timestamp_ms: i64, shop: Option<&str>) -> Self {
        let shop = shop.filter(|s| !s.is_empty());
        let timestamp = timestamp_ms.to_string();
        let signature = sign_hex(secret, &message(&timestamp, shop, body));
        Self {
            timestamp,
            signature,
            shop: shop.map(str::to_string),
        }
    }

    /// `(header name, value)` pairs to attach to the request.
    pub fn headers(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            Some((TIMESTAMP_HEADER, self.timestamp.as_str())),
            Some((SIGNATURE_HEADER, self.signature.as_str())),
            self.shop.as_deref().map(|shop| (SHOP_HEADER, shop)),
        ]
        .into_iter()
        .flatten()
    }
}

/// Header values received with a broker request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceivedHeaders<'a> {
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub shop: Option<&'a str>,
}

/// Verify a signed broker request against its raw body.
///
/// # Errors
///
/// Returns a [`BrokerAuthError`] when a header is missing, the timestamp is
/// unparseable or more than `max_skew_ms` away from `now_ms`, or the
/// signature does not match.
pub fn verify(
    secret: &str,
    body: &str,
    headers: ReceivedHeaders<'_>,
    now_ms: i64,
    max_skew_ms: i64,
) -> Result<(), BrokerAuthError> {
    let (Some(timestamp), Some(signature)) = (
        headers.timestamp.filter(|s| !s.is_empty()),
        headers.signature.filter(|s| !s.is_empty()),
    ) else {
        return Err(BrokerAuthError::MissingHeaders);
    };

    let timestamp_ms: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| BrokerAuthError::InvalidTimestamp)?;

    if now_ms.abs_diff(timestamp_ms) > max_skew_ms.unsigned_abs() {
        return Err(BrokerAuthError::TimestampOutOfRange);
    }

    let shop = headers.shop.filter(|s| !s.is_empty());
    if !verify_hex(secret, &message(timestamp, shop, body), signature) {
        return Err(BrokerAuthError::InvalidSignature);
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "broker-shared-secret";
    const BODY: &str = r#"{"email":"parent@example.com"}"#;
    const NOW: i64 = 1_760_000_000_000;

    fn received(sig: &BrokerSignature) -> ReceivedHeaders<'_> {
        ReceivedHeaders {
            timestamp: Some(&sig.timestamp),
            signature: Some(&sig.signature),
            shop: sig.shop.as_deref(),
        }
    }

    #[test]
    fn test_sign_and_verify_with_shop() {
        let sig = BrokerSignature::sign(SECRET, BODY, NOW, Some("shop.myshopify.com"));
        assert_eq!(
            sig.signature,
            sign_hex(SECRET, &format!("{NOW}.shop.myshopify.com.{BODY}"))
        );
        assert!(verify(SECRET, BODY, received(&sig), NOW, DEFAULT_MAX_SKEW_MS).is_ok());
    }

    #[test]
    fn test_sign_and_verify_without_shop() {
        let sig = BrokerSignature::sign(SECRET, BODY, NOW, None);
        assert_eq!(sig.signature, sign_hex(SECRET, &format!("{NOW}.{BODY}")));
        assert_eq!(sig.headers().count(), 2);
        assert!(verify(SECRET, BODY, received(&sig), NOW, DEFAULT_MAX_SKEW_MS).is_ok());
    }

    #[test]
    fn test_headers_include_shop() {
        let sig = BrokerSignature::sign(SECRET, BODY, NOW, Some("s.myshopify.com"));
        let headers: Vec<_> = sig.headers().collect();
        assert!(headers.contains(&(SHOP_HEADER, "s.myshopify.com")));
        assert!(headers.contains(&(TIMESTAMP_HEADER, "1760000000000")));
    }

    #[test]
    fn test_missing_headers() {
        let err = verify(SECRET, BODY, ReceivedHeaders::default(), NOW, DEFAULT_MAX_SKEW_MS);
        assert_eq!(err, Err(BrokerAuthError::MissingHeaders));
    }

    #[test]
    fn test_invalid_timestamp() {
        let headers = ReceivedHeaders {
            timestamp: Some("yesterday"),
            signature: Some("abc"),
            shop: None,
        };
        assert_eq!(
            verify(SECRET, BODY, headers, NOW, DEFAULT_MAX_SKEW_MS),
            Err(BrokerAuthError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_skew_window() {
        let inside = BrokerSignature::sign(SECRET, BODY, NOW - DEFAULT_MAX_SKEW_MS, None);
        assert!(verify(SECRET, BODY, received(&inside), NOW, DEFAULT_MAX_SKEW_MS).is_ok());

        let past = BrokerSignature::sign(SECRET, BODY, NOW - DEFAULT_MAX_SKEW_MS - 1, None);
        assert_eq!(
            verify(SECRET, BODY, received(&past), NOW, DEFAULT_MAX_SKEW_MS),
            Err(BrokerAuthError::TimestampOutOfRange)
        );

        let future = BrokerSignature::sign(SECRET, BODY, NOW + DEFAULT_MAX_SKEW_MS + 1, None);
        assert_eq!(
            verify(SECRET, BODY, received(&future), NOW, DEFAULT_MAX_SKEW_MS),
            Err(BrokerAuthError::TimestampOutOfRange)
        );
    }

    #[test]
    fn test_tampered_body_or_shop() {
        let sig = BrokerSignature::sign(SECRET, BODY, NOW, Some("a.myshopify.com"));

        assert_eq!(
            verify(SECRET, r#"{"email":"x@y.z"}"#, received(&sig), NOW, DEFAULT_MAX_SKEW_MS),
            Err(BrokerAuthError::InvalidSignature)
        );

        let mut swapped = received(&sig);
        swapped.shop = Some("b.myshopify.com");
        assert_eq!(
            verify(SECRET, BODY, swapped, NOW, DEFAULT_MAX_SKEW_MS),
            Err(BrokerAuthError::InvalidSignature)
        );

        // A shop-bound signature is not valid once the shop header is dropped.
        let mut dropped = received(&sig);
        dropped.shop = None;
        assert_eq!(
            verify(SECRET, BODY, dropped, NOW, DEFAULT_MAX_SKEW_MS),
            Err(BrokerAuthError::InvalidSignature)
        );
    }

    #[test]
    fn test_wrong_secret() {
        let sig = BrokerSignature::sign(SECRET, BODY, NOW, None);
        assert_eq!(
            verify("other", BODY, received(&sig), NOW, DEFAULT_MAX_SKEW_MS),
            Err(BrokerAuthError::InvalidSignature)
        );
    }
}
