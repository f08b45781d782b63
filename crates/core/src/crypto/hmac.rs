//! HMAC-SHA256 signing and constant-time verification.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters Shopify excludes from its callback signature.
const UNSIGNED_PARAMS: [&str; 2] = ["hmac", "signature"];

#[allow(clippy::missing_panics_doc)] // HMAC accepts any key size, so this never panics
fn digest(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Compute `HMAC-SHA256(secret, message)` as lowercase hex.
///
/// ```
/// use artfulfam_core::crypto::sign_hex;
///
/// assert_eq!(
///     sign_hex("key", "message"),
///     "6e9ef29b75fffc5b7abae527d58fdadb2fe42e7219011976917343065f58ed4a"
/// );
/// ```
#[must_use]
pub fn sign_hex(secret: &str, message: &str) -> String {
    hex::encode(digest(secret.as_bytes(), message.as_bytes()))
}

/// Compute `HMAC-SHA256(secret, message)` as unpadded URL-safe base64.
#[must_use]
pub fn sign_base64url(secret: &str, message: &str) -> String {
    URL_SAFE_NO_PAD.encode(digest(secret.as_bytes(), message.as_bytes()))
}

/// Compare two strings without short-circuiting on the first difference.
///
/// Lengths are compared first; a length mismatch is rejected immediately since
/// digest lengths are public.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Verify a hex digest produced by [`sign_hex`].
#[must_use]
pub fn verify_hex(secret: &str, message: &str, candidate: &str) -> bool {
    constant_time_eq(&sign_hex(secret, message), candidate)
}

/// Build the message Shopify signs for an OAuth callback.
///
/// Drops `hmac` and `signature`, sorts by key, and joins `k=v` pairs with `&`.
#[must_use]
pub fn callback_message<'a, I>(params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = params
        .into_iter()
        .filter(|(k, _)| !UNSIGNED_PARAMS.contains(k))
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Verify the `hmac` parameter of a Shopify OAuth callback query.
///
/// Returns `false` when `hmac` is absent.
#[must_use]
pub fn verify_query_hmac<'a, I>(secret: &str, params: I) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)> + Clone,
{
    let Some(provided) = params
        .clone()
        .into_iter()
        .find_map(|(k, v)| (k == "hmac").then_some(v))
    else {
        return false;
    };

    verify_hex(secret, &callback_message(params), provided)
}
