//! Signing and verification primitives.
//!
//! # Wire formats
//!
//! | Use | Message | Encoding |
//! |-----|---------|----------|
//! | Shopify OAuth callback | sorted `k=v` pairs joined by `&`, without `hmac`/`signature` | hex |
//! | Broker request | `{timestamp}.[{shop}.]{body}` | hex |
//! | Signup token | base64url JSON payload | base64url |
//!
//! All comparisons are length-checked and constant-time.

pub mod broker;
pub mod hmac;
pub mod pkce;
pub mod signup_token;

pub use broker::{
    BrokerAuthError, BrokerSignature, DEFAULT_MAX_SKEW_MS, ReceivedHeaders, SHOP_HEADER,
    SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use hmac::{constant_time_eq, sign_base64url, sign_hex, verify_hex, verify_query_hmac};
pub use pkce::{PkcePair, random_token};
pub use signup_token::{SignupTokenClaims, SignupTokenError, SignupTokenPayload};
