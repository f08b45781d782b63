//! Signing helpers for testing the broker by hand.
//!
//! # Environment Variables
//!
//! - `SIGNUP_TOKEN_SECRET`, then `BROKER_SHARED_SECRET`, then `SESSION_SECRET` - signup tokens
//! - `BROKER_SHARED_SECRET` - request signatures

use artfulfam_core::ShopDomain;
use artfulfam_core::crypto::signup_token;
use artfulfam_core::crypto::{BrokerSignature, SignupTokenClaims};
use chrono::Utc;

use super::{EnvError, first_env};

fn signup_secret() -> Result<String, EnvError> {
    let signup = first_env(&["SIGNUP_TOKEN_SECRET"]);
    let shared = first_env(&["BROKER_SHARED_SECRET"]);
    let session = first_env(&["SESSION_SECRET"]);
    signup_token::resolve_secret(signup.as_deref(), shared.as_deref(), session.as_deref())
        .map(str::to_string)
        .ok_or(EnvError::Missing("SIGNUP_TOKEN_SECRET"))
}

/// Print a signup token.
///
/// # Errors
///
/// Returns an error if no signing secret is set or the shop is empty.
pub fn issue_signup_token(
    shop: &str,
    email: &str,
    customer_id: Option<String>,
    allow_phone_capture: bool,
    ttl_seconds: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let secret = signup_secret()?;
    let claims = SignupTokenClaims {
        shop: ShopDomain::normalize(shop)?.to_string(),
        email: email.trim().to_lowercase(),
        customer_id,
        allow_phone_capture,
    };
    let token = signup_token::issue(&secret, &claims, ttl_seconds, Utc::now());

    #[allow(clippy::print_stdout)]
    {
        println!("{token}");
    }
    Ok(())
}

/// Verify a signup token and print its payload as JSON.
///
/// # Errors
///
/// Returns the verification error, or an error if no secret is set.
pub fn verify_signup_token(token: &str, shop: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let secret = signup_secret()?;
    let shop = shop.map(ShopDomain::normalize).transpose()?;
    let payload = signup_token::verify(
        &secret,
        token.trim(),
        shop.as_ref().map(ShopDomain::as_str),
        Utc::now(),
    )?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

/// Print the `x-broker-*` headers for `body`, signed now.
///
/// # Errors
///
/// Returns an error if `BROKER_SHARED_SECRET` is not set.
pub fn broker_headers(body: &str, shop: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let secret = first_env(&["BROKER_SHARED_SECRET"]).ok_or(EnvError::Missing("BROKER_SHARED_SECRET"))?;
    let shop = shop.map(ShopDomain::normalize).transpose()?;
    let signature = BrokerSignature::sign(
        &secret,
        body,
        Utc::now().timestamp_millis(),
        shop.as_ref().map(ShopDomain::as_str),
    );

    #[allow(clippy::print_stdout)]
    for (name, value) in signature.headers() {
        println!("{name}: {value}");
    }
    Ok(())
}
