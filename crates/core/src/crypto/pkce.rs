//! PKCE verifier/challenge pairs and random OAuth state values.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Generate `bytes` cryptographically random bytes, base64url-encoded.
///
/// Used for OAuth `state`, OpenID `nonce` and PKCE verifiers.
#[must_use]
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// A PKCE code verifier and its S256 challenge.
#[derive(Clone)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Verifier entropy in bytes (43 base64url characters).
    pub const VERIFIER_BYTES: usize = 32;

    /// Generate a fresh pair.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(random_token(Self::VERIFIER_BYTES))
    }

    /// Derive the challenge for a known verifier.
    #[must_use]
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"[REDACTED]")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// `base64url(sha256(verifier))`, the `S256` code challenge method.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b() {
        let pair =
            PkcePair::from_verifier("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_string());
        assert_eq!(pair.challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn test_random_token_length_and_alphabet() {
        let token = random_token(32);
        assert_eq!(token.len(), 43);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );

        assert_eq!(random_token(16).len(), 22);
    }

    #[test]
    fn test_random_tokens_differ() {
        assert_ne!(random_token(16), random_token(16));
    }

    #[test]
    fn test_generated_pair_is_consistent() {
        let pair = PkcePair::generate();
        assert_eq!(pair.verifier.len(), 43);
        assert_eq!(pair.challenge, challenge_for(&pair.verifier));
    }

    #[test]
    fn test_debug_redacts_verifier() {
        let pair = PkcePair::from_verifier("super-secret-verifier".to_string());
        let debug = format!("{pair:?}");
        assert!(!debug.contains("super-secret-verifier"));
    }
}
