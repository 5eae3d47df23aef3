//! PKCE (Proof Key for Code Exchange)
//!
//! Implements the S256 method of RFC 7636. The `plain` method is refused.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Supported code challenge methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    S256,
}

impl ChallengeMethod {
    /// Parse the `code_challenge_method` parameter.
    ///
    /// An absent method means `plain` per RFC 7636 and is rejected like any
    /// other unsupported value.
    pub fn parse(method: Option<&str>) -> Option<Self> {
        match method {
            Some("S256") => Some(ChallengeMethod::S256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeMethod::S256 => "S256",
        }
    }
}

/// PKCE code verifier and challenge pair
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// The code verifier (kept secret, sent in token exchange)
    pub verifier: String,
    /// The code challenge (sent in authorization request)
    pub challenge: String,
    pub method: ChallengeMethod,
}

impl PkceChallenge {
    /// Generate a new verifier/challenge pair
    pub fn generate() -> Self {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        let verifier = URL_SAFE_NO_PAD.encode(random_bytes);
        let challenge = s256_challenge(&verifier);

        Self {
            verifier,
            challenge,
            method: ChallengeMethod::S256,
        }
    }
}

/// `BASE64URL(SHA256(verifier))`
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// RFC 7636 §4.1: 43-128 characters from the unreserved set
pub fn is_valid_verifier(verifier: &str) -> bool {
    (43..=128).contains(&verifier.len())
        && verifier
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Verify a verifier against a stored challenge in constant time
pub fn verify(verifier: &str, challenge: &str, method: ChallengeMethod) -> bool {
    if !is_valid_verifier(verifier) {
        return false;
    }
    let computed = match method {
        ChallengeMethod::S256 => s256_challenge(verifier),
    };
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}
