//! PKCE verifier and challenge generation

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Length of generated code verifiers.
pub const VERIFIER_LEN: usize = 64;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are rejected so each character is equally likely.
const ACCEPT_BELOW: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// Generate a random alphanumeric string of `len` characters.
pub fn random_string(len: usize) -> Result<String> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while out.len() < len {
        getrandom::getrandom(&mut buf).context("Failed to read system randomness")?;
        for &b in buf.iter().filter(|&&b| b < ACCEPT_BELOW) {
            if out.len() == len {
                break;
            }
            out.push(ALPHABET[(b as usize) % ALPHABET.len()] as char);
        }
    }

    Ok(out)
}

/// Generate a fresh code verifier.
pub fn generate_verifier() -> Result<String> {
    random_string(VERIFIER_LEN)
}

/// S256 challenge: unpadded URL-safe base64 of SHA-256(verifier).
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_is_alphanumeric_and_long_enough() {
        let verifier = generate_verifier().unwrap();
        assert_eq!(verifier.len(), VERIFIER_LEN);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_verifiers_differ() {
        assert_ne!(generate_verifier().unwrap(), generate_verifier().unwrap());
    }

    #[test]
    fn test_accept_threshold() {
        assert_eq!(ACCEPT_BELOW, 248);
    }

    #[test]
    fn test_challenge_known_vector() {
        // RFC 7636 appendix B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            challenge_for(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_challenge_is_base64url_no_pad() {
        let challenge = challenge_for(&generate_verifier().unwrap());
        assert_eq!(challenge.len(), 43);
        assert!(!challenge.contains('+'));
        assert!(!challenge.contains('/'));
        assert!(!challenge.contains('='));
    }
}
