//! Proof Key for Code Exchange ([RFC 7636]).
//!
//! A public client cannot keep a secret, so every login attempt generates a
//! one-time verifier. Only its hash, the challenge, travels with the
//! authorization request; the verifier itself is revealed once when the code
//! is exchanged for tokens.
//!
//! [RFC 7636]: https://www.rfc-editor.org/rfc/rfc7636

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{distributions::Slice, Rng};
use sha2::{Digest, Sha256};

/// Characters allowed in a verifier: the unreserved URI characters.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Verifier length used when none is specified.
pub const DEFAULT_VERIFIER_LENGTH: usize = 64;

/// Challenge method sent along with the challenge.
pub const CHALLENGE_METHOD: &str = "S256";

/// Generates a verifier of `length` characters from a cryptographically
/// secure random source.
///
/// # Panics
///
/// Panics if `length` is outside the 43 to 128 characters the RFC allows.
#[must_use]
pub fn verifier(length: usize) -> String {
    assert!(
        (43..=128).contains(&length),
        "verifier length {length} out of range"
    );

    let alphabet = Slice::new(ALPHABET).expect("alphabet is empty");
    rand::thread_rng()
        .sample_iter(alphabet)
        .take(length)
        .map(|&byte| char::from(byte))
        .collect()
}

/// Derives the S256 challenge: unpadded base64url of the SHA-256 digest.
#[must_use]
pub fn challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifier_has_requested_length_and_alphabet() {
        let verifier = verifier(DEFAULT_VERIFIER_LENGTH);

        assert_eq!(verifier.len(), 64);
        assert!(verifier.bytes().all(|byte| ALPHABET.contains(&byte)));
    }

    #[test]
    fn verifiers_are_unique() {
        assert_ne!(verifier(64), verifier(64));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn short_verifier_is_refused() {
        let _ = verifier(42);
    }

    #[test]
    fn challenge_matches_rfc_example() {
        // Appendix B of RFC 7636.
        let challenge = challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
        assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
    }

    #[test]
    fn challenge_has_no_padding() {
        assert!(!challenge(&verifier(64)).contains('='));
    }
}
