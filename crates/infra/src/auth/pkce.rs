//! PKCE (Proof Key for Code Exchange, RFC 7636) values for the
//! authorization-code flow.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// 32 random bytes, base64url encoded (43 characters).
fn random_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`.
pub fn code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Verifier, challenge and CSRF state for one login attempt.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Kept secret until the code exchange
    pub code_verifier: String,
    pub code_challenge: String,
    /// Must come back unchanged on the callback
    pub state: String,
}

impl PkceChallenge {
    pub const METHOD: &'static str = "S256";

    pub fn generate() -> Self {
        let code_verifier = random_token();
        let code_challenge = code_challenge(&code_verifier);
        Self { code_verifier, code_challenge, state: random_token() }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::pkce.
    use super::*;

    /// Validates `PkceChallenge::generate` behavior for the fresh challenge
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures the verifier length is within the 43-128 range.
    /// - Ensures values are base64url without padding.
    /// - Ensures two challenges never share a verifier or state.
    #[test]
    fn test_generate_pkce_challenge() {
        let first = PkceChallenge::generate();
        let second = PkceChallenge::generate();

        assert!((43..=128).contains(&first.code_verifier.len()));
        for value in [&first.code_verifier, &first.code_challenge, &first.state] {
            assert!(!value.contains(['=', '+', '/']), "not base64url: {value}");
        }
        assert_ne!(first.code_verifier, second.code_verifier);
        assert_ne!(first.state, second.state);
    }

    /// Validates `code_challenge` behavior for the RFC 7636 appendix B
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the published verifier maps to the published challenge.
    #[test]
    fn test_code_challenge_known_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }
}
