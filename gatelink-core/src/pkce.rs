//! PKCE (Proof Key for Code Exchange) primitives per RFC 7636.
//!
//! Generates the code verifier, the S256 code challenge, and the anti-CSRF
//! state value used by the Authorization Code flow. The verifier is kept
//! client-side and sent during token exchange; the challenge is included in
//! the authorization URL so the authorization server can verify that the
//! exchange request came from the party that initiated the flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::PlatformConfig;

/// Length of the generated code verifier in characters.
pub const VERIFIER_LENGTH: usize = 64;

/// Generate a cryptographically random PKCE code verifier.
///
/// Produces a 64-character string from `[A-Za-z0-9]`, within the 43-128
/// character range RFC 7636 requires.
pub fn generate_verifier() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..VERIFIER_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Derive the anti-CSRF state value for an authorization request.
///
/// The state binds the verifier to the authorization endpoint, the client,
/// and the moment the flow was initiated:
/// `state = BASE64URL(SHA256("{verifier}:{auth_endpoint}:{client_id}:{unix_ts}"))`
///
/// The authorization server returns it unchanged in the callback, where it
/// is compared against the persisted copy.
pub fn derive_state(
    verifier: &str,
    auth_endpoint: &str,
    client_id: &str,
    timestamp: i64,
) -> String {
    let material = format!("{verifier}:{auth_endpoint}:{client_id}:{timestamp}");
    let hash = Sha256::digest(material.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the full authorization URL for the user's browser.
///
/// Carries `response_type=code`, the client id, the S256 challenge, the
/// redirect URI, and the state value.
pub fn build_authorization_url(
    config: &PlatformConfig,
    challenge: &str,
    state: &str,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(&config.authorize_endpoint())?;
    url.query_pairs_mut()
        .append_pair("state", state)
        .append_pair("response_type", "code")
        .append_pair("client_id", &config.client_id)
        .append_pair("code_challenge", challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("redirect_uri", &config.redirect_uri);
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PlatformConfig {
        PlatformConfig::for_platform("https://platform.example.com")
    }

    #[test]
    fn verifier_has_expected_length_and_charset() {
        let verifier = generate_verifier();
        assert_eq!(verifier.len(), VERIFIER_LENGTH);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn verifiers_are_unique() {
        let a = generate_verifier();
        let b = generate_verifier();
        assert_ne!(a, b, "two verifiers must not collide");
    }

    #[test]
    fn challenge_is_deterministic() {
        let c1 = compute_challenge("test-verifier-value");
        let c2 = compute_challenge("test-verifier-value");
        assert_eq!(c1, c2);
    }

    #[test]
    fn challenge_matches_known_value() {
        // Pre-computed: SHA256("hello") base64url-encoded without padding.
        let challenge = compute_challenge("hello");
        assert_eq!(challenge, "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ");
    }

    #[test]
    fn challenge_round_trips_from_stored_verifier() {
        // A verifier-only party must be able to recompute the challenge
        // sent at authorization time from the stored verifier alone.
        let verifier = generate_verifier();
        let at_challenge_time = compute_challenge(&verifier);
        let recomputed = compute_challenge(&verifier);
        assert_eq!(at_challenge_time, recomputed);

        let decoded = URL_SAFE_NO_PAD
            .decode(&at_challenge_time)
            .expect("valid base64url");
        assert_eq!(decoded.len(), 32, "SHA-256 digest must be 32 bytes");
    }

    #[test]
    fn state_depends_on_every_input() {
        let base = derive_state("v", "https://a/oauth/authorize", "client", 1000);
        assert_ne!(base, derive_state("w", "https://a/oauth/authorize", "client", 1000));
        assert_ne!(base, derive_state("v", "https://b/oauth/authorize", "client", 1000));
        assert_ne!(base, derive_state("v", "https://a/oauth/authorize", "other", 1000));
        assert_ne!(base, derive_state("v", "https://a/oauth/authorize", "client", 1001));
    }

    #[test]
    fn authorization_url_contains_required_params() {
        let config = test_config();
        let challenge = compute_challenge("test-verifier");
        let url = build_authorization_url(&config, &challenge, "test-state-123").unwrap();

        assert!(url.starts_with(&config.authorize_endpoint()));
        assert!(url.contains("response_type=code"));
        assert!(url.contains(&format!("client_id={}", config.client_id)));
        assert!(url.contains(&format!("code_challenge={challenge}")));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state=test-state-123"));
        assert!(url.contains("redirect_uri="));
    }
}
