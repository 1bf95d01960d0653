//! PKCE helpers (RFC 7636).

use sha2::{Digest, Sha256};

use super::random_alphanumeric;

const VERIFIER_LENGTH: usize = 64;

pub(crate) fn generate_code_verifier() -> String {
    random_alphanumeric(VERIFIER_LENGTH)
}

/// S256 challenge: base64url(sha256(verifier)) without padding.
pub(crate) fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::encode_config(digest, base64::URL_SAFE_NO_PAD)
}
