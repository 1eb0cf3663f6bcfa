//! Session checksum generation for the Kite Connect token exchange.

use sha2::{Digest, Sha256};

/// Compute the checksum Kite requires when exchanging a request token for an
/// access token: `SHA-256(api_key + request_token + api_secret)`, hex-encoded.
///
/// The surrounding login flow (browser redirect, token storage) is owned by
/// an external collaborator; this helper exists so a session can be minted
/// from a request token without another dependency.
pub fn session_checksum(api_key: &str, request_token: &str, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_checksum() {
        // SHA-256("abc") — classic NIST test vector, split across the inputs.
        let sum = session_checksum("a", "b", "c");
        assert_eq!(
            sum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
