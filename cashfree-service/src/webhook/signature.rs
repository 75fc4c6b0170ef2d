//! HMAC-SHA256 signatures over `timestamp || raw_body`.

use service_core::utils::signature::{generate_signature, verify_signature};

/// Signature Cashfree would send for this delivery.
pub fn sign(secret: &str, timestamp: &str, raw_body: &[u8]) -> anyhow::Result<String> {
    generate_signature(secret.as_bytes(), &[timestamp.as_bytes(), raw_body])
}

/// Check `signature` against the expected value in constant time.
///
/// Any mismatch, including a malformed signature, is `false`.
pub fn verify(signature: &str, timestamp: &str, raw_body: &[u8], secret: &str) -> bool {
    verify_signature(secret.as_bytes(), &[timestamp.as_bytes(), raw_body], signature)
        .unwrap_or(false)
}
