use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate a base64 (standard alphabet, padded) HMAC-SHA256 signature.
///
/// The message is the concatenation of `parts` in order, with no separator.
pub fn generate_signature(secret: &[u8], parts: &[&[u8]]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    for part in parts {
        mac.update(part);
    }

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a base64 HMAC-SHA256 signature using constant-time comparison.
pub fn verify_signature(
    secret: &[u8],
    parts: &[&[u8]],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected_signature = generate_signature(secret, parts)?;
    Ok(constant_time_eq(
        expected_signature.as_bytes(),
        signature.as_bytes(),
    ))
}

/// Length-checked constant-time byte comparison.
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }

    expected.ct_eq(provided).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"my_secret_key";
    const TIMESTAMP: &[u8] = b"1678886400";
    const BODY: &[u8] = br#"{"foo":"bar"}"#;

    #[test]
    fn test_signature_generation_and_verification() {
        let signature = generate_signature(SECRET, &[TIMESTAMP, BODY]).unwrap();
        assert!(!signature.is_empty());

        let is_valid = verify_signature(SECRET, &[TIMESTAMP, BODY], &signature).unwrap();
        assert!(is_valid);
    }

    #[test]
    fn test_parts_are_concatenated() {
        let split = generate_signature(SECRET, &[TIMESTAMP, BODY]).unwrap();
        let joined = generate_signature(SECRET, &[[TIMESTAMP, BODY].concat().as_slice()]).unwrap();
        assert_eq!(split, joined);
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2, base64 encoded.
        let signature =
            generate_signature(b"Jefe", &[b"what do ya want ", b"for nothing?"]).unwrap();
        assert_eq!(signature, "W9zBRr9gdU5qBCQmCJV1x1oAPwidJzmDnexYuWTsOEM=");
    }

    #[test]
    fn test_invalid_signature() {
        let signature = generate_signature(SECRET, &[TIMESTAMP, BODY]).unwrap();
        let first = if signature.starts_with('A') { 'B' } else { 'A' };
        let invalid_signature = format!("{}{}", first, &signature[1..]);
        assert_ne!(invalid_signature, signature);

        let is_valid = verify_signature(SECRET, &[TIMESTAMP, BODY], &invalid_signature).unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn test_tampered_body() {
        let signature = generate_signature(SECRET, &[TIMESTAMP, BODY]).unwrap();

        let is_valid =
            verify_signature(SECRET, &[TIMESTAMP, br#"{"foo":"baz"}"#], &signature).unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn test_wrong_secret() {
        let signature = generate_signature(SECRET, &[TIMESTAMP, BODY]).unwrap();

        let is_valid = verify_signature(b"other_secret", &[TIMESTAMP, BODY], &signature).unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn test_constant_time_eq_length_mismatch() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(!constant_time_eq(b"", b"a"));
    }
}
