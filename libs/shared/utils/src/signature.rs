use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    Missing,
    Malformed,
    Mismatch,
}

/// Checks a `sha256=<hex>` header value against the HMAC-SHA256 of the raw
/// request body keyed with the shared app secret.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;

    let hex_digest = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::Malformed)?;

    let expected = hex::decode(hex_digest).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        SignatureError::Malformed
    })?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(body);

    mac.verify_slice(&expected).map_err(|_| {
        debug!("Webhook signature verification failed");
        SignatureError::Mismatch
    })
}

/// Constant-time equality for shared tokens. Both values are reduced to an
/// HMAC tag keyed with `expected` and the tags compared with `verify_slice`.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    let Ok(mut reference) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    reference.update(expected.as_bytes());
    let reference_tag = reference.finalize().into_bytes();

    let Ok(mut candidate) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    candidate.update(presented.as_bytes());
    candidate.verify_slice(&reference_tag).is_ok()
}

/// Produces the header value a sender would attach for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn signed_body_verifies() {
        let header = sign("secret", b"{\"a\":1}");
        assert!(verify_signature("secret", b"{\"a\":1}", Some(&header)).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign("secret", b"{\"a\":1}");
        assert_matches!(
            verify_signature("secret", b"{\"a\":2}", Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = sign("other", b"body");
        assert_matches!(verify_signature("secret", b"body", Some(&header)), Err(SignatureError::Mismatch));
    }

    #[test]
    fn tokens_match_only_on_exact_value() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3cre"));
        assert!(!tokens_match("s3cret", "s3cret "));
        assert!(!tokens_match("s3cret", "S3CRET"));
        assert!(!tokens_match("s3cret", ""));
    }

    #[test]
    fn missing_or_malformed_headers_are_rejected() {
        assert_matches!(verify_signature("secret", b"body", None), Err(SignatureError::Missing));
        assert_matches!(verify_signature("secret", b"body", Some("md5=abc")), Err(SignatureError::Malformed));
        assert_matches!(verify_signature("secret", b"body", Some("sha256=zz")), Err(SignatureError::Malformed));
    }
}
