//! HMAC-SHA256 verification of inbound gateway webhooks.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Webhook secret is not configured")]
    EmptySecret,
    #[error("Signature is not valid hex")]
    Malformed,
    #[error("Signature does not match payload")]
    Mismatch,
}

/// Hex-encoded HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    Ok(hex::encode(mac_bytes(secret, body)?))
}

/// Checks a hex signature against the raw request body in constant time.
/// Accepts an optional `sha256=` prefix.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let signature = signature.trim();
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);
    let provided = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

    let expected = mac_bytes(secret, body)?;
    if expected.ct_eq(provided.as_slice()).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn mac_bytes(secret: &[u8], body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::EmptySecret)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";

    #[test]
    fn test_sign_then_verify() {
        let body = br#"{"status":"success","tx_ref":"nook_txn_abc_1"}"#;
        let signature = sign(SECRET, body).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify(SECRET, body, &signature).is_ok());
        assert!(verify(SECRET, body, &format!("sha256={}", signature)).is_ok());
        assert!(verify(SECRET, body, &signature.to_uppercase()).is_ok());
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signature = sign(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let signature = sign(SECRET, b"{\"status\":\"failed\"}").unwrap();
        assert_eq!(
            verify(SECRET, b"{\"status\":\"success\"}", &signature),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_garbage_signature() {
        assert_eq!(verify(SECRET, b"{}", "zz-not-hex"), Err(SignatureError::Malformed));
        assert_eq!(verify(SECRET, b"{}", "abcd"), Err(SignatureError::Mismatch));
        assert_eq!(verify(b"", b"{}", "abcd"), Err(SignatureError::EmptySecret));
    }
}
