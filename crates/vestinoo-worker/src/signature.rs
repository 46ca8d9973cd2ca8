use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::util::{hex_decode, hex_encode};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `message`.
pub fn sign_hex(key: &[u8], message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(message);
    Some(hex_encode(&mac.finalize().into_bytes()))
}

/// Constant-time check of a hex-encoded HMAC-SHA256 signature.
pub fn verify_hex(key: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Some(expected) = hex_decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2.
        let sig = sign_hex(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verifies_and_rejects() {
        let sig = sign_hex(b"secret", b"body").unwrap();
        assert!(verify_hex(b"secret", b"body", &sig));
        assert!(verify_hex(b"secret", b"body", &sig.to_uppercase()));
        assert!(!verify_hex(b"secret", b"body!", &sig));
        assert!(!verify_hex(b"other", b"body", &sig));
        assert!(!verify_hex(b"secret", b"body", "not-hex"));
        assert!(!verify_hex(b"secret", b"body", &sig[..10]));
    }
}
