//! # HMAC-SHA256
//!
//! Message authentication for envelopes. Verification is constant time.

use crate::CryptoError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8; 32], parts: &[&[u8]]) -> Result<[u8; 32], CryptoError> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Verify an HMAC-SHA256 tag in constant time.
///
/// # Errors
///
/// `CryptoError::MacMismatch` if the tag does not match.
pub fn verify_hmac_sha256(
    key: &[u8; 32],
    parts: &[&[u8]],
    expected: &[u8],
) -> Result<(), CryptoError> {
    let mut mac = keyed(key)?;
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(expected)
        .map_err(|_| CryptoError::MacMismatch)
}

fn keyed(key: &[u8; 32]) -> Result<HmacSha256, CryptoError> {
    <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidPrivateKey(format!("hmac key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_own_tag() {
        let key = [7u8; 32];
        let tag = hmac_sha256(&key, &[b"iv", b"payload"]).unwrap();
        assert!(verify_hmac_sha256(&key, &[b"iv", b"payload"], &tag).is_ok());
    }

    #[test]
    fn test_verify_rejects_modified_input() {
        let key = [7u8; 32];
        let tag = hmac_sha256(&key, &[b"iv", b"payload"]).unwrap();
        assert!(matches!(
            verify_hmac_sha256(&key, &[b"iv", b"payloae"], &tag),
            Err(CryptoError::MacMismatch)
        ));
    }

    #[test]
    fn test_verify_rejects_wrong_key_and_short_tag() {
        let tag = hmac_sha256(&[1u8; 32], &[b"data"]).unwrap();
        assert!(verify_hmac_sha256(&[2u8; 32], &[b"data"], &tag).is_err());
        assert!(verify_hmac_sha256(&[1u8; 32], &[b"data"], &tag[..16]).is_err());
    }
}
