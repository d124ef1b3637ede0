//! # Hashing
//!
//! BLAKE3 for key derivation, SHA-256 for identities and content addressing.

use sha2::{Digest, Sha256};

/// 256-bit digest.
pub type Hash = [u8; 32];

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// SHA-256 over several inputs, each prefixed with its length so that
/// different splits of the same bytes hash differently.
pub fn sha256_framed(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for input in inputs {
        hasher.update((input.len() as u64).to_le_bytes());
        hasher.update(input);
    }
    hasher.finalize().into()
}

/// Derive key from context and input key material.
pub fn blake3_derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_framing_separates_splits() {
        assert_ne!(
            sha256_framed(&[b"ab", b"c"]),
            sha256_framed(&[b"a", b"bc"])
        );
    }

    #[test]
    fn test_derive_key_depends_on_context() {
        let a = blake3_derive_key("fleet-comms a", b"secret");
        let b = blake3_derive_key("fleet-comms b", b"secret");
        assert_ne!(a, b);
    }
}
