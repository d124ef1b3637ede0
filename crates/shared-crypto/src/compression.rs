//! # zlib Compression

use crate::CryptoError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use std::io::{Read, Write};

/// Upper bound on decompressed size, guards against zlib bombs.
pub const MAX_DECOMPRESSED_LEN: u64 = 64 * 1024 * 1024;

/// zlib-compress `data` at the default level.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| CryptoError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| CryptoError::Compression(e.to_string()))
}

/// Inflate a zlib stream.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(MAX_DECOMPRESSED_LEN + 1)
        .read_to_end(&mut out)
        .map_err(|e| CryptoError::Compression(e.to_string()))?;
    if out.len() as u64 > MAX_DECOMPRESSED_LEN {
        return Err(CryptoError::Compression(
            "decompressed payload exceeds limit".into(),
        ));
    }
    Ok(out)
}
