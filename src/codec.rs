//! Pooled zstd compression for cache artifacts.
//!
//! Encoder and decoder contexts are kept in free-lists so repeated
//! catalog refreshes don't pay the allocation cost each time. Files
//! smaller than 1 KiB stay uncompressed (the frame overhead would
//! outweigh the savings), which callers handle via [`CodecError::TooSmall`].

use std::io;
use std::sync::Mutex;
use zstd::bulk::{Compressor, Decompressor};

/// Inputs below this size are stored uncompressed.
pub const MIN_COMPRESS_SIZE: usize = 1024;

/// Fastest compression level; catalog JSON is large and refreshed often.
const COMPRESSION_LEVEL: i32 = 1;

/// Hard ceiling on a decompressed cache artifact (256 MiB).
const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

static ENCODERS: Mutex<Vec<Compressor<'static>>> = Mutex::new(Vec::new());
static DECODERS: Mutex<Vec<Decompressor<'static>>> = Mutex::new(Vec::new());

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload too small to compress ({0} bytes)")]
    TooSmall(usize),

    #[error("zstd failure: {0}")]
    Io(#[from] io::Error),

    #[error("decompressed payload exceeds {MAX_DECOMPRESSED_SIZE} bytes")]
    TooLarge,
}

/// Compress `data`, reusing a pooled encoder context.
///
/// Returns [`CodecError::TooSmall`] for payloads under 1 KiB so the
/// caller can write them out raw instead.
pub fn compress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.len() < MIN_COMPRESS_SIZE {
        return Err(CodecError::TooSmall(data.len()));
    }

    let mut encoder = match ENCODERS.lock().unwrap().pop() {
        Some(enc) => enc,
        None => Compressor::new(COMPRESSION_LEVEL)?,
    };

    let result = encoder.compress(data);
    ENCODERS.lock().unwrap().push(encoder);
    Ok(result?)
}

/// Decompress `data`, reusing a pooled decoder context.
///
/// The output bound grows geometrically since zstd frames from other
/// writers may omit the content size; anything past the hard cap is
/// treated as corruption.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = match DECODERS.lock().unwrap().pop() {
        Some(dec) => dec,
        None => Decompressor::new()?,
    };

    let mut capacity = data.len().saturating_mul(8).max(1024 * 1024);
    let result = loop {
        match decoder.decompress(data, capacity) {
            Ok(out) => break Ok(out),
            Err(err) => {
                if capacity >= MAX_DECOMPRESSED_SIZE {
                    break Err(CodecError::Io(err));
                }
                capacity = capacity.saturating_mul(4).min(MAX_DECOMPRESSED_SIZE);
            }
        }
    };

    DECODERS.lock().unwrap().push(decoder);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let data: Vec<u8> = (0..16_384u32).flat_map(|i| i.to_le_bytes()).collect();
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_small_payload_rejected() {
        let data = vec![0u8; MIN_COMPRESS_SIZE - 1];
        assert!(matches!(compress(&data), Err(CodecError::TooSmall(_))));
        assert!(compress(&vec![0u8; MIN_COMPRESS_SIZE]).is_ok());
    }

    #[test]
    fn test_garbage_fails() {
        assert!(decompress(b"definitely not a zstd frame").is_err());
    }

    #[test]
    fn test_pool_reuse_is_consistent() {
        // Exercise the pools across several calls; results must not
        // depend on which context serviced the request.
        let data = vec![7u8; 4096];
        let first = compress(&data).unwrap();
        for _ in 0..4 {
            let again = compress(&data).unwrap();
            assert_eq!(decompress(&again).unwrap(), data);
        }
        assert_eq!(decompress(&first).unwrap(), data);
    }
}
