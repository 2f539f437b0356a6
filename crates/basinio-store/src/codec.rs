//! Byte-level encoding of float payloads.
//!
//! Floats are stored as little-endian IEEE-754 32-bit values. Gzip streams
//! are produced with flate2's default level.

use std::io::{Read, Write};

use basinio_types::{BasinError, BasinResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Byte image of a float slice.
pub fn floats_to_bytes(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Inverse of [`floats_to_bytes`]; fails when the length is not a multiple of 4.
pub fn bytes_to_floats(bytes: &[u8]) -> BasinResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(BasinError::Format(format!(
            "payload of {} bytes is not a whole number of floats",
            bytes.len()
        )));
    }
    let mut values = Vec::new();
    values
        .try_reserve_exact(bytes.len() / 4)
        .map_err(|_| BasinError::Allocation(bytes.len() / 4))?;
    values.extend(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
    );
    Ok(values)
}

/// Gzip-compress a byte buffer.
pub fn gzip_compress(bytes: &[u8]) -> BasinResult<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| BasinError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| BasinError::Compression(e.to_string()))
}

/// Decompress a gzip stream.
///
/// When `expected_len` is given, the decompressed length must match it.
pub fn gzip_decompress(bytes: &[u8], expected_len: Option<usize>) -> BasinResult<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_len.unwrap_or(bytes.len() * 4));
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|e| BasinError::Compression(e.to_string()))?;
    if let Some(expected) = expected_len {
        if out.len() != expected {
            return Err(BasinError::Compression(format!(
                "decompressed {} bytes, expected {expected}",
                out.len()
            )));
        }
    }
    Ok(out)
}

/// CRC32 of stored bytes.
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}
