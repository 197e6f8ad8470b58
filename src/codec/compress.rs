//! Compression wrappers for the wire protocol (zlib only, §4.3) and the
//! PXNT container (zlib or LZ4, §4.2/§6.2).
//!
//! PXNT sections and wire rendering frames are each compressed independently
//! in a single shot (no long-lived per-connection compression state), so a
//! fresh `Compress`/`Decompress` is created per call.

use std::io;

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

/// Default ceiling on a single decompressed section, guarding against
/// decompression-bomb attacks (§4.2 step 4). Callers may override this.
pub const DEFAULT_DECOMPRESSION_CEILING: usize = 256 * 1024 * 1024;

/// Deflates `data` with a zlib header (RFC 1950/1951) at the given
/// compression level (0-9).
pub fn deflate(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut compressor = Compress::new(Compression::new(level), true);
    let max_len = data.len() + (data.len() / 1000) + 12;
    let mut out = vec![0u8; max_len];
    compressor.compress(data, &mut out, FlushCompress::Finish)?;
    let produced = compressor.total_out() as usize;
    out.truncate(produced);
    Ok(out)
}

/// Inflates a zlib-wrapped buffer, rejecting output larger than `ceiling`
/// bytes (decompression bomb guard, §4.2 step 4).
pub fn inflate(data: &[u8], expected_len: usize, ceiling: usize) -> io::Result<Vec<u8>> {
    inflate_prefix(data, expected_len, ceiling).map(|(out, _consumed)| out)
}

/// Like [`inflate`], but also reports how many bytes of `data` the
/// decompressor actually consumed — needed when the compressed stream is
/// immediately followed by unrelated bytes with no length prefix of its
/// own, as in the wire rendering frame's pixel payload (§4.3).
pub fn inflate_prefix(data: &[u8], expected_len: usize, ceiling: usize) -> io::Result<(Vec<u8>, usize)> {
    if expected_len > ceiling {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("declared uncompressed size {expected_len} exceeds ceiling {ceiling}"),
        ));
    }
    let mut decompressor = Decompress::new(true);
    let mut out = vec![0u8; expected_len];
    decompressor.decompress(data, &mut out, FlushDecompress::Finish)?;
    let produced = decompressor.total_out() as usize;
    if produced != expected_len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("inflate produced {produced} bytes, expected {expected_len}"),
        ));
    }
    Ok((out, decompressor.total_in() as usize))
}

/// Compresses `data` as an LZ4 block (PXNT-only, §4.2/§6.2).
pub fn lz4_block_compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}

/// Decompresses an LZ4 block, rejecting output larger than `ceiling` bytes.
pub fn lz4_block_decompress(data: &[u8], expected_len: usize, ceiling: usize) -> io::Result<Vec<u8>> {
    if expected_len > ceiling {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("declared uncompressed size {expected_len} exceeds ceiling {ceiling}"),
        ));
    }
    lz4_flex::block::decompress(data, expected_len)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("LZ4 decompression failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(10);
        let compressed = deflate(&data, 6).unwrap();
        let decompressed = inflate(&compressed, data.len(), DEFAULT_DECOMPRESSION_CEILING).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn lz4_round_trip() {
        let data = b"pixnet pixnet pixnet pixnet".repeat(20);
        let compressed = lz4_block_compress(&data);
        let decompressed = lz4_block_decompress(&compressed, data.len(), DEFAULT_DECOMPRESSION_CEILING).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn inflate_rejects_bomb_over_ceiling() {
        let data = vec![0u8; 64];
        let compressed = deflate(&data, 6).unwrap();
        let err = inflate(&compressed, data.len(), 8);
        assert!(err.is_err());
    }

    #[test]
    fn compression_refusal_on_random_data() {
        // Already-random data should not compress smaller; callers use this
        // to decide whether to clear the COMPRESSED flag (§4.2, scenario 5).
        let mut random = vec![0u8; 4096];
        for (i, b) in random.iter_mut().enumerate() {
            *b = (i as u32).wrapping_mul(2654435761).to_le_bytes()[0];
        }
        let compressed = deflate(&random, 6).unwrap();
        assert!(compressed.len() >= random.len());
    }
}
