//! The 32-byte PXNT header and 16-byte footer (§6.2).
//!
//! Modeled on BPX's `MainHeader`: fixed-size, checksum-verified structs with
//! their own `read`/`write`, but PXNT splits the checksum two ways — the
//! header's own CRC lives in the footer (`header_crc`), which lets the
//! writer stream the header to disk before it even knows the footer's
//! position, and the footer carries a second CRC (`data_crc`) over
//! everything the header doesn't cover.

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::crc32;
use crate::error::{PxntError, PxntErrorCode};
use crate::page::PixelFormat;

/// Size in bytes of the PXNT header.
pub const HEADER_SIZE: usize = 32;
/// Size in bytes of the PXNT footer.
pub const FOOTER_SIZE: usize = 16;

const MAGIC_HEADER: [u8; 4] = *b"PXNT";
const MAGIC_FOOTER: [u8; 4] = *b"TNXP";

/// The only PXNT version this implementation understands.
pub const SUPPORTED_VERSION: u16 = 1;

/// Section compression algorithm (§6.2), a file-wide choice applied
/// per-section via the per-section `COMPRESSED` flags in [`Flags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression.
    None,
    /// RFC 1951 deflate with a zlib header.
    Zlib,
    /// LZ4 block format.
    Lz4,
}

impl Compression {
    fn from_u8(value: u8) -> Result<Self, PxntError> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            2 => Ok(Self::Lz4),
            other => Err(PxntError::format(
                PxntErrorCode::InvalidCompression,
                format!("unknown compression algorithm {other}"),
            )),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Zlib => 1,
            Self::Lz4 => 2,
        }
    }
}

/// Per-section presence/compression bits packed into the header's 16-bit
/// flags field. Bits 6..15 are reserved and must be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags {
    /// Pixel data section is compressed with the header's `compression` algorithm.
    pub pixel_compressed: bool,
    /// Category map section is compressed.
    pub category_map_compressed: bool,
    /// Optional metadata section is present.
    pub has_metadata: bool,
    /// Optional animation section is present.
    pub has_animation: bool,
    /// Optional audio section is present.
    pub has_audio: bool,
    /// Optional extended-metadata section is present.
    pub has_extended_metadata: bool,
}

const BIT_PIXEL_COMPRESSED: u16 = 1 << 0;
const BIT_CATEGORY_MAP_COMPRESSED: u16 = 1 << 1;
const BIT_HAS_METADATA: u16 = 1 << 2;
const BIT_HAS_ANIMATION: u16 = 1 << 3;
const BIT_HAS_AUDIO: u16 = 1 << 4;
const BIT_HAS_EXTENDED_METADATA: u16 = 1 << 5;
const RESERVED_MASK: u16 = !(BIT_PIXEL_COMPRESSED
    | BIT_CATEGORY_MAP_COMPRESSED
    | BIT_HAS_METADATA
    | BIT_HAS_ANIMATION
    | BIT_HAS_AUDIO
    | BIT_HAS_EXTENDED_METADATA);

impl Flags {
    fn from_bits(bits: u16) -> Result<Self, PxntError> {
        if bits & RESERVED_MASK != 0 {
            return Err(PxntError::format(
                PxntErrorCode::InvalidDimensions,
                format!("reserved flag bits set: {bits:#06x}"),
            ));
        }
        Ok(Self {
            pixel_compressed: bits & BIT_PIXEL_COMPRESSED != 0,
            category_map_compressed: bits & BIT_CATEGORY_MAP_COMPRESSED != 0,
            has_metadata: bits & BIT_HAS_METADATA != 0,
            has_animation: bits & BIT_HAS_ANIMATION != 0,
            has_audio: bits & BIT_HAS_AUDIO != 0,
            has_extended_metadata: bits & BIT_HAS_EXTENDED_METADATA != 0,
        })
    }

    fn to_bits(self) -> u16 {
        (self.pixel_compressed as u16 * BIT_PIXEL_COMPRESSED)
            | (self.category_map_compressed as u16 * BIT_CATEGORY_MAP_COMPRESSED)
            | (self.has_metadata as u16 * BIT_HAS_METADATA)
            | (self.has_animation as u16 * BIT_HAS_ANIMATION)
            | (self.has_audio as u16 * BIT_HAS_AUDIO)
            | (self.has_extended_metadata as u16 * BIT_HAS_EXTENDED_METADATA)
    }
}

/// The fixed 32-byte PXNT header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Pixel raster width.
    pub width: u16,
    /// Pixel raster height.
    pub height: u16,
    /// Pixel storage format.
    pub pixel_format: PixelFormat,
    /// File-wide compression algorithm used by any section whose flag is set.
    pub compression: Compression,
    /// Per-section presence/compression bits.
    pub flags: Flags,
}

impl Header {
    /// Serializes the header to exactly [`HEADER_SIZE`] bytes, with 14
    /// reserved bytes zeroed.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(&MAGIC_HEADER);
        buf.put_u16_le(SUPPORTED_VERSION);
        buf.put_u16_le(self.width);
        buf.put_u16_le(self.height);
        buf.put_u8(self.pixel_format.to_u8());
        buf.put_u8(self.compression.to_u8());
        buf.put_u16_le(self.flags.to_bits());
        buf.put_bytes(0, HEADER_SIZE - buf.len());
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf[..HEADER_SIZE]);
        out
    }

    /// Parses and validates a header, per §4.2 steps 1-2. Does not check the
    /// header CRC against the footer — the caller cross-checks once both are
    /// in hand.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, PxntError> {
        if raw.len() < HEADER_SIZE {
            return Err(PxntError::format(
                PxntErrorCode::TruncatedFile,
                format!("header needs {HEADER_SIZE} bytes, have {}", raw.len()),
            ));
        }
        let mut buf = BytesMut::from(&raw[..HEADER_SIZE]);
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC_HEADER {
            return Err(PxntError::format(
                PxntErrorCode::InvalidMagic,
                format!("expected PXNT magic, found {magic:?}"),
            ));
        }
        let version = buf.get_u16_le();
        if version != SUPPORTED_VERSION {
            return Err(PxntError::format(
                PxntErrorCode::UnsupportedVersion,
                format!("unsupported PXNT version {version}"),
            ));
        }
        let width = buf.get_u16_le();
        let height = buf.get_u16_le();
        if width == 0 || height == 0 {
            return Err(PxntError::format(
                PxntErrorCode::InvalidDimensions,
                "width and height must be non-zero",
            ));
        }
        let pixel_format = PixelFormat::from_u8(buf.get_u8()).map_err(|_| {
            PxntError::format(PxntErrorCode::InvalidDimensions, "invalid pixel_format enum value")
        })?;
        let compression = Compression::from_u8(buf.get_u8())?;
        let flags = Flags::from_bits(buf.get_u16_le())?;
        let reserved = &buf[..];
        if reserved.iter().any(|&b| b != 0) {
            return Err(PxntError::format(
                PxntErrorCode::InvalidDimensions,
                "reserved header bytes must be zero",
            ));
        }
        Ok(Self {
            width,
            height,
            pixel_format,
            compression,
            flags,
        })
    }
}

/// The fixed 16-byte PXNT footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    /// CRC-32 of the 32-byte header, cross-checked against a freshly
    /// recomputed CRC of the header the reader just parsed.
    pub header_crc: u32,
    /// CRC-32 over every byte between the header and footer.
    pub data_crc: u32,
    /// Echoed total file size in bytes.
    pub file_size: u32,
}

impl Footer {
    /// Serializes the footer to exactly [`FOOTER_SIZE`] bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = BytesMut::with_capacity(FOOTER_SIZE);
        buf.put_slice(&MAGIC_FOOTER);
        buf.put_u32_le(self.header_crc);
        buf.put_u32_le(self.data_crc);
        buf.put_u32_le(self.file_size);
        let mut out = [0u8; FOOTER_SIZE];
        out.copy_from_slice(&buf[..FOOTER_SIZE]);
        out
    }

    /// Parses a footer, verifying its magic (§4.2 step 8).
    pub fn from_bytes(raw: &[u8]) -> Result<Self, PxntError> {
        if raw.len() < FOOTER_SIZE {
            return Err(PxntError::format(
                PxntErrorCode::TruncatedFile,
                format!("footer needs {FOOTER_SIZE} bytes, have {}", raw.len()),
            ));
        }
        let mut buf = BytesMut::from(&raw[..FOOTER_SIZE]);
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC_FOOTER {
            return Err(PxntError::format(
                PxntErrorCode::InvalidMagic,
                format!("expected TNXP magic, found {magic:?}"),
            ));
        }
        Ok(Self {
            header_crc: buf.get_u32_le(),
            data_crc: buf.get_u32_le(),
            file_size: buf.get_u32_le(),
        })
    }
}

/// Computes the CRC-32 of a serialized header, for both writing and
/// cross-checking against the footer's `header_crc`.
#[must_use]
pub fn header_crc(header_bytes: &[u8; HEADER_SIZE]) -> u32 {
    crc32::crc32(header_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PixelFormat;

    fn sample_header() -> Header {
        Header {
            width: 4,
            height: 4,
            pixel_format: PixelFormat::Rgba8,
            compression: Compression::Zlib,
            flags: Flags {
                pixel_compressed: true,
                category_map_compressed: false,
                has_metadata: true,
                has_animation: false,
                has_audio: false,
                has_extended_metadata: false,
            },
        }
    }

    #[test]
    fn header_round_trip() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let decoded = Header::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut bytes = sample_header().to_bytes();
        bytes[0] = b'X';
        assert!(Header::from_bytes(&bytes).is_err());
    }

    #[test]
    fn header_rejects_reserved_bits() {
        let mut bytes = sample_header().to_bytes();
        bytes[31] = 0xFF;
        assert!(Header::from_bytes(&bytes).is_err());
    }

    #[test]
    fn footer_round_trip() {
        let footer = Footer {
            header_crc: 0x1234_5678,
            data_crc: 0x9ABC_DEF0,
            file_size: 1024,
        };
        let bytes = footer.to_bytes();
        assert_eq!(bytes.len(), FOOTER_SIZE);
        assert_eq!(Footer::from_bytes(&bytes).unwrap(), footer);
    }

    #[test]
    fn header_crc_detects_corruption() {
        let header = sample_header();
        let bytes = header.to_bytes();
        let crc = header_crc(&bytes);
        let mut corrupted = bytes;
        corrupted[4] ^= 0x01;
        assert_ne!(header_crc(&corrupted), crc);
    }
}
