//! The `PIXNET` rendering frame: a 30-byte header (§4.3) followed by pixel
//! data, the category map, and category definitions, each as they appear in
//! §6.1's `PIXNET rendering frame` layout.

use std::collections::HashMap;

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{compress, crc32, wire_io};
use crate::error::{WireError, WireErrorCode};
use crate::page::{Behavior, CategoryDef, CategoryMap, Page, PixelBuffer, PixelFormat};

const MAGIC: &[u8; 6] = b"PIXNET";
/// Size in bytes of the fixed `PIXNET` frame header.
pub const HEADER_SIZE: usize = 30;

/// Semantic kind of a rendering frame (§4.3). All three share the same
/// wire layout in v1; only the interpretation of the payload differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// A complete raster replacing the client's current Page.
    Full,
    /// A rectangle diff against the previous frame. Layout reserved in v1:
    /// implementations parse and skip rather than interpret (§9 open question).
    Partial,
    /// One frame of an animation sequence.
    Animation,
}

impl FrameType {
    fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Full),
            1 => Ok(Self::Partial),
            2 => Ok(Self::Animation),
            other => Err(WireError::protocol(
                WireErrorCode::ProtocolError,
                format!("unknown frame_type {other}"),
            )),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Full => 0,
            Self::Partial => 1,
            Self::Animation => 2,
        }
    }
}

/// A decoded `PIXNET` rendering frame.
#[derive(Debug, Clone)]
pub struct RenderFrame {
    /// Semantic kind of this frame.
    pub frame_type: FrameType,
    /// Per-direction sequence number (§4.3: monotonically increasing, gap ⇒ `PROTOCOL_ERROR`).
    pub sequence: u32,
    /// Sender-local timestamp in microseconds, informational only.
    pub timestamp_us: u64,
    /// Protocol version of the sender.
    pub version: u8,
    /// The rendered Page.
    pub page: Page,
}

impl RenderFrame {
    /// Encodes this frame, optionally zlib-compressing the pixel payload
    /// (§4.3: gated by the session's negotiated compression capability,
    /// enforced by construction at the call site, not here).
    pub fn encode(&self, compress_pixels: bool) -> Result<Vec<u8>, WireError> {
        let mut payload = BytesMut::new();

        let pixel_bytes = self.page.pixels.bytes();
        let mut flags: u16 = 0;
        if compress_pixels {
            let compressed = compress::deflate(pixel_bytes, 6).map_err(WireError::Io)?;
            if compressed.len() < pixel_bytes.len() {
                flags |= 0x0001;
                payload.extend_from_slice(&compressed);
            } else {
                payload.extend_from_slice(pixel_bytes);
            }
        } else {
            payload.extend_from_slice(pixel_bytes);
        }

        for id in self.page.category_map.ids() {
            wire_io::write_u16(&mut payload, *id);
        }

        encode_category_defs(&mut payload, &self.page.categories);

        let checksum = crc32::crc32(&payload);

        let mut out = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        out.put_slice(MAGIC);
        out.put_u8(self.frame_type.to_u8());
        out.put_u32(self.sequence);
        out.put_u64(self.timestamp_us);
        out.put_u16(flags);
        out.put_u8(self.version);
        out.put_u16(self.page.width());
        out.put_u16(self.page.height());
        out.put_u8(self.page.pixels.format().to_u8());
        out.put_u32(checksum);
        out.extend_from_slice(&payload);
        Ok(out.to_vec())
    }

    /// Decodes a frame, verifying the checksum before trusting any field
    /// derived from the payload (§4.3, §8 integrity property).
    /// `decompression_ceiling` bounds how large the decompressed pixel
    /// payload may be, guarding against a declared width/height/format
    /// that would otherwise force an oversized allocation.
    pub fn decode(data: &[u8], decompression_ceiling: usize) -> Result<Self, WireError> {
        if data.len() < HEADER_SIZE {
            return Err(WireError::protocol(
                WireErrorCode::ProtocolError,
                "frame shorter than 30-byte header",
            ));
        }
        let mut buf = BytesMut::from(data);
        let mut magic = [0u8; 6];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(WireError::protocol(WireErrorCode::ProtocolError, "bad PIXNET magic"));
        }
        let frame_type = FrameType::from_u8(buf.get_u8())?;
        let sequence = buf.get_u32();
        let timestamp_us = buf.get_u64();
        let flags = buf.get_u16();
        if flags & !0x0001 != 0 {
            return Err(WireError::protocol(WireErrorCode::ProtocolError, "reserved frame flag bits set"));
        }
        let compressed = flags & 0x0001 != 0;
        let version = buf.get_u8();
        let width = buf.get_u16();
        let height = buf.get_u16();
        let format = PixelFormat::from_u8(buf.get_u8())
            .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;
        let checksum = buf.get_u32();

        let payload = buf;
        let actual_checksum = crc32::crc32(&payload);
        if actual_checksum != checksum {
            return Err(WireError::protocol(WireErrorCode::ChecksumMismatch, "frame payload checksum mismatch"));
        }

        let mut cursor = payload;
        let bpp = format.bytes_per_pixel();
        let expected_pixel_len = width as usize * height as usize * bpp;
        let pixel_bytes = if compressed {
            // The category map and category defs follow immediately after
            // the compressed pixel payload with no length prefix of their
            // own, so we decode against the whole remaining buffer and let
            // the decompressor report how many bytes it actually consumed.
            let (decoded, consumed) = compress::inflate_prefix(&cursor, expected_pixel_len, decompression_ceiling)
                .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;
            let _ = cursor.split_to(consumed);
            decoded
        } else {
            wire_io::read_bytes(&mut cursor, expected_pixel_len)
                .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?
                .to_vec()
        };
        let pixels = PixelBuffer::new(width, height, format, pixel_bytes)
            .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;

        let map_len = width as usize * height as usize;
        let mut ids = Vec::with_capacity(map_len);
        for _ in 0..map_len {
            ids.push(wire_io::read_u16(&mut cursor).map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?);
        }
        let category_map = CategoryMap::new(width, height, ids)
            .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;

        let categories = decode_category_defs(&mut cursor)?;

        let page = Page {
            pixels,
            category_map,
            categories,
            metadata: None,
            animation: None,
            audio: None,
            extended_metadata: None,
        };
        page.validate()
            .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;

        Ok(Self {
            frame_type,
            sequence,
            timestamp_us,
            version,
            page,
        })
    }
}

fn encode_category_defs(buf: &mut BytesMut, categories: &HashMap<u16, CategoryDef>) {
    let mut ids: Vec<&u16> = categories.keys().collect();
    ids.sort_unstable();
    wire_io::write_u16(buf, ids.len() as u16);
    for id in ids {
        let def = &categories[id];
        let data = def.behavior.encode_data();
        wire_io::write_u16(buf, def.id);
        wire_io::write_string_u8_len(buf, &def.name);
        wire_io::write_u8(buf, def.behavior.behavior_id());
        wire_io::write_u8(buf, def.priority);
        wire_io::write_u16(buf, data.len() as u16);
        buf.extend_from_slice(&data);
    }
}

fn decode_category_defs(buf: &mut BytesMut) -> Result<HashMap<u16, CategoryDef>, WireError> {
    let io_err = |e: std::io::Error| WireError::protocol(WireErrorCode::ProtocolError, e.to_string());
    let count = wire_io::read_u16(buf).map_err(io_err)?;
    let mut categories = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let id = wire_io::read_u16(buf).map_err(io_err)?;
        let name_len = wire_io::read_u8(buf).map_err(io_err)? as usize;
        let name_bytes = wire_io::read_bytes(buf, name_len).map_err(io_err)?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;
        let behavior_id = wire_io::read_u8(buf).map_err(io_err)?;
        let priority = wire_io::read_u8(buf).map_err(io_err)?;
        let data_len = wire_io::read_u16(buf).map_err(io_err)? as usize;
        let data = wire_io::read_bytes(buf, data_len).map_err(io_err)?;
        let behavior = Behavior::decode(behavior_id, &data)
            .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;
        categories.insert(
            id,
            CategoryDef {
                id,
                name,
                priority,
                behavior,
                extended_properties: Vec::new(),
            },
        );
    }
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_page() -> Page {
        let pixels = PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0u8; 16]).unwrap();
        let category_map = CategoryMap::new(2, 2, vec![0, 0, 0, 0]).unwrap();
        Page {
            pixels,
            category_map,
            categories: HashMap::new(),
            metadata: None,
            animation: None,
            audio: None,
            extended_metadata: None,
        }
    }

    #[test]
    fn uncompressed_round_trip() {
        let frame = RenderFrame {
            frame_type: FrameType::Full,
            sequence: 1,
            timestamp_us: 42,
            version: 1,
            page: sample_page(),
        };
        let bytes = frame.encode(false).unwrap();
        let decoded = RenderFrame::decode(&bytes, compress::DEFAULT_DECOMPRESSION_CEILING).unwrap();
        assert_eq!(decoded.sequence, 1);
        assert_eq!(decoded.page.pixels.bytes(), frame.page.pixels.bytes());
    }

    #[test]
    fn checksum_tamper_detected() {
        let frame = RenderFrame {
            frame_type: FrameType::Full,
            sequence: 1,
            timestamp_us: 42,
            version: 1,
            page: sample_page(),
        };
        let mut bytes = frame.encode(false).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(RenderFrame::decode(&bytes, compress::DEFAULT_DECOMPRESSION_CEILING).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[..6].copy_from_slice(b"BOGUS!");
        assert!(RenderFrame::decode(&bytes, compress::DEFAULT_DECOMPRESSION_CEILING).is_err());
    }
}
