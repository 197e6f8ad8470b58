//! PXNT container writer (§4.2).
//!
//! Buffers the post-header body in memory, computes both CRCs in a single
//! pass once the body is complete, then emits header, body, footer in
//! order — the header's CRC lives in the footer, so nothing needs
//! back-patching once the whole buffer is assembled.

use bytes::BytesMut;

use crate::codec::{compress, crc32, pxnt_io};
use crate::error::PxntError;
use crate::page::Page;

use super::category;
use super::header::{Compression, Flags, Footer, Header};
use super::metadata;

/// Writes PXNT files, applying the configured compression algorithm to the
/// pixel and/or category-map sections, with automatic fallback to
/// uncompressed storage when compression doesn't actually save space
/// (§4.2, compression-refusal scenario).
#[derive(Debug, Clone, Copy)]
pub struct PxntWriter {
    compression: Compression,
    compress_pixels: bool,
    compress_category_map: bool,
}

impl Default for PxntWriter {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            compress_pixels: false,
            compress_category_map: false,
        }
    }
}

impl PxntWriter {
    /// A writer that stores every section uncompressed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer that attempts to compress the pixel and/or category-map
    /// sections with `algorithm`, falling back to uncompressed per-section
    /// when compression doesn't help.
    #[must_use]
    pub fn with_compression(algorithm: Compression, compress_pixels: bool, compress_category_map: bool) -> Self {
        Self {
            compression: algorithm,
            compress_pixels,
            compress_category_map,
        }
    }

    /// Serializes `page` to a complete PXNT file.
    pub fn write_page(&self, page: &Page) -> Result<Vec<u8>, PxntError> {
        page.validate()
            .map_err(|_| crate::error::PxntError::format(
                crate::error::PxntErrorCode::InvalidDimensions,
                "page fails cross-field validation before encoding",
            ))?;

        let mut body = BytesMut::new();
        let has_metadata = page.metadata.is_some();
        if let Some(metadata) = &page.metadata {
            body.extend_from_slice(&metadata::encode(metadata));
        }

        let pixel_compressed = self.write_section(&mut body, page.pixels.bytes(), self.compress_pixels);

        let category_map_bytes: Vec<u8> = page
            .category_map
            .ids()
            .iter()
            .flat_map(|id| id.to_le_bytes())
            .collect();
        let category_map_compressed = self.write_section(&mut body, &category_map_bytes, self.compress_category_map);

        body.extend_from_slice(&category::encode(&page.categories));

        let has_animation = page.animation.is_some();
        if let Some(section) = &page.animation {
            write_opaque_section(&mut body, section.section_type, &section.payload);
        }
        let has_audio = page.audio.is_some();
        if let Some(section) = &page.audio {
            write_opaque_section(&mut body, section.section_type, &section.payload);
        }
        let has_extended_metadata = page.extended_metadata.is_some();
        if let Some(section) = &page.extended_metadata {
            write_opaque_section(&mut body, section.section_type, &section.payload);
        }

        let header = Header {
            width: page.pixels.width(),
            height: page.pixels.height(),
            pixel_format: page.pixels.format(),
            compression: self.compression,
            flags: Flags {
                pixel_compressed,
                category_map_compressed,
                has_metadata,
                has_animation,
                has_audio,
                has_extended_metadata,
            },
        };
        let header_bytes = header.to_bytes();
        let header_crc = super::header::header_crc(&header_bytes);
        let data_crc = crc32::crc32(&body);
        let file_size = header_bytes.len() + body.len() + super::header::FOOTER_SIZE;
        let footer = Footer {
            header_crc,
            data_crc,
            file_size: file_size as u32,
        };

        let mut out = Vec::with_capacity(file_size);
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&body);
        out.extend_from_slice(&footer.to_bytes());
        Ok(out)
    }

    /// Writes one section, attempting compression if requested and the
    /// algorithm isn't `None`; refuses (falls back to raw) if the
    /// compressed form would be no smaller, returning whether it
    /// ultimately compressed.
    fn write_section(&self, buf: &mut BytesMut, raw: &[u8], want_compress: bool) -> bool {
        if want_compress && self.compression != Compression::None {
            let compressed = match self.compression {
                Compression::Zlib => compress::deflate(raw, 6).unwrap_or_else(|_| raw.to_vec()),
                Compression::Lz4 => compress::lz4_block_compress(raw),
                Compression::None => unreachable!(),
            };
            if compressed.len() < raw.len() {
                pxnt_io::write_u32(buf, raw.len() as u32);
                pxnt_io::write_u32(buf, compressed.len() as u32);
                buf.extend_from_slice(&compressed);
                return true;
            }
        }
        buf.extend_from_slice(raw);
        false
    }
}

fn write_opaque_section(buf: &mut BytesMut, section_type: u16, payload: &[u8]) {
    pxnt_io::write_u16(buf, section_type);
    pxnt_io::write_u32(buf, payload.len() as u32);
    buf.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{CategoryMap, Metadata, OpaqueSection, PixelBuffer, PixelFormat};
    use crate::pxnt::reader::PxntReader;
    use std::collections::HashMap;

    fn sample_page(metadata: Option<Metadata>) -> Page {
        let pixels = PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0u8; 16]).unwrap();
        let category_map = CategoryMap::new(2, 2, vec![0, 0, 0, 0]).unwrap();
        Page {
            pixels,
            category_map,
            categories: HashMap::new(),
            metadata,
            animation: None,
            audio: None,
            extended_metadata: None,
        }
    }

    #[test]
    fn uncompressed_round_trip() {
        let page = sample_page(None);
        let writer = PxntWriter::new();
        let bytes = writer.write_page(&page).unwrap();
        let reader = PxntReader::default();
        let decoded = reader.read_page(&bytes).unwrap();
        assert_eq!(decoded.pixels.bytes(), page.pixels.bytes());
    }

    #[test]
    fn zlib_compressed_round_trip() {
        let pixels = PixelBuffer::new(8, 8, PixelFormat::Rgba8, vec![0u8; 256]).unwrap();
        let category_map = CategoryMap::new(8, 8, vec![0u16; 64]).unwrap();
        let page = Page {
            pixels,
            category_map,
            categories: HashMap::new(),
            metadata: None,
            animation: None,
            audio: None,
            extended_metadata: None,
        };
        let writer = PxntWriter::with_compression(Compression::Zlib, true, true);
        let bytes = writer.write_page(&page).unwrap();
        let reader = PxntReader::default();
        let decoded = reader.read_page(&bytes).unwrap();
        assert_eq!(decoded.pixels.bytes(), page.pixels.bytes());
    }

    #[test]
    fn metadata_and_opaque_sections_round_trip() {
        let mut page = sample_page(Some(Metadata {
            title: Some("Test".to_string()),
            ..Metadata::default()
        }));
        page.animation = Some(OpaqueSection {
            section_type: 4,
            payload: vec![1, 2, 3],
        });
        let writer = PxntWriter::new();
        let bytes = writer.write_page(&page).unwrap();
        let reader = PxntReader::default();
        let decoded = reader.read_page(&bytes).unwrap();
        assert_eq!(decoded.metadata.unwrap().title, Some("Test".to_string()));
        assert_eq!(decoded.animation.unwrap().payload, vec![1, 2, 3]);
    }

    #[test]
    fn compression_refusal_on_incompressible_data() {
        let mut random = vec![0u8; 256];
        for (i, b) in random.iter_mut().enumerate() {
            *b = (i as u32).wrapping_mul(2654435761).to_le_bytes()[0];
        }
        let pixels = PixelBuffer::new(8, 8, PixelFormat::Rgba8, random).unwrap();
        let category_map = CategoryMap::new(8, 8, vec![0u16; 64]).unwrap();
        let page = Page {
            pixels,
            category_map,
            categories: HashMap::new(),
            metadata: None,
            animation: None,
            audio: None,
            extended_metadata: None,
        };
        let writer = PxntWriter::with_compression(Compression::Zlib, true, false);
        let bytes = writer.write_page(&page).unwrap();
        let reader = PxntReader::default();
        let decoded = reader.read_page(&bytes).unwrap();
        assert_eq!(decoded.pixels.bytes(), page.pixels.bytes());
    }
}
