//! PXNT container reader (§4.2).
//!
//! Operates on an in-memory byte buffer rather than a streaming `io::Read`:
//! PXNT's layout is only fully random-access once the metadata section (of
//! variable length) has been consumed, so a single buffered pass is both
//! the simplest and the fastest posture for the sizes this format targets.
//! `sections()` still exposes section offsets computed from that pass for
//! callers that want to skip decoding optional sections they don't need.

use std::collections::HashMap;

use bytes::BytesMut;

use crate::codec::{compress, crc32, pxnt_io};
use crate::error::{PxntError, PxntErrorCode};
use crate::page::{CategoryMap, OpaqueSection, Page, PixelBuffer};

use super::category;
use super::header::{Compression, Footer, Header, FOOTER_SIZE, HEADER_SIZE};
use super::metadata;

/// Identifies one section discovered while reading a PXNT file, with its
/// byte range within the original buffer, for callers that want to skip
/// decoding optional sections lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PxntSection {
    /// Section type ID (`0`=metadata, `1`=pixels, `2`=category_map,
    /// `3`=category_defs, `4`=animation, `5`=audio, `6`=extended_metadata, or
    /// an unrecognized ID preserved verbatim).
    pub section_type: u16,
    /// Byte offset of the section's payload within the file.
    pub offset: usize,
    /// Byte length of the section's payload as stored (post-compression).
    pub length: usize,
}

/// Reads PXNT files, enforcing a decompression-bomb ceiling on every
/// compressed section (§4.2 step 4).
#[derive(Debug, Clone, Copy)]
pub struct PxntReader {
    decompression_ceiling: usize,
}

impl Default for PxntReader {
    fn default() -> Self {
        Self {
            decompression_ceiling: compress::DEFAULT_DECOMPRESSION_CEILING,
        }
    }
}

impl PxntReader {
    /// Builds a reader with a custom decompression ceiling.
    #[must_use]
    pub fn new(decompression_ceiling: usize) -> Self {
        Self { decompression_ceiling }
    }

    /// Parses a complete PXNT file into a [`Page`] (§4.2 steps 1-8).
    pub fn read_page(&self, data: &[u8]) -> Result<Page, PxntError> {
        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(PxntError::format(
                PxntErrorCode::TruncatedFile,
                "file shorter than header + footer",
            ));
        }

        let header_bytes = &data[..HEADER_SIZE];
        let header = Header::from_bytes(header_bytes)?;

        let footer_bytes = &data[data.len() - FOOTER_SIZE..];
        let footer = Footer::from_bytes(footer_bytes)?;

        let expected_header_crc = super::header::header_crc(header_bytes.try_into().unwrap());
        if footer.header_crc != expected_header_crc {
            return Err(PxntError::format(PxntErrorCode::ChecksumMismatch, "header CRC mismatch"));
        }
        if footer.file_size as usize != data.len() {
            return Err(PxntError::format(
                PxntErrorCode::ChecksumMismatch,
                "footer file_size does not match actual file length",
            ));
        }

        let body = &data[HEADER_SIZE..data.len() - FOOTER_SIZE];
        let data_crc = crc32::crc32(body);
        if data_crc != footer.data_crc {
            return Err(PxntError::format(PxntErrorCode::ChecksumMismatch, "data CRC mismatch"));
        }

        let mut cursor = BytesMut::from(body);

        let metadata = if header.flags.has_metadata {
            Some(metadata::decode(&mut cursor)?)
        } else {
            None
        };

        let bpp = header.pixel_format.bytes_per_pixel();
        let expected_pixel_len = header.width as usize * header.height as usize * bpp;
        let pixel_bytes = self.read_section(&mut cursor, header.flags.pixel_compressed, header.compression, expected_pixel_len)?;
        let pixels = PixelBuffer::new(header.width, header.height, header.pixel_format, pixel_bytes)
            .map_err(|_| PxntError::format(PxntErrorCode::InvalidDimensions, "pixel section length mismatch"))?;

        let expected_map_len = header.width as usize * header.height as usize * 2;
        let map_bytes = self.read_section(&mut cursor, header.flags.category_map_compressed, header.compression, expected_map_len)?;
        let ids = map_bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect::<Vec<_>>();
        let category_map = CategoryMap::new(header.width, header.height, ids)
            .map_err(|_| PxntError::format(PxntErrorCode::InvalidDimensions, "category map length mismatch"))?;

        let categories = category::decode(&mut cursor)?;

        let animation = if header.flags.has_animation {
            Some(read_opaque_section(&mut cursor)?)
        } else {
            None
        };
        let audio = if header.flags.has_audio {
            Some(read_opaque_section(&mut cursor)?)
        } else {
            None
        };
        let extended_metadata = if header.flags.has_extended_metadata {
            Some(read_opaque_section(&mut cursor)?)
        } else {
            None
        };

        let page = Page {
            pixels,
            category_map,
            categories,
            metadata,
            animation,
            audio,
            extended_metadata,
        };
        page.validate()
            .map_err(|_| PxntError::format(PxntErrorCode::InvalidDimensions, "category_map references undefined category"))?;
        Ok(page)
    }

    fn read_section(
        &self,
        cursor: &mut BytesMut,
        compressed: bool,
        algorithm: Compression,
        expected_len: usize,
    ) -> Result<Vec<u8>, PxntError> {
        if !compressed {
            return Ok(pxnt_io::read_bytes(cursor, expected_len)
                .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))?
                .to_vec());
        }
        let uncompressed_size = pxnt_io::read_u32(cursor)
            .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))? as usize;
        if uncompressed_size != expected_len {
            return Err(PxntError::format(
                PxntErrorCode::InvalidDimensions,
                "declared uncompressed size does not match width*height*bpp",
            ));
        }
        let compressed_size = pxnt_io::read_u32(cursor)
            .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))? as usize;
        let compressed_bytes = pxnt_io::read_bytes(cursor, compressed_size)
            .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))?;
        match algorithm {
            Compression::None => Err(PxntError::format(
                PxntErrorCode::InvalidCompression,
                "COMPRESSED flag set but header compression is none",
            )),
            Compression::Zlib => compress::inflate(&compressed_bytes, uncompressed_size, self.decompression_ceiling)
                .map_err(|e| PxntError::format(PxntErrorCode::InvalidCompression, e.to_string())),
            Compression::Lz4 => {
                compress::lz4_block_decompress(&compressed_bytes, uncompressed_size, self.decompression_ceiling)
                    .map_err(|e| PxntError::format(PxntErrorCode::InvalidCompression, e.to_string()))
            }
        }
    }

    /// Enumerates every section's offset and length within `data`, in file
    /// order, without decompressing pixel/category_map payloads (their
    /// length is fully determined by the stored size fields). category_defs
    /// still has to be parsed record-by-record to find its end, since it
    /// carries no top-level length prefix of its own.
    pub fn sections(&self, data: &[u8]) -> Result<Vec<PxntSection>, PxntError> {
        let mut offset = HEADER_SIZE;
        let mut sections = Vec::new();
        let header = Header::from_bytes(&data[..HEADER_SIZE])?;
        let body_end = data.len() - FOOTER_SIZE;
        let mut cursor = BytesMut::from(&data[offset..body_end]);

        if header.flags.has_metadata {
            let before = cursor.len();
            metadata::decode(&mut cursor)?;
            let consumed = before - cursor.len();
            sections.push(PxntSection { section_type: 0, offset, length: consumed });
            offset += consumed;
        }

        let bpp = header.pixel_format.bytes_per_pixel();
        let expected_pixel_len = header.width as usize * header.height as usize * bpp;
        let consumed = skip_compressible_section(&mut cursor, header.flags.pixel_compressed, expected_pixel_len)?;
        sections.push(PxntSection { section_type: 1, offset, length: consumed });
        offset += consumed;

        let expected_map_len = header.width as usize * header.height as usize * 2;
        let consumed = skip_compressible_section(&mut cursor, header.flags.category_map_compressed, expected_map_len)?;
        sections.push(PxntSection { section_type: 2, offset, length: consumed });
        offset += consumed;

        let before = cursor.len();
        category::decode(&mut cursor)?;
        let consumed = before - cursor.len();
        sections.push(PxntSection { section_type: 3, offset, length: consumed });
        offset += consumed;

        for (flag, section_type) in [
            (header.flags.has_animation, 4u16),
            (header.flags.has_audio, 5),
            (header.flags.has_extended_metadata, 6),
        ] {
            if flag {
                let before = cursor.len();
                read_opaque_section(&mut cursor)?;
                let consumed = before - cursor.len();
                sections.push(PxntSection { section_type, offset, length: consumed });
                offset += consumed;
            }
        }

        Ok(sections)
    }
}

/// Advances `cursor` past one pixel/category_map-shaped section (an
/// optional `uncompressed_size`/`compressed_size` pair followed by the
/// stored bytes) and reports how many bytes it consumed, without ever
/// calling into `compress::inflate`/`lz4_block_decompress` — callers that
/// only want the section's span don't pay for the decompression.
fn skip_compressible_section(cursor: &mut BytesMut, compressed: bool, expected_len: usize) -> Result<usize, PxntError> {
    if !compressed {
        pxnt_io::read_bytes(cursor, expected_len).map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))?;
        return Ok(expected_len);
    }
    let before = cursor.len();
    let uncompressed_size = pxnt_io::read_u32(cursor).map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))? as usize;
    if uncompressed_size != expected_len {
        return Err(PxntError::format(
            PxntErrorCode::InvalidDimensions,
            "declared uncompressed size does not match width*height*bpp",
        ));
    }
    let compressed_size = pxnt_io::read_u32(cursor).map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))? as usize;
    pxnt_io::read_bytes(cursor, compressed_size).map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))?;
    Ok(before - cursor.len())
}

fn read_opaque_section(cursor: &mut BytesMut) -> Result<OpaqueSection, PxntError> {
    let section_type = pxnt_io::read_u16(cursor).map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))?;
    let length = pxnt_io::read_u32(cursor).map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))? as usize;
    let payload = pxnt_io::read_bytes(cursor, length)
        .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, e.to_string()))?
        .to_vec();
    Ok(OpaqueSection { section_type, payload })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pxnt::writer::PxntWriter;
    use crate::page::{CategoryDef, Behavior, PixelFormat};
    use std::collections::HashMap;

    fn minimal_page() -> Page {
        let pixels = PixelBuffer::new(1, 1, PixelFormat::Rgba8, vec![0xFF, 0xFF, 0xFF, 0xFF]).unwrap();
        let category_map = CategoryMap::new(1, 1, vec![0]).unwrap();
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
    fn minimal_page_round_trip() {
        let page = minimal_page();
        let writer = PxntWriter::new();
        let bytes = writer.write_page(&page).unwrap();
        let reader = PxntReader::default();
        let decoded = reader.read_page(&bytes).unwrap();
        assert_eq!(decoded.width(), 1);
        assert_eq!(decoded.height(), 1);
        assert_eq!(decoded.pixels.bytes(), &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(decoded.categories.is_empty());
    }

    #[test]
    fn rejects_truncated_file() {
        let reader = PxntReader::default();
        assert!(reader.read_page(&[0u8; 10]).is_err());
    }

    #[test]
    fn rejects_corrupted_header_crc() {
        let page = minimal_page();
        let writer = PxntWriter::new();
        let mut bytes = writer.write_page(&page).unwrap();
        bytes[4] ^= 0xFF;
        let reader = PxntReader::default();
        assert!(reader.read_page(&bytes).is_err());
    }

    #[test]
    fn page_with_category_round_trips() {
        let mut page = minimal_page();
        page.category_map = CategoryMap::new(1, 1, vec![1]).unwrap();
        page.categories.insert(
            1,
            CategoryDef {
                id: 1,
                name: "hero".to_string(),
                priority: 1,
                behavior: Behavior::ClickEffect,
                extended_properties: vec![],
            },
        );
        let writer = PxntWriter::new();
        let bytes = writer.write_page(&page).unwrap();
        let reader = PxntReader::default();
        let decoded = reader.read_page(&bytes).unwrap();
        assert_eq!(decoded.categories.len(), 1);
    }

    #[test]
    fn sections_reports_every_section_in_order() {
        let mut page = minimal_page();
        page.category_map = CategoryMap::new(1, 1, vec![1]).unwrap();
        page.categories.insert(
            1,
            CategoryDef {
                id: 1,
                name: "hero".to_string(),
                priority: 1,
                behavior: Behavior::ClickEffect,
                extended_properties: vec![],
            },
        );
        page.animation = Some(crate::page::OpaqueSection {
            section_type: 4,
            payload: vec![1, 2, 3, 4],
        });
        let writer = PxntWriter::new();
        let bytes = writer.write_page(&page).unwrap();
        let reader = PxntReader::default();

        let sections = reader.sections(&bytes).unwrap();
        let types: Vec<u16> = sections.iter().map(|s| s.section_type).collect();
        assert_eq!(types, vec![1, 2, 3, 4]);

        // Every section's recorded span lands inside the body, and spans
        // don't overlap: each offset starts where the previous one ended.
        for pair in sections.windows(2) {
            assert_eq!(pair[0].offset + pair[0].length, pair[1].offset);
        }
        let last = sections.last().unwrap();
        assert_eq!(last.offset + last.length, bytes.len() - FOOTER_SIZE);

        // Re-decoding the full page still matches what sections() measured.
        let decoded = reader.read_page(&bytes).unwrap();
        assert_eq!(decoded.animation.unwrap().payload, vec![1, 2, 3, 4]);
    }
}
