//! Category definitions section of a PXNT file (§4.2 step 6, §6.2).
//!
//! Layout: `count(2)` then, per category, an 8-byte record header
//! (`id(2) · priority(1) · behavior_id(1) · name_length(2) · data_length(2)`)
//! followed by `name` and the behavior-specific `data` blob (§4.5's
//! tagged-variant schemas, shared verbatim with the wire codec's
//! `category_defs` list). Each category then carries its own extended
//! properties count — zero meaning none are present — rather than inferring
//! presence from the surrounding section's total length, which keeps
//! decoding a category record independent of where the section ends.

use std::collections::HashMap;

use bytes::BytesMut;

use crate::codec::pxnt_io;
use crate::error::{PixnetError, PxntError, PxntErrorCode};
use crate::page::{CategoryDef, Behavior, ExtendedProperty};

fn overflow_error(message: impl Into<String>) -> PxntError {
    PxntError::format(PxntErrorCode::SectionOverflow, message)
}

/// `Behavior::decode`/`encode_data` are shared with the wire codec and so
/// report the top-level error type; narrow it back to `PxntError` here.
fn narrow(e: PixnetError) -> PxntError {
    match e {
        PixnetError::Pxnt(inner) => inner,
        other => PxntError::format(PxntErrorCode::TruncatedFile, other.to_string()),
    }
}

/// Encodes all category definitions, sorted by ID for reproducible output.
pub fn encode(categories: &HashMap<u16, CategoryDef>) -> Vec<u8> {
    let mut ids: Vec<&u16> = categories.keys().collect();
    ids.sort_unstable();

    let mut buf = BytesMut::new();
    pxnt_io::write_u16(&mut buf, ids.len() as u16);
    for id in ids {
        let def = &categories[id];
        encode_one(&mut buf, def);
    }
    buf.to_vec()
}

fn encode_one(buf: &mut BytesMut, def: &CategoryDef) {
    let name_bytes = def.name.as_bytes();
    let data = def.behavior.encode_data();

    pxnt_io::write_u16(buf, def.id);
    pxnt_io::write_u8(buf, def.priority);
    pxnt_io::write_u8(buf, def.behavior.behavior_id());
    pxnt_io::write_u16(buf, name_bytes.len() as u16);
    pxnt_io::write_u16(buf, data.len() as u16);
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&data);

    pxnt_io::write_u16(buf, def.extended_properties.len() as u16);
    for prop in &def.extended_properties {
        pxnt_io::write_u16(buf, prop.key.len() as u16);
        buf.extend_from_slice(prop.key.as_bytes());
        pxnt_io::write_u16(buf, prop.value.len() as u16);
        buf.extend_from_slice(prop.value.as_bytes());
    }
}

/// Decodes the category definitions section, consuming `buf` entirely.
pub fn decode(buf: &mut BytesMut) -> Result<HashMap<u16, CategoryDef>, PxntError> {
    let count = pxnt_io::read_u16(buf).map_err(io_to_truncated)?;
    let mut categories = HashMap::with_capacity(count as usize);
    for _ in 0..count {
        let def = decode_one(buf)?;
        if categories.insert(def.id, def).is_some() {
            return Err(overflow_error("duplicate category id in category definitions"));
        }
    }
    Ok(categories)
}

fn decode_one(buf: &mut BytesMut) -> Result<CategoryDef, PxntError> {
    let id = pxnt_io::read_u16(buf).map_err(io_to_truncated)?;
    let priority = pxnt_io::read_u8(buf).map_err(io_to_truncated)?;
    let behavior_id = pxnt_io::read_u8(buf).map_err(io_to_truncated)?;
    let name_length = pxnt_io::read_u16(buf).map_err(io_to_truncated)? as usize;
    let data_length = pxnt_io::read_u16(buf).map_err(io_to_truncated)? as usize;

    let name_bytes = pxnt_io::read_bytes(buf, name_length).map_err(io_to_truncated)?;
    let name = String::from_utf8(name_bytes.to_vec())
        .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, format!("invalid UTF-8 category name: {e}")))?;

    let data_bytes = pxnt_io::read_bytes(buf, data_length).map_err(io_to_truncated)?;
    let behavior = Behavior::decode(behavior_id, &data_bytes).map_err(narrow)?;

    let prop_count = pxnt_io::read_u16(buf).map_err(io_to_truncated)?;
    let mut extended_properties = Vec::with_capacity(prop_count as usize);
    for _ in 0..prop_count {
        let key_len = pxnt_io::read_u16(buf).map_err(io_to_truncated)? as usize;
        let key = String::from_utf8(pxnt_io::read_bytes(buf, key_len).map_err(io_to_truncated)?.to_vec())
            .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, format!("invalid UTF-8 property key: {e}")))?;
        let value_len = pxnt_io::read_u16(buf).map_err(io_to_truncated)? as usize;
        let value = String::from_utf8(pxnt_io::read_bytes(buf, value_len).map_err(io_to_truncated)?.to_vec())
            .map_err(|e| PxntError::format(PxntErrorCode::TruncatedFile, format!("invalid UTF-8 property value: {e}")))?;
        extended_properties.push(ExtendedProperty { key, value });
    }

    Ok(CategoryDef {
        id,
        name,
        priority,
        behavior,
        extended_properties,
    })
}

fn io_to_truncated(e: std::io::Error) -> PxntError {
    PxntError::format(PxntErrorCode::TruncatedFile, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{NavigateTarget, ValidationFlags};

    fn sample() -> HashMap<u16, CategoryDef> {
        let mut map = HashMap::new();
        map.insert(
            1,
            CategoryDef {
                id: 1,
                name: "home link".to_string(),
                priority: 10,
                behavior: Behavior::Navigate {
                    url: "pixnet://example/home".to_string(),
                    target: NavigateTarget::Same,
                },
                extended_properties: vec![ExtendedProperty {
                    key: "aria-label".to_string(),
                    value: "Home".to_string(),
                }],
            },
        );
        map.insert(
            2,
            CategoryDef {
                id: 2,
                name: "name field".to_string(),
                priority: 5,
                behavior: Behavior::InputZone {
                    zone_id: 7,
                    validation_flags: ValidationFlags {
                        required: true,
                        numeric: false,
                        email: false,
                        custom: false,
                    },
                },
                extended_properties: vec![],
            },
        );
        map
    }

    #[test]
    fn category_defs_round_trip() {
        let original = sample();
        let bytes = encode(&original);
        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = decode(&mut buf).unwrap();
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_category_defs_round_trip() {
        let original: HashMap<u16, CategoryDef> = HashMap::new();
        let bytes = encode(&original);
        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = decode(&mut buf).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let bytes = encode(&sample());
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 3]);
        assert!(decode(&mut buf).is_err());
    }
}
