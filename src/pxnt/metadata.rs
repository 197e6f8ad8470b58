//! Optional metadata section of a PXNT file (§3, §4.2 step 3).
//!
//! The format only names "title, author, description, canonical URL,
//! keywords, custom fields" without pinning an exact field layout; this
//! implementation encodes each optional string field behind a presence
//! byte (an empty string is a legitimate value, so a zero length prefix
//! can't double as "absent"), then keywords and custom fields as counted
//! lists.

use bytes::BytesMut;

use crate::codec::pxnt_io;
use crate::error::{PxntError, PxntErrorCode};
use crate::page::Metadata;

fn truncated(message: impl Into<String>) -> PxntError {
    PxntError::format(PxntErrorCode::TruncatedFile, message)
}

fn io_truncated(e: std::io::Error) -> PxntError {
    truncated(e.to_string())
}

fn write_optional_string(buf: &mut BytesMut, value: &Option<String>) {
    match value {
        Some(s) => {
            pxnt_io::write_u8(buf, 1);
            pxnt_io::write_u16(buf, s.len() as u16);
            buf.extend_from_slice(s.as_bytes());
        }
        None => pxnt_io::write_u8(buf, 0),
    }
}

fn read_optional_string(buf: &mut BytesMut) -> Result<Option<String>, PxntError> {
    let present = pxnt_io::read_u8(buf).map_err(io_truncated)?;
    if present == 0 {
        return Ok(None);
    }
    let len = pxnt_io::read_u16(buf).map_err(io_truncated)? as usize;
    let raw = pxnt_io::read_bytes(buf, len).map_err(io_truncated)?;
    let s = String::from_utf8(raw.to_vec()).map_err(|e| truncated(format!("invalid UTF-8 metadata string: {e}")))?;
    Ok(Some(s))
}

/// Encodes a metadata block.
pub fn encode(metadata: &Metadata) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_optional_string(&mut buf, &metadata.title);
    write_optional_string(&mut buf, &metadata.author);
    write_optional_string(&mut buf, &metadata.description);
    write_optional_string(&mut buf, &metadata.canonical_url);

    pxnt_io::write_u16(&mut buf, metadata.keywords.len() as u16);
    for keyword in &metadata.keywords {
        pxnt_io::write_u16(&mut buf, keyword.len() as u16);
        buf.extend_from_slice(keyword.as_bytes());
    }

    pxnt_io::write_u16(&mut buf, metadata.custom_fields.len() as u16);
    for (key, value) in &metadata.custom_fields {
        pxnt_io::write_u16(&mut buf, key.len() as u16);
        buf.extend_from_slice(key.as_bytes());
        pxnt_io::write_u16(&mut buf, value.len() as u16);
        buf.extend_from_slice(value.as_bytes());
    }
    buf.to_vec()
}

/// Decodes a metadata block, consuming `buf` entirely.
pub fn decode(buf: &mut BytesMut) -> Result<Metadata, PxntError> {
    let title = read_optional_string(buf)?;
    let author = read_optional_string(buf)?;
    let description = read_optional_string(buf)?;
    let canonical_url = read_optional_string(buf)?;

    let keyword_count = pxnt_io::read_u16(buf).map_err(io_truncated)?;
    let mut keywords = Vec::with_capacity(keyword_count as usize);
    for _ in 0..keyword_count {
        let len = pxnt_io::read_u16(buf).map_err(io_truncated)? as usize;
        let raw = pxnt_io::read_bytes(buf, len).map_err(io_truncated)?;
        keywords
            .push(String::from_utf8(raw.to_vec()).map_err(|e| truncated(format!("invalid UTF-8 keyword: {e}")))?);
    }

    let field_count = pxnt_io::read_u16(buf).map_err(io_truncated)?;
    let mut custom_fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        let key_len = pxnt_io::read_u16(buf).map_err(io_truncated)? as usize;
        let key = String::from_utf8(pxnt_io::read_bytes(buf, key_len).map_err(io_truncated)?.to_vec())
            .map_err(|e| truncated(format!("invalid UTF-8 custom field key: {e}")))?;
        let value_len = pxnt_io::read_u16(buf).map_err(io_truncated)? as usize;
        let value = String::from_utf8(pxnt_io::read_bytes(buf, value_len).map_err(io_truncated)?.to_vec())
            .map_err(|e| truncated(format!("invalid UTF-8 custom field value: {e}")))?;
        custom_fields.push((key, value));
    }

    Ok(Metadata {
        title,
        author,
        description,
        canonical_url,
        keywords,
        custom_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_round_trip() {
        let metadata = Metadata {
            title: Some("Home".to_string()),
            author: None,
            description: Some(String::new()),
            canonical_url: Some("pixnet://example/".to_string()),
            keywords: vec!["home".to_string(), "landing".to_string()],
            custom_fields: vec![("theme".to_string(), "dark".to_string())],
        };
        let bytes = encode(&metadata);
        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = decode(&mut buf).unwrap();
        assert_eq!(decoded.title, metadata.title);
        assert_eq!(decoded.author, metadata.author);
        assert_eq!(decoded.description, metadata.description);
        assert_eq!(decoded.canonical_url, metadata.canonical_url);
        assert_eq!(decoded.keywords, metadata.keywords);
        assert_eq!(decoded.custom_fields, metadata.custom_fields);
    }

    #[test]
    fn empty_metadata_round_trip() {
        let metadata = Metadata::default();
        let bytes = encode(&metadata);
        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = decode(&mut buf).unwrap();
        assert_eq!(decoded.title, None);
        assert!(decoded.keywords.is_empty());
    }
}
