//! Codec primitives shared by the wire frame codec and the PXNT container
//! codec (§4.1).
//!
//! The wire protocol is big-endian; PXNT is little-endian. Both share the
//! same CRC-32 and length-prefixed string conventions, and both compression
//! wrappers here refuse to misreport a truncated buffer as success — every
//! primitive takes an explicit remaining-length budget and fails closed on
//! overrun.

pub mod compress;
pub mod crc32;
pub mod pxnt_io;
pub mod wire_io;

use std::io;

/// Reads a length-prefixed UTF-8 string, rejecting invalid UTF-8 and
/// overruns of the remaining budget.
///
/// `len` has already been read by the caller (its width differs per message:
/// 1 byte for `PIXHND`'s `ua_len`, 2 bytes for category names, …) so this
/// helper only validates and slices.
pub fn take_utf8_string(buf: &[u8], len: usize) -> io::Result<(String, &[u8])> {
    if buf.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("need {len} bytes for string, have {}", buf.len()),
        ));
    }
    let (raw, rest) = buf.split_at(len);
    let s = String::from_utf8(raw.to_vec())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("invalid UTF-8 string: {e}")))?;
    Ok((s, rest))
}

/// Reads a length-prefixed ASCII string (used for `PIXHND`'s user-agent
/// field), rejecting non-ASCII bytes and overruns.
pub fn take_ascii_string(buf: &[u8], len: usize) -> io::Result<(String, &[u8])> {
    if buf.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("need {len} bytes for string, have {}", buf.len()),
        ));
    }
    let (raw, rest) = buf.split_at(len);
    if !raw.is_ascii() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "expected ASCII string"));
    }
    Ok((String::from_utf8_lossy(raw).into_owned(), rest))
}
