//! Big-endian integer I/O for the wire protocol (§4.1, §6.1).
//!
//! Every read here checks the remaining budget before touching the buffer,
//! so a truncated frame produces a typed `io::Error` instead of a panic.

use bytes::{Buf, BufMut, BytesMut};
use std::io;

fn need(buf: &[u8], n: usize) -> io::Result<()> {
    if buf.len() < n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("need {n} bytes, have {}", buf.len()),
        ));
    }
    Ok(())
}

/// Reads a big-endian `u8` from `buf`, advancing it.
pub fn read_u8(buf: &mut BytesMut) -> io::Result<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

/// Reads a big-endian `u16` from `buf`, advancing it.
pub fn read_u16(buf: &mut BytesMut) -> io::Result<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

/// Reads a big-endian `u32` from `buf`, advancing it.
pub fn read_u32(buf: &mut BytesMut) -> io::Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

/// Reads a big-endian `u64` from `buf`, advancing it.
pub fn read_u64(buf: &mut BytesMut) -> io::Result<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64())
}

/// Reads a big-endian `i32` from `buf`, advancing it.
pub fn read_i32(buf: &mut BytesMut) -> io::Result<i32> {
    need(buf, 4)?;
    Ok(buf.get_i32())
}

/// Writes a big-endian `u8` to `buf`.
pub fn write_u8(buf: &mut BytesMut, v: u8) {
    buf.put_u8(v);
}

/// Writes a big-endian `u16` to `buf`.
pub fn write_u16(buf: &mut BytesMut, v: u16) {
    buf.put_u16(v);
}

/// Writes a big-endian `u32` to `buf`.
pub fn write_u32(buf: &mut BytesMut, v: u32) {
    buf.put_u32(v);
}

/// Writes a big-endian `u64` to `buf`.
pub fn write_u64(buf: &mut BytesMut, v: u64) {
    buf.put_u64(v);
}

/// Writes a big-endian `i32` to `buf`.
pub fn write_i32(buf: &mut BytesMut, v: i32) {
    buf.put_i32(v);
}

/// Reads `len` raw bytes from `buf`, advancing it.
pub fn read_bytes(buf: &mut BytesMut, len: usize) -> io::Result<BytesMut> {
    need(buf, len)?;
    Ok(buf.split_to(len))
}

/// Writes a length-prefixed (1-byte length) UTF-8 string.
pub fn write_string_u8_len(buf: &mut BytesMut, s: &str) {
    debug_assert!(s.len() <= u8::MAX as usize);
    buf.put_u8(s.len() as u8);
    buf.put_slice(s.as_bytes());
}

/// Writes a length-prefixed (2-byte length) UTF-8 string.
pub fn write_string_u16_len(buf: &mut BytesMut, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize);
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_u32() {
        let mut buf = BytesMut::new();
        write_u32(&mut buf, 0xDEAD_BEEF);
        assert_eq!(read_u32(&mut buf).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn truncated_read_fails_closed() {
        let mut buf = BytesMut::from(&b"\x01\x02"[..]);
        assert!(read_u32(&mut buf).is_err());
    }

    #[test]
    fn string_round_trip() {
        let mut buf = BytesMut::new();
        write_string_u8_len(&mut buf, "hello");
        let len = read_u8(&mut buf).unwrap() as usize;
        let raw = read_bytes(&mut buf, len).unwrap();
        assert_eq!(&raw[..], b"hello");
    }
}
