//! Little-endian integer I/O for the PXNT container format (§4.1, §6.2).
//!
//! Mirrors `wire_io` but every multi-byte integer is little-endian, as
//! PXNT's on-disk layout requires.

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

/// Reads a little-endian `u8` from `buf`, advancing it.
pub fn read_u8(buf: &mut BytesMut) -> io::Result<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

/// Reads a little-endian `u16` from `buf`, advancing it.
pub fn read_u16(buf: &mut BytesMut) -> io::Result<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16_le())
}

/// Reads a little-endian `u32` from `buf`, advancing it.
pub fn read_u32(buf: &mut BytesMut) -> io::Result<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32_le())
}

/// Reads a little-endian `u64` from `buf`, advancing it.
pub fn read_u64(buf: &mut BytesMut) -> io::Result<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64_le())
}

/// Writes a little-endian `u8` to `buf`.
pub fn write_u8(buf: &mut BytesMut, v: u8) {
    buf.put_u8(v);
}

/// Writes a little-endian `u16` to `buf`.
pub fn write_u16(buf: &mut BytesMut, v: u16) {
    buf.put_u16_le(v);
}

/// Writes a little-endian `u32` to `buf`.
pub fn write_u32(buf: &mut BytesMut, v: u32) {
    buf.put_u32_le(v);
}

/// Writes a little-endian `u64` to `buf`.
pub fn write_u64(buf: &mut BytesMut, v: u64) {
    buf.put_u64_le(v);
}

/// Reads `len` raw bytes from `buf`, advancing it.
pub fn read_bytes(buf: &mut BytesMut, len: usize) -> io::Result<BytesMut> {
    need(buf, len)?;
    Ok(buf.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_u64() {
        let mut buf = BytesMut::new();
        write_u64(&mut buf, 0x0123_4567_89AB_CDEF);
        assert_eq!(read_u64(&mut buf).unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn little_endian_byte_order() {
        let mut buf = BytesMut::new();
        write_u32(&mut buf, 1);
        assert_eq!(&buf[..], &[1, 0, 0, 0]);
    }
}
