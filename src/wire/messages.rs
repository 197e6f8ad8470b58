//! Client↔server message envelopes (§6.1), each a fixed-shape struct with
//! its own `encode`/`decode` pair, and the top-level [`Message`] dispatcher
//! keyed on the 6-byte ASCII magic (§4.3).

use bytes::{BufMut, BytesMut};

use crate::codec::wire_io;
use crate::error::{WireError, WireErrorCode};

use super::frame::RenderFrame;

fn io_err(e: std::io::Error) -> WireError {
    WireError::protocol(WireErrorCode::ProtocolError, e.to_string())
}

/// Negotiated capability flags (§6.1: bit0=compression, 1=partial frames,
/// 2=animation, 3=audio, 4..15 reserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// zlib compression of rendering frame pixel data.
    pub compression: bool,
    /// Partial (rectangle diff) frames.
    pub partial_frames: bool,
    /// Animation frames.
    pub animation: bool,
    /// Audio collaborator messages.
    pub audio: bool,
}

const CAP_COMPRESSION: u16 = 1 << 0;
const CAP_PARTIAL_FRAMES: u16 = 1 << 1;
const CAP_ANIMATION: u16 = 1 << 2;
const CAP_AUDIO: u16 = 1 << 3;
const CAP_RESERVED_MASK: u16 = !(CAP_COMPRESSION | CAP_PARTIAL_FRAMES | CAP_ANIMATION | CAP_AUDIO);

impl Capabilities {
    /// Decodes the 16-bit capability bitmask, rejecting set reserved bits.
    pub fn from_bits(bits: u16) -> Result<Self, WireError> {
        if bits & CAP_RESERVED_MASK != 0 {
            return Err(WireError::protocol(
                WireErrorCode::ProtocolError,
                format!("reserved capability bits set: {bits:#06x}"),
            ));
        }
        Ok(Self {
            compression: bits & CAP_COMPRESSION != 0,
            partial_frames: bits & CAP_PARTIAL_FRAMES != 0,
            animation: bits & CAP_ANIMATION != 0,
            audio: bits & CAP_AUDIO != 0,
        })
    }

    /// Encodes to the 16-bit capability bitmask.
    #[must_use]
    pub fn to_bits(self) -> u16 {
        (self.compression as u16 * CAP_COMPRESSION)
            | (self.partial_frames as u16 * CAP_PARTIAL_FRAMES)
            | (self.animation as u16 * CAP_ANIMATION)
            | (self.audio as u16 * CAP_AUDIO)
    }

    /// The capability set both sides support: a bitwise AND (§4.4: "capabilities = client ∩ server").
    #[must_use]
    pub fn intersect(self, other: Self) -> Self {
        Self {
            compression: self.compression && other.compression,
            partial_frames: self.partial_frames && other.partial_frames,
            animation: self.animation && other.animation,
            audio: self.audio && other.audio,
        }
    }
}

/// `PIXHND` (client→server): protocol version, requested capabilities, user agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Client's protocol version.
    pub version: u8,
    /// Requested capability flags.
    pub capabilities: Capabilities,
    /// Free-form ASCII client identifier.
    pub user_agent: String,
}

/// `PIXACK` (server→client): negotiated version, fresh session ID, negotiated capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Negotiated protocol version (`min(client, server)`, §4.4).
    pub version: u8,
    /// Freshly assigned 8-byte session identifier.
    pub session_id: u64,
    /// Negotiated (intersected) capability flags.
    pub capabilities: Capabilities,
}

/// `PIXEVT` (client→server): a category-interpreter-emitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Session this event belongs to.
    pub session_id: u64,
    /// Per-direction sequence number.
    pub sequence: u32,
    /// Category/zone the event originated from.
    pub zone_id: u16,
    /// Application-defined event type tag.
    pub event_type: u8,
    /// Client-local timestamp, informational.
    pub timestamp: u64,
    /// Pointer X coordinate at time of event.
    pub mouse_x: u16,
    /// Pointer Y coordinate at time of event.
    pub mouse_y: u16,
    /// Keyboard/pointer modifier mask.
    pub modifiers: u8,
    /// Event name (e.g. `"navigate"`, `"click"`).
    pub name: String,
    /// Opaque event-specific payload (e.g. a navigate URL's path+query).
    pub payload: Vec<u8>,
}

/// `PIXINP` (client→server): an input zone submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    /// Session this submission belongs to.
    pub session_id: u64,
    /// Per-direction sequence number.
    pub sequence: u32,
    /// Input zone identifier.
    pub zone_id: u16,
    /// Application-defined input type tag.
    pub input_type: u8,
    /// Validation outcome (0 = passed, nonzero = failed; §4.5 step 3).
    pub validation_status: u8,
    /// Submitted field payload.
    pub payload: Vec<u8>,
}

/// `PIXSCR` (client→server): a scroll-position update. Carries no sequence
/// field on the wire, so the session state machine does not apply the
/// `sequence == in_seq` guard to it (§4.4/§6.1; only `PIXEVT`/`PIXINP`
/// carry a sequence number to check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scroll {
    /// Session this update belongs to.
    pub session_id: u64,
    /// Scrollable zone identifier.
    pub zone_id: u16,
    /// New horizontal scroll offset.
    pub scroll_x: u16,
    /// New vertical scroll offset.
    pub scroll_y: u16,
}

/// `PIXDRG` (client→server): a drag/drop state transition. Carries no
/// sequence field, for the same reason as [`Scroll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drag {
    /// Session this event belongs to.
    pub session_id: u64,
    /// Drag lifecycle stage (start/move/drop/cancel), application-defined encoding.
    pub event_type: u8,
    /// Source zone (the dragged `DragZone`).
    pub src: u16,
    /// Target zone (the `DropZone` under the pointer, or 0 if none).
    pub dst: u16,
    /// Pointer X coordinate.
    pub mouse_x: u16,
    /// Pointer Y coordinate.
    pub mouse_y: u16,
    /// Opaque drag payload (e.g. dragged data type hint).
    pub data: Vec<u8>,
}

/// `PIXPNG`/`PIXPOG`: the keepalive ping/pong pair (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive {
    /// Session this keepalive belongs to.
    pub session_id: u64,
    /// Echoed timestamp.
    pub timestamp: u64,
}

/// `PIXERR`: a typed protocol error reported to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Session this error applies to (0 if pre-handshake).
    pub session_id: u64,
    /// Wire error code (§6.4).
    pub code: u16,
    /// Human-readable detail.
    pub message: String,
}

/// `PIXBYE`: graceful session termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bye {
    /// Session being closed.
    pub session_id: u64,
    /// Application-defined reason code.
    pub reason_code: u8,
    /// Human-readable reason.
    pub reason: String,
}

/// Every message type exchanged on the wire (§4.3), tagged by its 6-byte
/// ASCII magic. An unrecognized magic fails closed (§4.3: `PROTOCOL_ERROR`,
/// session closed) rather than guessing at a layout.
#[derive(Debug, Clone)]
pub enum Message {
    /// `PIXHND`
    Handshake(Handshake),
    /// `PIXACK`
    Ack(Ack),
    /// `PIXNET` rendering frame.
    Frame(RenderFrame),
    /// `PIXEVT`
    Event(Event),
    /// `PIXINP`
    Input(Input),
    /// `PIXSCR`
    Scroll(Scroll),
    /// `PIXDRG`
    Drag(Drag),
    /// `PIXPNG`
    Ping(KeepAlive),
    /// `PIXPOG`
    Pong(KeepAlive),
    /// `PIXERR`
    Error(ErrorMessage),
    /// `PIXBYE`
    Bye(Bye),
}

impl Message {
    /// Decodes a message by dispatching on its 6-byte magic, applying the
    /// default decompression ceiling to any compressed frame payload. Use
    /// [`Message::decode_with_ceiling`] to apply a configured one instead.
    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        Self::decode_with_ceiling(data, crate::codec::compress::DEFAULT_DECOMPRESSION_CEILING)
    }

    /// Decodes a message by dispatching on its 6-byte magic. `decompression_ceiling`
    /// bounds how many bytes a compressed [`Message::Frame`] payload may
    /// expand to (§4.2 step 4); ignored by every other variant.
    pub fn decode_with_ceiling(data: &[u8], decompression_ceiling: usize) -> Result<Self, WireError> {
        if data.len() < 6 {
            return Err(WireError::protocol(WireErrorCode::ProtocolError, "message shorter than magic"));
        }
        match &data[..6] {
            b"PIXHND" => decode_handshake(&data[6..]).map(Message::Handshake),
            b"PIXACK" => decode_ack(&data[6..]).map(Message::Ack),
            b"PIXNET" => RenderFrame::decode(data, decompression_ceiling).map(Message::Frame),
            b"PIXEVT" => decode_event(&data[6..]).map(Message::Event),
            b"PIXINP" => decode_input(&data[6..]).map(Message::Input),
            b"PIXSCR" => decode_scroll(&data[6..]).map(Message::Scroll),
            b"PIXDRG" => decode_drag(&data[6..]).map(Message::Drag),
            b"PIXPNG" => decode_keepalive(&data[6..]).map(Message::Ping),
            b"PIXPOG" => decode_keepalive(&data[6..]).map(Message::Pong),
            b"PIXERR" => decode_error(&data[6..]).map(Message::Error),
            b"PIXBYE" => decode_bye(&data[6..]).map(Message::Bye),
            other => Err(WireError::protocol(
                WireErrorCode::ProtocolError,
                format!("unknown message magic {:?}", String::from_utf8_lossy(other)),
            )),
        }
    }

    /// Encodes this message back to its wire form. `compress_frame_pixels`
    /// is only consulted for the [`Message::Frame`] variant, where it gates
    /// zlib compression of the pixel payload (§4.3) per the session's
    /// negotiated capability; it is ignored by every other variant.
    pub fn encode(&self, compress_frame_pixels: bool) -> Result<Vec<u8>, WireError> {
        Ok(match self {
            Self::Handshake(m) => encode_handshake(m),
            Self::Ack(m) => encode_ack(m),
            Self::Frame(m) => m.encode(compress_frame_pixels)?,
            Self::Event(m) => encode_event(m),
            Self::Input(m) => encode_input(m),
            Self::Scroll(m) => encode_scroll(m),
            Self::Drag(m) => encode_drag(m),
            Self::Ping(m) => encode_keepalive(b"PIXPNG", m),
            Self::Pong(m) => encode_keepalive(b"PIXPOG", m),
            Self::Error(m) => encode_error(m),
            Self::Bye(m) => encode_bye(m),
        })
    }
}

fn encode_handshake(m: &Handshake) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXHND");
    buf.put_u8(m.version);
    buf.put_u16(m.capabilities.to_bits());
    buf.put_u8(m.user_agent.len() as u8);
    buf.put_slice(m.user_agent.as_bytes());
    buf.to_vec()
}

fn decode_handshake(data: &[u8]) -> Result<Handshake, WireError> {
    let mut buf = BytesMut::from(data);
    let version = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let capabilities = Capabilities::from_bits(wire_io::read_u16(&mut buf).map_err(io_err)?)?;
    let ua_len = wire_io::read_u8(&mut buf).map_err(io_err)? as usize;
    let (user_agent, _) = crate::codec::take_ascii_string(&buf, ua_len).map_err(io_err)?;
    Ok(Handshake {
        version,
        capabilities,
        user_agent,
    })
}

fn encode_ack(m: &Ack) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXACK");
    buf.put_u8(m.version);
    buf.put_u64(m.session_id);
    buf.put_u16(m.capabilities.to_bits());
    buf.to_vec()
}

fn decode_ack(data: &[u8]) -> Result<Ack, WireError> {
    let mut buf = BytesMut::from(data);
    let version = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let capabilities = Capabilities::from_bits(wire_io::read_u16(&mut buf).map_err(io_err)?)?;
    Ok(Ack {
        version,
        session_id,
        capabilities,
    })
}

fn encode_event(m: &Event) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXEVT");
    buf.put_u64(m.session_id);
    buf.put_u32(m.sequence);
    buf.put_u16(m.zone_id);
    buf.put_u8(m.event_type);
    buf.put_u64(m.timestamp);
    buf.put_u16(m.mouse_x);
    buf.put_u16(m.mouse_y);
    buf.put_u8(m.modifiers);
    buf.put_u8(m.name.len() as u8);
    buf.put_slice(m.name.as_bytes());
    buf.put_u16(m.payload.len() as u16);
    buf.put_slice(&m.payload);
    buf.to_vec()
}

fn decode_event(data: &[u8]) -> Result<Event, WireError> {
    let mut buf = BytesMut::from(data);
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let sequence = wire_io::read_u32(&mut buf).map_err(io_err)?;
    let zone_id = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let event_type = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let timestamp = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let mouse_x = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let mouse_y = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let modifiers = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let name_len = wire_io::read_u8(&mut buf).map_err(io_err)? as usize;
    let name = String::from_utf8(wire_io::read_bytes(&mut buf, name_len).map_err(io_err)?.to_vec())
        .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;
    let payload_len = wire_io::read_u16(&mut buf).map_err(io_err)? as usize;
    let payload = wire_io::read_bytes(&mut buf, payload_len).map_err(io_err)?.to_vec();
    Ok(Event {
        session_id,
        sequence,
        zone_id,
        event_type,
        timestamp,
        mouse_x,
        mouse_y,
        modifiers,
        name,
        payload,
    })
}

fn encode_input(m: &Input) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXINP");
    buf.put_u64(m.session_id);
    buf.put_u32(m.sequence);
    buf.put_u16(m.zone_id);
    buf.put_u8(m.input_type);
    buf.put_u8(m.validation_status);
    buf.put_u16(m.payload.len() as u16);
    buf.put_slice(&m.payload);
    buf.to_vec()
}

fn decode_input(data: &[u8]) -> Result<Input, WireError> {
    let mut buf = BytesMut::from(data);
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let sequence = wire_io::read_u32(&mut buf).map_err(io_err)?;
    let zone_id = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let input_type = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let validation_status = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let payload_len = wire_io::read_u16(&mut buf).map_err(io_err)? as usize;
    let payload = wire_io::read_bytes(&mut buf, payload_len).map_err(io_err)?.to_vec();
    Ok(Input {
        session_id,
        sequence,
        zone_id,
        input_type,
        validation_status,
        payload,
    })
}

fn encode_scroll(m: &Scroll) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXSCR");
    buf.put_u64(m.session_id);
    buf.put_u16(m.zone_id);
    buf.put_u16(m.scroll_x);
    buf.put_u16(m.scroll_y);
    buf.to_vec()
}

fn decode_scroll(data: &[u8]) -> Result<Scroll, WireError> {
    let mut buf = BytesMut::from(data);
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let zone_id = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let scroll_x = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let scroll_y = wire_io::read_u16(&mut buf).map_err(io_err)?;
    Ok(Scroll {
        session_id,
        zone_id,
        scroll_x,
        scroll_y,
    })
}

fn encode_drag(m: &Drag) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXDRG");
    buf.put_u64(m.session_id);
    buf.put_u8(m.event_type);
    buf.put_u16(m.src);
    buf.put_u16(m.dst);
    buf.put_u16(m.mouse_x);
    buf.put_u16(m.mouse_y);
    buf.put_u16(m.data.len() as u16);
    buf.put_slice(&m.data);
    buf.to_vec()
}

fn decode_drag(data: &[u8]) -> Result<Drag, WireError> {
    let mut buf = BytesMut::from(data);
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let event_type = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let src = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let dst = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let mouse_x = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let mouse_y = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let data_len = wire_io::read_u16(&mut buf).map_err(io_err)? as usize;
    let data = wire_io::read_bytes(&mut buf, data_len).map_err(io_err)?.to_vec();
    Ok(Drag {
        session_id,
        event_type,
        src,
        dst,
        mouse_x,
        mouse_y,
        data,
    })
}

fn encode_keepalive(magic: &[u8; 6], m: &KeepAlive) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(magic);
    buf.put_u64(m.session_id);
    buf.put_u64(m.timestamp);
    buf.to_vec()
}

fn decode_keepalive(data: &[u8]) -> Result<KeepAlive, WireError> {
    let mut buf = BytesMut::from(data);
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let timestamp = wire_io::read_u64(&mut buf).map_err(io_err)?;
    Ok(KeepAlive { session_id, timestamp })
}

fn encode_error(m: &ErrorMessage) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXERR");
    buf.put_u64(m.session_id);
    buf.put_u16(m.code);
    buf.put_u8(m.message.len() as u8);
    buf.put_slice(m.message.as_bytes());
    buf.to_vec()
}

fn decode_error(data: &[u8]) -> Result<ErrorMessage, WireError> {
    let mut buf = BytesMut::from(data);
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let code = wire_io::read_u16(&mut buf).map_err(io_err)?;
    let msg_len = wire_io::read_u8(&mut buf).map_err(io_err)? as usize;
    let message = String::from_utf8(wire_io::read_bytes(&mut buf, msg_len).map_err(io_err)?.to_vec())
        .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;
    Ok(ErrorMessage { session_id, code, message })
}

fn encode_bye(m: &Bye) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_slice(b"PIXBYE");
    buf.put_u64(m.session_id);
    buf.put_u8(m.reason_code);
    buf.put_u8(m.reason.len() as u8);
    buf.put_slice(m.reason.as_bytes());
    buf.to_vec()
}

fn decode_bye(data: &[u8]) -> Result<Bye, WireError> {
    let mut buf = BytesMut::from(data);
    let session_id = wire_io::read_u64(&mut buf).map_err(io_err)?;
    let reason_code = wire_io::read_u8(&mut buf).map_err(io_err)?;
    let reason_len = wire_io::read_u8(&mut buf).map_err(io_err)? as usize;
    let reason = String::from_utf8(wire_io::read_bytes(&mut buf, reason_len).map_err(io_err)?.to_vec())
        .map_err(|e| WireError::protocol(WireErrorCode::ProtocolError, e.to_string()))?;
    Ok(Bye {
        session_id,
        reason_code,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_round_trip() {
        let m = Handshake {
            version: 1,
            capabilities: Capabilities {
                compression: true,
                partial_frames: false,
                animation: false,
                audio: false,
            },
            user_agent: "test-client".to_string(),
        };
        let bytes = encode_handshake(&m);
        let decoded = decode_handshake(&bytes[6..]).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn ack_round_trip() {
        let m = Ack {
            version: 1,
            session_id: 0x0102_0304_0506_0708,
            capabilities: Capabilities::default(),
        };
        let bytes = encode_ack(&m);
        let decoded = decode_ack(&bytes[6..]).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn event_round_trip() {
        let m = Event {
            session_id: 1,
            sequence: 2,
            zone_id: 3,
            event_type: 1,
            timestamp: 999,
            mouse_x: 10,
            mouse_y: 20,
            modifiers: 0,
            name: "navigate".to_string(),
            payload: b"/next".to_vec(),
        };
        let bytes = encode_event(&m);
        let decoded = decode_event(&bytes[6..]).unwrap();
        assert_eq!(decoded, m);
    }

    #[test]
    fn scroll_round_trip() {
        let m = Scroll {
            session_id: 1,
            zone_id: 5,
            scroll_x: 10,
            scroll_y: 20,
        };
        let bytes = encode_scroll(&m);
        assert_eq!(decode_scroll(&bytes[6..]).unwrap(), m);
    }

    #[test]
    fn message_dispatch_rejects_unknown_magic() {
        let data = b"BOGUS!rest".to_vec();
        assert!(Message::decode(&data).is_err());
    }

    #[test]
    fn message_dispatch_routes_bye() {
        let m = Bye {
            session_id: 1,
            reason_code: 0,
            reason: "done".to_string(),
        };
        let bytes = encode_bye(&m);
        match Message::decode(&bytes).unwrap() {
            Message::Bye(decoded) => assert_eq!(decoded, m),
            _ => panic!("expected Bye"),
        }
    }

    #[test]
    fn capabilities_reject_reserved_bits() {
        assert!(Capabilities::from_bits(0x8000).is_err());
    }

    #[test]
    fn capabilities_intersect() {
        let a = Capabilities {
            compression: true,
            partial_frames: true,
            animation: false,
            audio: false,
        };
        let b = Capabilities {
            compression: true,
            partial_frames: false,
            animation: true,
            audio: false,
        };
        let intersected = a.intersect(b);
        assert!(intersected.compression);
        assert!(!intersected.partial_frames);
        assert!(!intersected.animation);
    }
}
