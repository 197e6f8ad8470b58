//! Events the application receives from a running [`crate::server::PixnetServer`].

use crate::page::NavigateTarget;
use crate::url::PixnetUrl;

/// Why a session ended, surfaced alongside [`ServerEvent::Disconnected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent `PIXBYE`.
    PeerClosed,
    /// Keepalive deadline elapsed with no `PIXPOG` (§4.4, §8 keepalive property).
    Timeout,
    /// A fatal framing error was detected (bad magic, sequence gap, checksum mismatch, …).
    ProtocolError(String),
    /// A resource limit was exceeded (frame too large, inbound rate).
    ResourceLimit(String),
    /// The transport closed or errored.
    TransportError(String),
}

/// Events emitted by the PIXNET server to the application (C6, §4.6).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A client completed the handshake and is now `Active`.
    Connected {
        /// Freshly assigned session ID.
        session_id: u64,
    },

    /// A session ended.
    Disconnected {
        /// The session that ended.
        session_id: u64,
        /// Why it ended.
        reason: CloseReason,
    },

    /// A `Navigate` behavior fired (§4.5 step 3.1).
    Navigate {
        /// Session that produced this event.
        session_id: u64,
        /// Category/zone the click originated from.
        zone_id: u16,
        /// Parsed target URL.
        url: PixnetUrl,
        /// Same-context vs. new-context navigation.
        target: NavigateTarget,
    },

    /// An `EmitEvent` behavior fired (debounced, §4.5 step 3.2).
    Emit {
        /// Session that produced this event.
        session_id: u64,
        /// Category/zone the event originated from.
        zone_id: u16,
        /// Event name.
        name: String,
        /// Application-defined event type tag.
        event_type: u8,
        /// Pointer X coordinate at time of event.
        mouse_x: u16,
        /// Pointer Y coordinate at time of event.
        mouse_y: u16,
        /// Modifier mask.
        modifiers: u8,
        /// Opaque event payload.
        payload: Vec<u8>,
    },

    /// An `InputZone` submission arrived (§4.5 step 3.3).
    Input {
        /// Session that produced this event.
        session_id: u64,
        /// Input zone identifier.
        zone_id: u16,
        /// Application-defined input type tag.
        input_type: u8,
        /// Validation outcome as reported by the client (0 = passed).
        validation_status: u8,
        /// Submitted field payload.
        payload: Vec<u8>,
    },

    /// A `ScrollZone` position update (§4.5 step 3.8).
    Scroll {
        /// Session that produced this event.
        session_id: u64,
        /// Scrollable zone.
        zone_id: u16,
        /// New horizontal offset.
        scroll_x: u16,
        /// New vertical offset.
        scroll_y: u16,
    },

    /// A `DragZone`/`DropZone` transition (§4.5 steps 3.6-3.7).
    Drag {
        /// Session that produced this event.
        session_id: u64,
        /// Drag lifecycle stage.
        event_type: u8,
        /// Source zone.
        src: u16,
        /// Target zone, 0 if none.
        dst: u16,
        /// Opaque drag payload.
        data: Vec<u8>,
    },
}
