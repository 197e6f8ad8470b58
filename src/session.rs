//! The per-connection session state machine (C4, §4.4).
//!
//! One [`Session`] owns one transport stream end-to-end: the handshake,
//! then a `tokio::select!` loop driving inbound reads, the keepalive timer,
//! and outbound frame pushes from the server. `in_seq`/`out_seq` are held
//! as plain fields (not atomics) since exactly one task ever touches them —
//! the same "shared mutable state → immutable Pages" reasoning extended to
//! the session's own counters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, BytesMut};
use log::{debug, info, warn};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, RwLock};

use crate::error::{WireError, WireErrorCode};
use crate::events::{CloseReason, ServerEvent};
use crate::interpreter::{self, OutboundIntent, PointerAction};
use crate::page::Page;
use crate::server::ServerConfig;
use crate::wire::frame::{FrameType, RenderFrame};
use crate::wire::messages::{Ack, Capabilities, KeepAlive, Message};

/// Protocol version this implementation understands. Scenario 6 (§8):
/// any other declared version is rejected with `UNSUPPORTED_VERSION`,
/// rather than negotiated down via `min(client, server)` — see DESIGN.md.
pub const SUPPORTED_VERSION: u8 = 1;

const LENGTH_PREFIX_SIZE: usize = 4;

/// A session's lifecycle state (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the client's `PIXHND`.
    Handshake,
    /// Handshake complete; exchanging frames and events.
    Active,
    /// A graceful `PIXBYE` is draining.
    Closing,
    /// Terminated; resources released.
    Closed,
}

/// A command sent from the server dispatcher to a running session's task.
#[derive(Debug)]
pub enum SessionCommand {
    /// Push a new rendering frame to the client.
    SendFrame(Arc<Page>),
    /// Gracefully close the session.
    Close,
}

/// Why an inbound message failed the `session_id`/`sequence` guard (§4.4).
/// Carried explicitly rather than re-derived from
/// `mismatched_session_id_count`, which a prior unrelated mismatch could
/// leave nonzero and mask a later, genuine sequence gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InboundRejection {
    /// `session_id` did not match this session's assigned ID.
    SessionMismatch,
    /// `session_id` matched but the sequence counter did not.
    SequenceGap,
}

/// Drives one connection's handshake, active loop, and teardown.
pub struct Session<S> {
    stream: S,
    config: ServerConfig,
    server_capabilities: Capabilities,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    current_page: Arc<RwLock<Option<Arc<Page>>>>,
    recv_buf: BytesMut,
    state: SessionState,
    session_id: u64,
    negotiated_capabilities: Capabilities,
    in_seq: u32,
    out_seq: u32,
    last_activity: Instant,
    keepalive_pending_since: Option<Instant>,
    mismatched_session_id_count: u32,
    inbound_count_this_window: u32,
    rate_window_start: Instant,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Constructs a session over an already-accepted transport stream.
    pub fn new(
        stream: S,
        config: ServerConfig,
        server_capabilities: Capabilities,
        event_tx: mpsc::UnboundedSender<ServerEvent>,
        command_rx: mpsc::UnboundedReceiver<SessionCommand>,
        current_page: Arc<RwLock<Option<Arc<Page>>>>,
    ) -> Self {
        let now = Instant::now();
        Self {
            stream,
            config,
            server_capabilities,
            event_tx,
            command_rx,
            current_page,
            recv_buf: BytesMut::with_capacity(4096),
            state: SessionState::Handshake,
            session_id: 0,
            negotiated_capabilities: Capabilities::default(),
            in_seq: 0,
            out_seq: 0,
            last_activity: now,
            keepalive_pending_since: None,
            mismatched_session_id_count: 0,
            inbound_count_this_window: 0,
            rate_window_start: now,
        }
    }

    /// Runs the handshake and then the active loop to completion, never
    /// propagating an error outward: every fault is translated into a
    /// [`CloseReason`] and the session's own ID (0 if the handshake never
    /// completed).
    /// Runs the handshake and then the active loop to completion, never
    /// propagating an error outward. Convenience wrapper over
    /// [`Session::handshake`] + [`Session::run_to_completion`] for callers
    /// that don't need to register the session between the two (tests,
    /// standalone clients).
    pub async fn run(mut self) -> (u64, CloseReason) {
        if let Err(reason) = self.handshake().await {
            return (self.session_id, reason);
        }
        let reason = self.run_to_completion().await;
        (self.session_id, reason)
    }

    /// Performs the `PIXHND`/`PIXACK` exchange and returns the freshly
    /// assigned session ID. Split out from [`Session::run`] so a server
    /// dispatcher can register the session (by ID) in its routing table
    /// before the active loop — and therefore outbound frame pushes —
    /// begins.
    pub async fn handshake(&mut self) -> Result<u64, CloseReason> {
        self.do_handshake().await?;
        Ok(self.session_id)
    }

    /// Runs the active loop until the session closes, emitting
    /// [`ServerEvent::Disconnected`] on the way out. Must be called after
    /// a successful [`Session::handshake`].
    pub async fn run_to_completion(mut self) -> CloseReason {
        let reason = self.run_active().await;
        self.state = SessionState::Closed;
        let _ = self.event_tx.send(ServerEvent::Disconnected {
            session_id: self.session_id,
            reason: reason.clone(),
        });
        reason
    }

    async fn do_handshake(&mut self) -> Result<(), CloseReason> {
        let bytes = self
            .read_one_message()
            .await
            .map_err(|e| CloseReason::TransportError(e.to_string()))?
            .ok_or_else(|| CloseReason::TransportError("connection closed before handshake".to_string()))?;

        let message = Message::decode_with_ceiling(&bytes, self.config.decompression_ceiling)
            .map_err(|e| CloseReason::ProtocolError(e.to_string()))?;
        let Message::Handshake(handshake) = message else {
            let _ = self.send_error(0, WireErrorCode::ProtocolError, "expected PIXHND").await;
            return Err(CloseReason::ProtocolError("first message was not PIXHND".to_string()));
        };

        if handshake.version != SUPPORTED_VERSION {
            let _ = self
                .send_error(0, WireErrorCode::UnsupportedVersion, format!("unsupported version {}", handshake.version))
                .await;
            return Err(CloseReason::ProtocolError(format!("unsupported version {}", handshake.version)));
        }

        self.negotiated_capabilities = handshake.capabilities.intersect(self.server_capabilities);
        self.session_id = fresh_session_id();

        let ack = Message::Ack(Ack {
            version: SUPPORTED_VERSION,
            session_id: self.session_id,
            capabilities: self.negotiated_capabilities,
        });
        self.write_message(&ack, false)
            .await
            .map_err(|e| CloseReason::TransportError(e.to_string()))?;

        self.state = SessionState::Active;
        self.last_activity = Instant::now();
        info!("session {:016x} active (ua={:?})", self.session_id, handshake.user_agent);
        let _ = self.event_tx.send(ServerEvent::Connected { session_id: self.session_id });
        Ok(())
    }

    async fn run_active(&mut self) -> CloseReason {
        let tick = (self.config.keepalive_idle.min(self.config.keepalive_timeout) / 4).max(Duration::from_millis(10));
        let mut keepalive_timer = tokio::time::interval(tick);

        loop {
            tokio::select! {
                read_result = self.read_one_message() => {
                    match read_result {
                        Ok(Some(bytes)) => {
                            if let Some(reason) = self.handle_inbound(&bytes).await {
                                return reason;
                            }
                        }
                        Ok(None) => return CloseReason::PeerClosed,
                        Err(e) => return CloseReason::TransportError(e.to_string()),
                    }
                }
                _ = keepalive_timer.tick() => {
                    if let Some(reason) = self.check_keepalive().await {
                        return reason;
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SessionCommand::SendFrame(page)) => {
                            if let Err(e) = self.send_frame(&page).await {
                                return CloseReason::TransportError(e.to_string());
                            }
                        }
                        Some(SessionCommand::Close) | None => {
                            let _ = self.write_message(
                                &Message::Bye(crate::wire::messages::Bye {
                                    session_id: self.session_id,
                                    reason_code: 0,
                                    reason: "server closing".to_string(),
                                }),
                                false,
                            ).await;
                            return CloseReason::PeerClosed;
                        }
                    }
                }
            }
        }
    }

    async fn handle_inbound(&mut self, bytes: &[u8]) -> Option<CloseReason> {
        let message = match Message::decode_with_ceiling(bytes, self.config.decompression_ceiling) {
            Ok(m) => m,
            Err(e) => {
                warn!("session {:016x}: malformed message: {e}", self.session_id);
                let _ = self.send_error(self.session_id, WireErrorCode::ProtocolError, e.to_string()).await;
                return Some(CloseReason::ProtocolError(e.to_string()));
            }
        };
        self.last_activity = Instant::now();

        if !self.check_rate_limit().await {
            return Some(CloseReason::ResourceLimit("inbound rate exceeded".to_string()));
        }

        match message {
            Message::Ping(ping) => {
                let _ = self
                    .write_message(
                        &Message::Pong(KeepAlive {
                            session_id: self.session_id,
                            timestamp: ping.timestamp,
                        }),
                        false,
                    )
                    .await;
                None
            }
            Message::Pong(_) => {
                self.keepalive_pending_since = None;
                None
            }
            Message::Bye(_) => Some(CloseReason::PeerClosed),
            Message::Event(evt) => {
                if let Err(rejection) = self.accept_session_and_sequence(evt.session_id, Some(evt.sequence)).await {
                    return self.reject_inbound(rejection).await;
                }
                let intent = self.resolve_event_intent(evt.zone_id).await;
                if let Some(OutboundIntent::Navigate { url, target }) = intent {
                    let _ = self.event_tx.send(ServerEvent::Navigate {
                        session_id: self.session_id,
                        zone_id: evt.zone_id,
                        url,
                        target,
                    });
                } else {
                    let _ = self.event_tx.send(ServerEvent::Emit {
                        session_id: self.session_id,
                        zone_id: evt.zone_id,
                        name: evt.name,
                        event_type: evt.event_type,
                        mouse_x: evt.mouse_x,
                        mouse_y: evt.mouse_y,
                        modifiers: evt.modifiers,
                        payload: evt.payload,
                    });
                }
                None
            }
            Message::Input(inp) => {
                if let Err(rejection) = self.accept_session_and_sequence(inp.session_id, Some(inp.sequence)).await {
                    return self.reject_inbound(rejection).await;
                }
                let _ = self.event_tx.send(ServerEvent::Input {
                    session_id: self.session_id,
                    zone_id: inp.zone_id,
                    input_type: inp.input_type,
                    validation_status: inp.validation_status,
                    payload: inp.payload,
                });
                None
            }
            Message::Scroll(scroll) => {
                if let Err(rejection) = self.accept_session_and_sequence(scroll.session_id, None).await {
                    return self.reject_inbound(rejection).await;
                }
                let _ = self.event_tx.send(ServerEvent::Scroll {
                    session_id: self.session_id,
                    zone_id: scroll.zone_id,
                    scroll_x: scroll.scroll_x,
                    scroll_y: scroll.scroll_y,
                });
                None
            }
            Message::Drag(drag) => {
                if let Err(rejection) = self.accept_session_and_sequence(drag.session_id, None).await {
                    return self.reject_inbound(rejection).await;
                }
                let _ = self.event_tx.send(ServerEvent::Drag {
                    session_id: self.session_id,
                    event_type: drag.event_type,
                    src: drag.src,
                    dst: drag.dst,
                    data: drag.data,
                });
                None
            }
            Message::Handshake(_) | Message::Ack(_) | Message::Frame(_) | Message::Error(_) => {
                warn!("session {:016x}: unexpected message type in Active state", self.session_id);
                Some(CloseReason::ProtocolError("unexpected message type".to_string()))
            }
        }
    }

    /// Looks up `zone_id` in the currently published Page and dispatches its
    /// behavior, so a `Navigate` category can be reported as
    /// [`ServerEvent::Navigate`] instead of a generic `Emit` (§4.5 step
    /// 3.1). Returns `None` if no Page has been published yet, or `zone_id`
    /// names no category on it (the caller falls back to a plain `Emit`
    /// carrying the wire message's own fields in that case).
    async fn resolve_event_intent(&self, zone_id: u16) -> Option<OutboundIntent> {
        let page = self.current_page.read().await;
        let def = page.as_ref()?.categories.get(&zone_id)?;
        Some(interpreter::dispatch(def, PointerAction::Click))
    }

    /// Validates `session_id` and, when the message carries one, the
    /// inbound `sequence` counter (§4.4; `PIXSCR`/`PIXDRG` carry no
    /// sequence field on the wire, so that half of the guard does not
    /// apply to them — see DESIGN.md).
    async fn accept_session_and_sequence(&mut self, session_id: u64, sequence: Option<u32>) -> Result<(), InboundRejection> {
        if session_id != self.session_id {
            self.mismatched_session_id_count += 1;
            warn!(
                "session {:016x}: mismatched session_id {:016x} in inbound message ({}/{})",
                self.session_id, session_id, self.mismatched_session_id_count, self.config.mismatched_session_id_threshold
            );
            return Err(InboundRejection::SessionMismatch);
        }
        if let Some(seq) = sequence {
            if seq != self.in_seq {
                return Err(InboundRejection::SequenceGap);
            }
            self.in_seq = self.in_seq.wrapping_add(1);
        }
        Ok(())
    }

    /// Closes the session for a [`InboundRejection::SequenceGap`]
    /// unconditionally (§8 sequence monotonicity property), but only closes
    /// for [`InboundRejection::SessionMismatch`] once the configured
    /// tolerance is exceeded (§4.4: a single mismatched `session_id` is not
    /// itself a protocol error).
    async fn reject_inbound(&mut self, rejection: InboundRejection) -> Option<CloseReason> {
        match rejection {
            InboundRejection::SessionMismatch => {
                if self.mismatched_session_id_count > self.config.mismatched_session_id_threshold {
                    let _ = self
                        .send_error(self.session_id, WireErrorCode::InvalidSession, "too many mismatched session ids")
                        .await;
                    return Some(CloseReason::ProtocolError("mismatched session id threshold exceeded".to_string()));
                }
                None
            }
            InboundRejection::SequenceGap => {
                let _ = self.send_error(self.session_id, WireErrorCode::ProtocolError, "sequence gap").await;
                Some(CloseReason::ProtocolError("sequence gap".to_string()))
            }
        }
    }

    async fn check_keepalive(&mut self) -> Option<CloseReason> {
        let now = Instant::now();
        match self.keepalive_pending_since {
            Some(sent_at) => {
                if now.duration_since(sent_at) >= self.config.keepalive_timeout {
                    return Some(CloseReason::Timeout);
                }
                None
            }
            None => {
                if now.duration_since(self.last_activity) >= self.config.keepalive_idle {
                    let ping = Message::Ping(KeepAlive {
                        session_id: self.session_id,
                        timestamp: now.elapsed().as_micros() as u64,
                    });
                    if let Err(e) = self.write_message(&ping, false).await {
                        return Some(CloseReason::TransportError(e.to_string()));
                    }
                    self.keepalive_pending_since = Some(now);
                }
                None
            }
        }
    }

    async fn check_rate_limit(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.rate_window_start) >= Duration::from_secs(1) {
            self.rate_window_start = now;
            self.inbound_count_this_window = 0;
        }
        self.inbound_count_this_window += 1;
        if self.inbound_count_this_window > self.config.max_inbound_rate {
            let _ = self.send_error(self.session_id, WireErrorCode::RateLimited, "inbound rate exceeded").await;
            return false;
        }
        true
    }

    async fn send_frame(&mut self, page: &Page) -> Result<(), WireError> {
        let frame = RenderFrame {
            frame_type: FrameType::Full,
            sequence: self.out_seq,
            timestamp_us: Instant::now().elapsed().as_micros() as u64,
            version: SUPPORTED_VERSION,
            page: page.clone(),
        };
        self.out_seq = self.out_seq.wrapping_add(1);
        self.write_message(&Message::Frame(frame), self.negotiated_capabilities.compression).await
    }

    async fn send_error(&mut self, session_id: u64, code: WireErrorCode, message: impl Into<String>) -> Result<(), WireError> {
        let error = Message::Error(crate::wire::messages::ErrorMessage {
            session_id,
            code: error_code_number(code),
            message: message.into(),
        });
        self.write_message(&error, false).await
    }

    async fn write_message(&mut self, message: &Message, compress_frame_pixels: bool) -> Result<(), WireError> {
        let body = message.encode(compress_frame_pixels)?;
        if body.len() > self.config.max_inbound_message_size {
            return Err(WireError::protocol(WireErrorCode::FrameTooLarge, "outbound message exceeds configured size limit"));
        }
        let mut framed = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
        framed.put_u32(body.len() as u32);
        framed.extend_from_slice(&body);
        self.stream.write_all(&framed).await.map_err(WireError::Io)?;
        self.stream.flush().await.map_err(WireError::Io)?;
        Ok(())
    }

    /// Reads one length-prefixed message, returning `None` on clean EOF.
    /// The 4-byte length prefix is a transport-level framing convention
    /// added on top of each message's own layout (none of which carry an
    /// outer total length) so messages remain delimitable over a
    /// continuous byte stream — see DESIGN.md.
    async fn read_one_message(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        loop {
            if self.recv_buf.len() >= LENGTH_PREFIX_SIZE {
                let declared_len = u32::from_be_bytes(self.recv_buf[..LENGTH_PREFIX_SIZE].try_into().unwrap()) as usize;
                if declared_len > self.config.max_inbound_message_size {
                    return Err(WireError::protocol(WireErrorCode::FrameTooLarge, "inbound message exceeds configured size limit"));
                }
                if self.recv_buf.len() >= LENGTH_PREFIX_SIZE + declared_len {
                    self.recv_buf.advance(LENGTH_PREFIX_SIZE);
                    let body = self.recv_buf.split_to(declared_len);
                    return Ok(Some(body.to_vec()));
                }
            }
            let read = self.stream.read_buf(&mut self.recv_buf).await.map_err(WireError::Io)?;
            if read == 0 {
                if self.recv_buf.is_empty() {
                    return Ok(None);
                }
                return Err(WireError::ConnectionClosed);
            }
        }
    }
}

fn fresh_session_id() -> u64 {
    loop {
        let id = rand::thread_rng().gen::<u64>();
        if id != 0 {
            return id;
        }
    }
}

fn error_code_number(code: WireErrorCode) -> u16 {
    code as u16
}

/// Encodes a `Message` with an outer 4-byte length prefix, matching what
/// [`Session::read_one_message`] expects on the wire. Exposed for callers
/// (e.g. a client implementation) driving a raw transport outside the
/// server dispatcher.
pub fn write_framed(message: &Message, compress_frame_pixels: bool) -> Result<Vec<u8>, WireError> {
    let body = message.encode(compress_frame_pixels)?;
    let mut out = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    out.put_u32(body.len() as u32);
    out.extend_from_slice(&body);
    Ok(out.to_vec())
}

/// Decodes a single length-prefixed message from the front of `buf`,
/// advancing it. Returns `Ok(None)` if `buf` does not yet contain a
/// complete message.
pub fn read_framed(buf: &mut BytesMut) -> Result<Option<Message>, WireError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }
    let declared_len = u32::from_be_bytes(buf[..LENGTH_PREFIX_SIZE].try_into().unwrap()) as usize;
    if buf.len() < LENGTH_PREFIX_SIZE + declared_len {
        return Ok(None);
    }
    buf.advance(LENGTH_PREFIX_SIZE);
    let body = buf.split_to(declared_len);
    Message::decode(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::messages::Handshake;
    use tokio::io::duplex;

    fn test_config() -> ServerConfig {
        ServerConfig::new()
            .with_keepalive(Duration::from_millis(100), Duration::from_millis(100))
            .with_max_inbound_rate(1000)
    }

    #[test]
    fn framed_round_trip() {
        let msg = Message::Ping(KeepAlive {
            session_id: 42,
            timestamp: 7,
        });
        let bytes = write_framed(&msg, false).unwrap();
        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = read_framed(&mut buf).unwrap().unwrap();
        match decoded {
            Message::Ping(p) => assert_eq!(p.session_id, 42),
            _ => panic!("expected Ping"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn framed_reports_incomplete() {
        let msg = Message::Ping(KeepAlive { session_id: 1, timestamp: 1 });
        let bytes = write_framed(&msg, false).unwrap();
        let mut buf = BytesMut::from(&bytes[..bytes.len() - 1]);
        assert!(read_framed(&mut buf).unwrap().is_none());
    }

    #[tokio::test]
    async fn handshake_assigns_session_and_acks() {
        let (client, server) = duplex(4096);
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session = Session::new(
            server,
            test_config(),
            Capabilities::default(),
            event_tx,
            cmd_rx,
            Arc::new(RwLock::new(None)),
        );

        let handle = tokio::spawn(session.run());

        let handshake = Message::Handshake(Handshake {
            version: SUPPORTED_VERSION,
            capabilities: Capabilities::default(),
            user_agent: "test".to_string(),
        });
        let mut client = client;
        client.write_all(&write_framed(&handshake, false).unwrap()).await.unwrap();

        let mut buf = BytesMut::with_capacity(4096);
        client.read_buf(&mut buf).await.unwrap();
        let ack = read_framed(&mut buf).unwrap().unwrap();
        assert!(matches!(ack, Message::Ack(_)));

        match event_rx.recv().await {
            Some(ServerEvent::Connected { .. }) => {}
            other => panic!("expected Connected, got {other:?}"),
        }

        drop(client);
        let (_session_id, _reason) = handle.await.unwrap();
    }

    #[tokio::test]
    async fn version_mismatch_closes_session() {
        let (mut client, server) = duplex(4096);
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let session = Session::new(
            server,
            test_config(),
            Capabilities::default(),
            event_tx,
            cmd_rx,
            Arc::new(RwLock::new(None)),
        );
        let handle = tokio::spawn(session.run());

        let handshake = Message::Handshake(Handshake {
            version: 2,
            capabilities: Capabilities::default(),
            user_agent: "test".to_string(),
        });
        client.write_all(&write_framed(&handshake, false).unwrap()).await.unwrap();

        let (_session_id, reason) = handle.await.unwrap();
        assert!(matches!(reason, CloseReason::ProtocolError(_)));
    }
}
