//! The server dispatcher (C6, §4.6): accepts connections, runs one
//! [`crate::session::Session`] per client, and funnels a single outbound
//! stream of [`ServerEvent`]s back to the application.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};

use crate::events::ServerEvent;
use crate::page::Page;
use crate::session::{Session, SessionCommand};
use crate::url::DEFAULT_PORT;
use crate::wire::messages::Capabilities;

/// Resource limits and timing knobs for every session a [`PixnetServer`] runs.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Hard cap on simultaneously active sessions. New connections beyond
    /// this are accepted and immediately dropped (§4.6 resource limits).
    pub max_concurrent_sessions: usize,
    /// Largest single decoded message this server will accept, in bytes.
    pub max_inbound_message_size: usize,
    /// Largest number of inbound messages accepted per session per second.
    pub max_inbound_rate: u32,
    /// How long a session may sit idle before a keepalive `PIXPNG` is sent.
    pub keepalive_idle: Duration,
    /// How long a session may wait for `PIXPOG` before the connection is timed out.
    pub keepalive_timeout: Duration,
    /// How many mismatched-`session_id` messages are tolerated before the
    /// session is closed as a protocol error (§4.4).
    pub mismatched_session_id_threshold: u32,
    /// Ceiling on decompressed bytes accepted from any single compressed section.
    pub decompression_ceiling: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 256,
            max_inbound_message_size: 16 * 1024 * 1024,
            max_inbound_rate: 200,
            keepalive_idle: Duration::from_secs(15),
            keepalive_timeout: Duration::from_secs(10),
            mismatched_session_id_threshold: 3,
            decompression_ceiling: crate::codec::compress::DEFAULT_DECOMPRESSION_CEILING,
        }
    }
}

impl ServerConfig {
    /// Starts from the default configuration (§4.4/§4.6 defaults).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the concurrent session cap.
    #[must_use]
    pub fn with_max_concurrent_sessions(mut self, limit: usize) -> Self {
        self.max_concurrent_sessions = limit;
        self
    }

    /// Sets the largest accepted inbound message size, in bytes.
    #[must_use]
    pub fn with_max_inbound_message_size(mut self, bytes: usize) -> Self {
        self.max_inbound_message_size = bytes;
        self
    }

    /// Sets the per-session inbound message rate limit (messages/second).
    #[must_use]
    pub fn with_max_inbound_rate(mut self, rate: u32) -> Self {
        self.max_inbound_rate = rate;
        self
    }

    /// Sets the keepalive idle and timeout durations.
    #[must_use]
    pub fn with_keepalive(mut self, idle: Duration, timeout: Duration) -> Self {
        self.keepalive_idle = idle;
        self.keepalive_timeout = timeout;
        self
    }

    /// Sets the mismatched-session-id tolerance before a hard close.
    #[must_use]
    pub fn with_mismatched_session_id_threshold(mut self, threshold: u32) -> Self {
        self.mismatched_session_id_threshold = threshold;
        self
    }

    /// Sets the decompression-bomb ceiling applied to compressed sections.
    #[must_use]
    pub fn with_decompression_ceiling(mut self, bytes: usize) -> Self {
        self.decompression_ceiling = bytes;
        self
    }

    /// Builds a [`crate::pxnt::PxntReader`] honoring this config's
    /// decompression ceiling, so PXNT files loaded through a server's
    /// configuration are bound by the same limit as its live wire traffic.
    #[must_use]
    pub fn pxnt_reader(&self) -> crate::pxnt::PxntReader {
        crate::pxnt::PxntReader::new(self.decompression_ceiling)
    }
}

struct ServerInner {
    config: ServerConfig,
    capabilities: Capabilities,
    // Shared (not just owned-behind-Arc<ServerInner>) so each Session can
    // hold its own clone and resolve Navigate/Emit behavior against the
    // live Page without routing every lookup back through the dispatcher.
    current_page: Arc<RwLock<Option<Arc<Page>>>>,
    sessions: RwLock<HashMap<u64, mpsc::UnboundedSender<SessionCommand>>>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
}

/// A running PIXNET server: owns the listening socket and the registry of
/// active sessions, and pushes the current [`Page`] to every connected
/// client on [`PixnetServer::publish_page`].
#[derive(Clone)]
pub struct PixnetServer {
    inner: Arc<ServerInner>,
}

impl PixnetServer {
    /// Builds a server with the given configuration and capabilities this
    /// process supports; returns the server handle plus the channel on
    /// which application-facing [`ServerEvent`]s arrive.
    #[must_use]
    pub fn new(config: ServerConfig, capabilities: Capabilities) -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ServerInner {
            config,
            capabilities,
            current_page: Arc::new(RwLock::new(None)),
            sessions: RwLock::new(HashMap::new()),
            event_tx,
        });
        (Self { inner }, event_rx)
    }

    /// Binds `port` and accepts connections until the listener errors.
    /// Each accepted connection gets its own [`Session`] task; connections
    /// beyond `max_concurrent_sessions` are dropped without a handshake
    /// (§4.6: no transport framing exists yet at that point to carry a
    /// typed error back).
    pub async fn listen(&self, port: u16) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!("pixnet server listening on port {port}");
        loop {
            let (socket, addr) = listener.accept().await?;
            if self.inner.sessions.read().await.len() >= self.inner.config.max_concurrent_sessions {
                warn!("rejecting {addr}: at max_concurrent_sessions ({})", self.inner.config.max_concurrent_sessions);
                drop(socket);
                continue;
            }
            let server = self.clone();
            tokio::spawn(async move {
                server.run_session(socket, addr).await;
            });
        }
    }

    async fn run_session(&self, socket: tokio::net::TcpStream, addr: std::net::SocketAddr) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let mut session = Session::new(
            socket,
            self.inner.config,
            self.inner.capabilities,
            self.inner.event_tx.clone(),
            cmd_rx,
            self.inner.current_page.clone(),
        );

        let session_id = match session.handshake().await {
            Ok(id) => id,
            Err(_) => return,
        };
        self.inner.sessions.write().await.insert(session_id, cmd_tx);

        // If a Page was already published before this session connected,
        // catch it up immediately rather than waiting for the next push.
        if let Some(page) = self.inner.current_page.read().await.clone() {
            let _ = self.inner.sessions.read().await.get(&session_id).map(|tx| tx.send(SessionCommand::SendFrame(page)));
        }

        session.run_to_completion().await;
        self.inner.sessions.write().await.remove(&session_id);
        debug_log_close(addr, session_id);
    }

    /// Pushes `page` to every currently active session as a new rendering
    /// frame (§4.6 "broadcast current Page to all Active sessions").
    pub async fn publish_page(&self, page: Page) {
        let page = Arc::new(page);
        *self.inner.current_page.write().await = Some(page.clone());
        let sessions = self.inner.sessions.read().await;
        for command_tx in sessions.values() {
            let _ = command_tx.send(SessionCommand::SendFrame(page.clone()));
        }
    }

    /// The most recently published Page, if any.
    pub async fn current_page(&self) -> Option<Arc<Page>> {
        self.inner.current_page.read().await.clone()
    }

    /// Decodes a PXNT container into a [`Page`], applying this server's
    /// configured decompression ceiling (§4.2 step 4) rather than the
    /// codec's built-in default.
    pub fn load_page(&self, data: &[u8]) -> Result<Page, crate::error::PxntError> {
        self.inner.config.pxnt_reader().read_page(data)
    }

    /// Gracefully closes every active session (e.g. on server shutdown).
    pub async fn close_all(&self) {
        let sessions = self.inner.sessions.read().await;
        for command_tx in sessions.values() {
            let _ = command_tx.send(SessionCommand::Close);
        }
    }

    /// Number of sessions currently registered as active.
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }
}

fn debug_log_close(addr: std::net::SocketAddr, session_id: u64) {
    log::debug!("connection {addr} (session {session_id:016x}) closed");
}

/// The default PIXNET listening port (§6.1, §6.3).
pub const DEFAULT_PIXNET_PORT: u16 = DEFAULT_PORT;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_spec() {
        let config = ServerConfig::default();
        assert_eq!(config.keepalive_idle, Duration::from_secs(15));
        assert_eq!(config.keepalive_timeout, Duration::from_secs(10));
        assert_eq!(config.decompression_ceiling, crate::codec::compress::DEFAULT_DECOMPRESSION_CEILING);
    }

    #[test]
    fn config_builder_overrides() {
        let config = ServerConfig::new().with_max_concurrent_sessions(4).with_max_inbound_rate(10);
        assert_eq!(config.max_concurrent_sessions, 4);
        assert_eq!(config.max_inbound_rate, 10);
    }

    #[tokio::test]
    async fn new_server_has_no_sessions() {
        let (server, _rx) = PixnetServer::new(ServerConfig::default(), Capabilities::default());
        assert_eq!(server.session_count().await, 0);
        assert!(server.current_page().await.is_none());
    }
}
