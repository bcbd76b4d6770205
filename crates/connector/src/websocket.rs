//! Upstream WebSocket supervisor
//!
//! One [`SourceConnection`] per configured source. It dials with a bounded
//! timeout, sends the configured init messages, runs the optional keepalive
//! and reads frames in arrival order, handing each to the source's adapter.
//! Any transport failure goes through [`SourceConnection::handle_error`],
//! which schedules at most one fixed-delay reconnect at a time.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use stockmq_metadata::SourceConfig;
use stockmq_middleware::latency::{elapsed_since, now_tsc};
use stockmq_middleware::Shutdown;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, ProtocolAdapter};
use crate::error::ConnectionError;
use crate::keepalive;
use crate::metrics::SourceMetrics;
use crate::publisher::FanoutPublisher;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// Bound on the close handshake when tearing a socket down
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    ReconnectPending = 3,
    Closed = 4,
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::ReconnectPending,
            4 => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// The socket of one successful dial. Dropped from the connection as soon as
/// it fails; tasks still holding it see `closed` fire and exit.
pub(crate) struct LiveSocket {
    generation: u64,
    writer: Mutex<WsWriter>,
    closed: watch::Sender<bool>,
    opened: Instant,
    /// Milliseconds after `opened` at which the last pong arrived
    last_pong_ms: AtomicU64,
}

impl LiveSocket {
    fn new(generation: u64, writer: WsWriter) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            generation,
            writer: Mutex::new(writer),
            closed,
            opened: Instant::now(),
            last_pong_ms: AtomicU64::new(0),
        }
    }

    pub(crate) async fn send(&self, msg: Message) -> Result<(), ConnectionError> {
        self.writer
            .lock()
            .await
            .send(msg)
            .await
            .map_err(|e| ConnectionError::Write(e.to_string()))
    }

    pub(crate) fn record_pong(&self) {
        let ms = self.opened.elapsed().as_millis() as u64;
        self.last_pong_ms.store(ms, Ordering::Release);
    }

    /// Time since the last pong, or since connect if none arrived yet
    pub(crate) fn since_last_pong(&self) -> Duration {
        let last = Duration::from_millis(self.last_pong_ms.load(Ordering::Acquire));
        self.opened.elapsed().saturating_sub(last)
    }

    fn mark_closed(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub(crate) async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn shutdown(&self) {
        self.mark_closed();
        let mut writer = self.writer.lock().await;
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await;
    }
}

pub struct SourceConnection {
    config: SourceConfig,
    adapter: Adapter,
    publisher: FanoutPublisher,
    shutdown: Shutdown,
    metrics: SourceMetrics,
    state: AtomicU8,
    live: RwLock<Option<Arc<LiveSocket>>>,
    reconnecting: AtomicBool,
    /// Set by `close`; no further dials after this
    stopped: AtomicBool,
    generation: AtomicU64,
    reconnects: AtomicU64,
}

impl SourceConnection {
    pub fn new(
        config: SourceConfig,
        adapter: Adapter,
        publisher: FanoutPublisher,
        shutdown: Shutdown,
    ) -> Arc<Self> {
        let metrics = SourceMetrics::new(config.name.clone());
        Arc::new(Self {
            config,
            adapter,
            publisher,
            shutdown,
            metrics,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            live: RwLock::new(None),
            reconnecting: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || self.shutdown.is_shutdown()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    /// Reconnects scheduled over the connection's lifetime
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Acquire)
    }

    /// Keep the source connected until shutdown, then close it.
    pub async fn run(self: Arc<Self>) {
        self.start();
        self.shutdown.wait().await;
        self.close().await;
    }

    /// Spawn one connect attempt followed by the read loop
    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.connect_and_read().await });
    }

    async fn connect_and_read(self: Arc<Self>) {
        if self.is_stopped() {
            return;
        }
        self.set_state(ConnectionState::Connecting);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(source = %self.config.name, url = %self.config.url, "connecting");

        let dial = tokio::time::timeout(self.config.dial_timeout(), self.dial());
        let ws = tokio::select! {
            _ = self.shutdown.wait() => return,
            result = dial => match result {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    self.handle_error(e);
                    return;
                }
                Err(_) => {
                    self.handle_error(ConnectionError::DialTimeout(self.config.dial_timeout_ms));
                    return;
                }
            },
        };

        let (writer, reader) = ws.split();
        let live = Arc::new(LiveSocket::new(generation, writer));
        *self.live.write().await = Some(Arc::clone(&live));

        if self.is_stopped() {
            self.close().await;
            return;
        }
        self.set_state(ConnectionState::Connected);
        self.metrics.set_connected();
        info!(source = %self.config.name, "connected");

        for msg in &self.config.init_messages {
            if let Err(e) = live.send(Message::Text(msg.clone())).await {
                self.fail(&live, e);
                return;
            }
        }
        if !self.config.init_messages.is_empty() {
            debug!(
                source = %self.config.name,
                count = self.config.init_messages.len(),
                "init messages sent"
            );
        }

        if let Some(timeout) = self.config.ping_timeout() {
            tokio::spawn(keepalive::run(
                Arc::clone(&self),
                Arc::clone(&live),
                self.shutdown.clone(),
                timeout,
            ));
        }

        self.read_loop(&live, reader).await;
    }

    async fn dial(&self) -> Result<WsStream, ConnectionError> {
        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectionError::Handshake(e.to_string()))?;

        for header in &self.config.headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| ConnectionError::Handshake(e.to_string()))?;
            request.headers_mut().append(name, value);
        }

        let ws_config = self.config.read_limit().map(|limit| WebSocketConfig {
            max_message_size: Some(limit),
            max_frame_size: Some(limit),
            ..Default::default()
        });

        let (ws, response) = connect_async_with_config(request, ws_config, false).await?;
        debug!(source = %self.config.name, status = ?response.status(), "handshake complete");
        Ok(ws)
    }

    async fn read_loop(self: &Arc<Self>, live: &Arc<LiveSocket>, mut reader: WsReader) {
        loop {
            let next = tokio::select! {
                _ = live.closed() => return,
                next = reader.next() => next,
            };

            match next {
                Some(Ok(Message::Text(text))) => self.on_frame(text.as_bytes()),
                Some(Ok(Message::Binary(data))) => self.on_frame(&data),
                Some(Ok(Message::Pong(_))) => live.record_pong(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    info!(source = %self.config.name, frame = ?frame, "closed by peer");
                    self.fail(live, ConnectionError::ClosedByPeer);
                    return;
                }
                Some(Err(e)) => {
                    self.fail(live, ConnectionError::Read(e.to_string()));
                    return;
                }
                None => {
                    self.fail(live, ConnectionError::ClosedByPeer);
                    return;
                }
            }
        }
    }

    fn on_frame(&self, frame: &[u8]) {
        let received_at = chrono::Utc::now().timestamp_micros();
        self.metrics.inc_frame();

        let started = now_tsc();
        let result = self.adapter.decode(frame, &self.config.name, received_at);
        self.metrics.observe_decode(elapsed_since(started));

        match result {
            Ok(events) => {
                for event in events {
                    self.metrics.inc_event(event.kind().as_str());
                    self.publisher.publish(event);
                }
            }
            Err(e) => {
                warn!(
                    source = %self.config.name,
                    adapter = self.adapter.id(),
                    error = %e,
                    "decode failed, frame skipped"
                );
                self.metrics.inc_decode_error();
            }
        }
    }

    /// Failure observed on a specific socket. Ignored if that socket has
    /// already been replaced or torn down.
    pub(crate) fn fail(self: &Arc<Self>, live: &Arc<LiveSocket>, err: ConnectionError) {
        if live.generation != self.generation.load(Ordering::Acquire) || !live.mark_closed() {
            debug!(source = %self.config.name, error = %err, "ignoring error on stale socket");
            return;
        }
        self.handle_error(err);
    }

    /// Report a transport failure.
    ///
    /// Returns `true` when this call scheduled the reconnect, `false` when it
    /// was absorbed by shutdown or an already pending reconnect.
    pub fn handle_error(self: &Arc<Self>, err: ConnectionError) -> bool {
        if self.is_stopped() {
            debug!(source = %self.config.name, error = %err, "ignoring error during shutdown");
            return false;
        }
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(source = %self.config.name, error = %err, "reconnect already pending");
            return false;
        }

        let delay = self.config.retry_delay();
        warn!(
            source = %self.config.name,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "connection failed, scheduling reconnect"
        );
        self.set_state(ConnectionState::ReconnectPending);
        self.metrics.set_disconnected();
        self.metrics.inc_reconnect();
        self.reconnects.fetch_add(1, Ordering::AcqRel);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(live) = this.live.write().await.take() {
                live.shutdown().await;
            }

            tokio::select! {
                _ = this.shutdown.wait() => {
                    debug!(source = %this.config.name, "reconnect cancelled by shutdown");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            this.reconnecting.store(false, Ordering::Release);
            this.start();
        });

        true
    }

    /// Tear the connection down for good. Safe to call more than once.
    pub async fn close(&self) {
        self.stopped.store(true, Ordering::Release);
        self.set_state(ConnectionState::Closed);
        let live = self.live.write().await.take();
        if let Some(live) = live {
            live.shutdown().await;
            self.metrics.set_disconnected();
            info!(source = %self.config.name, "connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::ReconnectPending,
            ConnectionState::Closed,
        ] {
            assert_eq!(ConnectionState::from(state as u8), state);
        }
    }

    #[tokio::test]
    async fn test_concurrent_errors_schedule_one_reconnect() {
        let mut config = SourceConfig::new("ws-unit-concurrent", "ws://127.0.0.1:1", "debug");
        config.retry_delay_ms = 60_000;
        let shutdown = Shutdown::new();
        let conn = SourceConnection::new(
            config,
            Adapter::from_id("debug").unwrap(),
            FanoutPublisher::default(),
            shutdown.clone(),
        );

        let mut tasks = Vec::new();
        for i in 0..16 {
            let c = Arc::clone(&conn);
            tasks.push(tokio::spawn(async move {
                c.handle_error(ConnectionError::Read(format!("error {}", i)))
            }));
        }
        let mut scheduled = 0;
        for task in tasks {
            if task.await.unwrap() {
                scheduled += 1;
            }
        }

        assert_eq!(scheduled, 1);
        assert_eq!(conn.reconnect_count(), 1);
        assert_eq!(conn.state(), ConnectionState::ReconnectPending);
        shutdown.fire();
    }

    #[tokio::test]
    async fn test_errors_ignored_after_shutdown() {
        let shutdown = Shutdown::new();
        let conn = SourceConnection::new(
            SourceConfig::new("ws-unit-shutdown", "ws://127.0.0.1:1", "debug"),
            Adapter::from_id("debug").unwrap(),
            FanoutPublisher::default(),
            shutdown.clone(),
        );
        shutdown.fire();
        assert!(!conn.handle_error(ConnectionError::ClosedByPeer));
        assert_eq!(conn.reconnect_count(), 0);
    }
}
