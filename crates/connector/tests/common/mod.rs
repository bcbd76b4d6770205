//! Loopback WebSocket upstream and a recording sink for supervisor tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use stockmq_connector::{Sink, SinkError};
use stockmq_schema::MarketEvent;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

pub const KLINE: &str = r#"{"e":"kline","E":1672515782136,"s":"BNBBTC","k":{"t":1672515780000,"T":1672515839999,"s":"BNBBTC","i":"1m","o":"0.0010","c":"0.0020","h":"0.0025","l":"0.0015","v":"1000","x":false}}"#;

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Peer {
    /// Reads everything, so pings are answered
    Reading,
    /// Completes the handshake and then never reads or writes
    Silent,
}

/// What the upstream saw, shared with the test body
#[derive(Default)]
pub struct Observed {
    pub accepts: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub received: Mutex<Vec<String>>,
    pub headers: Mutex<Vec<(String, String)>>,
}

pub struct Upstream {
    pub addr: SocketAddr,
    pub observed: Arc<Observed>,
}

impl Upstream {
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn accepts(&self) -> usize {
        self.observed.accepts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.observed.disconnects.load(Ordering::SeqCst)
    }
}

/// Start an upstream on an ephemeral port. Every accepted client is sent
/// `frames` in order, then handled according to `peer`.
pub async fn upstream(peer: Peer, frames: Vec<String>) -> Upstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let observed = Arc::new(Observed::default());

    let shared = Arc::clone(&observed);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let observed = Arc::clone(&shared);
            let frames = frames.clone();
            tokio::spawn(async move {
                let seen = Arc::clone(&observed);
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    let mut headers = seen.headers.lock().unwrap();
                    for (name, value) in req.headers() {
                        headers.push((
                            name.as_str().to_string(),
                            value.to_str().unwrap_or_default().to_string(),
                        ));
                    }
                    Ok(resp)
                };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };
                observed.accepts.fetch_add(1, Ordering::SeqCst);

                for frame in frames {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }

                if peer == Peer::Silent {
                    let _hold = ws;
                    std::future::pending::<()>().await;
                    return;
                }

                while let Some(Ok(msg)) = ws.next().await {
                    match msg {
                        Message::Text(text) => observed.received.lock().unwrap().push(text),
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                observed.disconnects.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    Upstream { addr, observed }
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Keeps every delivered event
pub struct RecordingSink {
    name: &'static str,
    pub events: Mutex<Vec<MarketEvent>>,
}

impl RecordingSink {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self) {}

    async fn deliver(&self, event: &MarketEvent) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

/// Rejects every event
pub struct FailingSink {
    name: &'static str,
}

impl FailingSink {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self { name })
    }
}

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self) {}

    async fn deliver(&self, _event: &MarketEvent) -> Result<(), SinkError> {
        Err(SinkError::Store("disk full".to_string()))
    }

    async fn is_healthy(&self) -> bool {
        false
    }

    async fn close(&self) {}
}

/// Counts lifecycle calls and events
pub struct CountingSink {
    name: &'static str,
    pub starts: AtomicUsize,
    pub delivered: AtomicUsize,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
}

impl CountingSink {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            starts: AtomicUsize::new(0),
            delivered: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for CountingSink {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn deliver(&self, _event: &MarketEvent) -> Result<(), SinkError> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        true
    }

    async fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
