//! Ping/pong liveness check for one upstream socket.
//!
//! Every `timeout / 2` the task checks how long ago the last pong arrived. If
//! that exceeds `timeout` the socket is failed; otherwise a ping goes out.
//! Pongs are recorded by the read loop, so a peer that keeps reading keeps the
//! connection alive indefinitely.

use std::sync::Arc;
use std::time::Duration;

use stockmq_middleware::Shutdown;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace};

use crate::error::ConnectionError;
use crate::websocket::{LiveSocket, SourceConnection};

pub(crate) async fn run(
    conn: Arc<SourceConnection>,
    live: Arc<LiveSocket>,
    shutdown: Shutdown,
    timeout: Duration,
) {
    let mut ticker = tokio::time::interval(timeout / 2);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            _ = live.closed() => break,
            _ = ticker.tick() => {
                let silent_for = live.since_last_pong();
                if silent_for > timeout {
                    debug!(
                        source = %conn.name(),
                        silent_ms = silent_for.as_millis() as u64,
                        "pong overdue"
                    );
                    conn.fail(&live, ConnectionError::PingTimeout(timeout.as_millis() as u64));
                    break;
                }
                if let Err(e) = live.send(Message::Ping(Vec::new())).await {
                    conn.fail(&live, e);
                    break;
                }
                trace!(source = %conn.name(), "ping sent");
            }
        }
    }
}
