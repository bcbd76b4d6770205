//! Upstream connection supervision against a loopback WebSocket server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{upstream, wait_until, FailingSink, Peer, RecordingSink, KLINE};
use stockmq_connector::metrics::{self, SourceMetrics};
use stockmq_connector::{
    Adapter, BusSink, ConnectionError, ConnectionState, FanoutPublisher, Sink, SourceConnection,
};
use stockmq_metadata::{HeaderSpec, SourceConfig};
use stockmq_middleware::{InMemoryTransport, Shutdown, Transport};
use stockmq_schema::MarketEvent;

fn binance_source(name: &str, url: String) -> SourceConfig {
    let mut config = SourceConfig::new(name, url, "binance");
    config.dial_timeout_ms = 2_000;
    config.retry_delay_ms = 100;
    config
}

fn connection(
    config: SourceConfig,
    sinks: Vec<Arc<dyn Sink>>,
    shutdown: &Shutdown,
) -> Arc<SourceConnection> {
    let adapter = Adapter::from_id(&config.adapter).unwrap();
    SourceConnection::new(
        config,
        adapter,
        FanoutPublisher::new(sinks),
        shutdown.clone(),
    )
}

#[tokio::test]
async fn test_bad_frame_is_skipped_and_connection_stays_up() {
    let server = upstream(
        Peer::Reading,
        vec!["{not json".to_string(), KLINE.to_string()],
    )
    .await;
    let recorder = RecordingSink::new("recorder");
    let shutdown = Shutdown::new();
    let conn = connection(
        binance_source("it-bad-frame", server.url()),
        vec![recorder.clone() as Arc<dyn Sink>],
        &shutdown,
    );

    conn.start();
    assert!(wait_until(Duration::from_secs(3), || recorder.len() == 1).await);

    let metrics = SourceMetrics::new("it-bad-frame");
    assert_eq!(metrics.frames(), 2);
    assert_eq!(metrics.decode_errors(), 1);
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(conn.reconnect_count(), 0);

    let events = recorder.events.lock().unwrap().clone();
    match &events[0] {
        MarketEvent::Bar(bar) => {
            assert_eq!(bar.header.symbol, "BNBBTC");
            assert_eq!(bar.header.source, "it-bad-frame");
            assert_eq!(bar.interval, "1m");
            assert!(bar.header.time_rcv > 0);
        }
        other => panic!("expected a bar, got {:?}", other),
    }

    shutdown.fire();
    conn.close().await;
}

#[tokio::test]
async fn test_init_messages_sent_in_order_with_headers() {
    let server = upstream(Peer::Reading, vec![]).await;
    let mut config = binance_source("it-init", server.url());
    config.headers = vec![HeaderSpec::new("X-Api-Key", "secret-key")];
    config.init_messages = vec![
        r#"{"method":"SUBSCRIBE","params":["bnbbtc@kline_1m"],"id":1}"#.to_string(),
        r#"{"method":"SUBSCRIBE","params":["bnbbtc@depth"],"id":2}"#.to_string(),
    ];
    let expected = config.init_messages.clone();
    let shutdown = Shutdown::new();
    let conn = connection(config, vec![], &shutdown);

    conn.start();
    let observed = Arc::clone(&server.observed);
    assert!(
        wait_until(Duration::from_secs(3), || observed.received.lock().unwrap().len() == 2)
            .await
    );

    assert_eq!(*server.observed.received.lock().unwrap(), expected);
    let headers = server.observed.headers.lock().unwrap().clone();
    assert!(headers
        .iter()
        .any(|(name, value)| name == "x-api-key" && value == "secret-key"));

    shutdown.fire();
    conn.close().await;
}

#[tokio::test]
async fn test_silent_peer_triggers_one_reconnect() {
    let server = upstream(Peer::Silent, vec![]).await;
    let mut config = binance_source("it-silent", server.url());
    config.ping_timeout_ms = 300;
    config.retry_delay_ms = 2_000;
    let shutdown = Shutdown::new();
    let conn = connection(config, vec![], &shutdown);

    conn.start();
    assert!(wait_until(Duration::from_secs(2), || conn.reconnect_count() == 1).await);

    // Still inside the retry delay: no second dial and no second timeout
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(conn.reconnect_count(), 1);
    assert_eq!(server.accepts(), 1);
    assert_eq!(conn.state(), ConnectionState::ReconnectPending);

    shutdown.fire();
    conn.close().await;
}

#[tokio::test]
async fn test_reading_peer_survives_keepalive() {
    let server = upstream(Peer::Reading, vec![]).await;
    let mut config = binance_source("it-keepalive", server.url());
    config.ping_timeout_ms = 200;
    let shutdown = Shutdown::new();
    let conn = connection(config, vec![], &shutdown);

    conn.start();
    assert!(
        wait_until(Duration::from_secs(2), || conn.state() == ConnectionState::Connected).await
    );

    // Several full timeout windows
    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(conn.reconnect_count(), 0);
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(server.accepts(), 1);

    shutdown.fire();
    conn.close().await;
}

#[tokio::test]
async fn test_concurrent_errors_cause_one_redial() {
    let server = upstream(Peer::Reading, vec![]).await;
    let shutdown = Shutdown::new();
    let conn = connection(
        binance_source("it-concurrent", server.url()),
        vec![],
        &shutdown,
    );

    conn.start();
    assert!(
        wait_until(Duration::from_secs(2), || conn.state() == ConnectionState::Connected).await
    );

    let mut tasks = Vec::new();
    for i in 0..16 {
        let conn = Arc::clone(&conn);
        tasks.push(tokio::spawn(async move {
            conn.handle_error(ConnectionError::Read(format!("reader {}", i)))
        }));
    }
    let mut scheduled = 0;
    for task in tasks {
        if task.await.unwrap() {
            scheduled += 1;
        }
    }
    assert_eq!(scheduled, 1);

    assert!(wait_until(Duration::from_secs(2), || server.accepts() == 2).await);
    assert!(
        wait_until(Duration::from_secs(2), || conn.state() == ConnectionState::Connected).await
    );
    assert_eq!(conn.reconnect_count(), 1);
    assert!(!conn.is_reconnecting());

    shutdown.fire();
    conn.close().await;
}

#[tokio::test]
async fn test_refused_dial_keeps_retrying() {
    // Reserve a port, then free it so every dial is refused
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let shutdown = Shutdown::new();
    let conn = connection(
        binance_source("it-dial-retry", format!("ws://{}", addr)),
        vec![],
        &shutdown,
    );
    conn.start();
    assert!(wait_until(Duration::from_secs(2), || conn.reconnect_count() >= 2).await);
    assert_ne!(conn.state(), ConnectionState::Connected);

    shutdown.fire();
    conn.close().await;
}

#[tokio::test]
async fn test_close_stops_reconnects() {
    let server = upstream(Peer::Reading, vec![]).await;
    let shutdown = Shutdown::new();
    let conn = connection(
        binance_source("it-close", server.url()),
        vec![],
        &shutdown,
    );

    conn.start();
    assert!(
        wait_until(Duration::from_secs(2), || conn.state() == ConnectionState::Connected).await
    );

    conn.close().await;
    conn.close().await;
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(!conn.handle_error(ConnectionError::ClosedByPeer));

    assert!(wait_until(Duration::from_secs(2), || server.disconnects() == 1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepts(), 1);
    assert_eq!(conn.reconnect_count(), 0);
}

#[tokio::test]
async fn test_failing_store_does_not_block_bus() {
    let server = upstream(Peer::Reading, vec![KLINE.to_string()]).await;
    let shutdown = Shutdown::new();

    let transport = Arc::new(InMemoryTransport::new());
    let mut sub = transport
        .subscribe("C.1m.BNBBTC.it-isolation")
        .await
        .unwrap();
    let bus = Arc::new(BusSink::with_transport(
        transport.clone(),
        Duration::from_millis(100),
        shutdown.clone(),
    ));
    bus.start().await;

    let failing = FailingSink::new("it-failing-store");
    let conn = connection(
        binance_source("it-isolation", server.url()),
        vec![failing as Arc<dyn Sink>, bus as Arc<dyn Sink>],
        &shutdown,
    );
    conn.start();

    let msg = tokio::time::timeout(Duration::from_secs(3), sub.next())
        .await
        .unwrap()
        .unwrap();
    let event: MarketEvent = serde_json::from_slice(&msg.payload).unwrap();
    assert_eq!(event.header().source, "it-isolation");

    assert!(
        wait_until(Duration::from_secs(2), || metrics::sink_errors("it-failing-store") == 1)
            .await
    );
    assert_eq!(conn.state(), ConnectionState::Connected);

    shutdown.fire();
    conn.close().await;
}

#[tokio::test]
async fn test_failing_bus_does_not_block_store() {
    let server = upstream(Peer::Reading, vec![KLINE.to_string()]).await;
    let shutdown = Shutdown::new();

    let transport = Arc::new(InMemoryTransport::new());
    transport.set_connected(false);
    let bus = Arc::new(BusSink::with_transport(
        transport.clone(),
        Duration::from_secs(60),
        shutdown.clone(),
    ));
    bus.start().await;

    let recorder = RecordingSink::new("it-recording-store");
    let conn = connection(
        binance_source("it-bus-down", server.url()),
        vec![bus as Arc<dyn Sink>, recorder.clone() as Arc<dyn Sink>],
        &shutdown,
    );
    conn.start();

    assert!(wait_until(Duration::from_secs(3), || recorder.len() == 1).await);
    assert_eq!(recorder.events.lock().unwrap()[0].header().source, "it-bus-down");
    assert!(wait_until(Duration::from_secs(2), || metrics::sink_errors("nats") >= 1).await);
    assert_eq!(transport.published(), 0);
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(conn.reconnect_count(), 0);

    shutdown.fire();
    conn.close().await;
}
