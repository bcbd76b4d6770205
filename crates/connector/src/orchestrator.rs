//! Gateway lifecycle: NotStarted → Running → ShuttingDown → Stopped.
//!
//! [`Server::start`] brings up the monitor, the stores, the bus and one
//! supervised connection per enabled source. [`Server::shutdown`] tears them
//! down in the reverse dependency order and only then fires the process-wide
//! [`Shutdown`] signal, so no component reconnects while it is being closed.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use stockmq_metadata::{MetadataError, ServerConfig, SourceConfig};
use stockmq_middleware::{Shutdown, Transport};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::adapter::Adapter;
use crate::error::ServerError;
use crate::publisher::FanoutPublisher;
use crate::server::{MonitorServer, MonitorState};
use crate::sinks::{BusSink, DocumentStore, Sink, TimeSeriesStore};
use crate::websocket::SourceConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    NotStarted = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl From<u8> for ServerState {
    fn from(v: u8) -> Self {
        match v {
            1 => ServerState::Running,
            2 => ServerState::ShuttingDown,
            3 => ServerState::Stopped,
            _ => ServerState::NotStarted,
        }
    }
}

pub struct Server {
    config: ServerConfig,
    sources: Vec<(SourceConfig, Adapter)>,
    bus: Arc<dyn Sink>,
    stores: Vec<Arc<dyn Sink>>,
    shutdown: Shutdown,
    done: Shutdown,
    state: AtomicU8,
    shutting_down: AtomicBool,
    ready: Arc<AtomicBool>,
    connections: Mutex<Vec<Arc<SourceConnection>>>,
    monitor: Mutex<Option<MonitorServer>>,
}

impl Server {
    /// Build the gateway from config, with NATS as the bus and whichever
    /// stores are enabled.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let shutdown = Shutdown::new();
        let bus: Arc<dyn Sink> = Arc::new(BusSink::nats(&config.nats, shutdown.clone()));

        let mut stores: Vec<Arc<dyn Sink>> = Vec::new();
        if config.document_store.enabled {
            stores.push(Arc::new(DocumentStore::new(
                &config.document_store,
                shutdown.clone(),
            )));
        }
        if config.timeseries.enabled {
            let store = TimeSeriesStore::new(&config.timeseries, shutdown.clone())
                .map_err(|e| MetadataError::Validation(format!("timeseries: {}", e)))?;
            stores.push(Arc::new(store));
        }

        Self::with_sinks(config, shutdown, bus, stores)
    }

    /// Use `transport` as the bus instead of dialing NATS, with no stores
    pub fn with_bus_transport(
        config: ServerConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ServerError> {
        let shutdown = Shutdown::new();
        let bus: Arc<dyn Sink> = Arc::new(BusSink::with_transport(
            transport,
            config.nats.retry_delay(),
            shutdown.clone(),
        ));
        Self::with_sinks(config, shutdown, bus, Vec::new())
    }

    /// Assemble from explicit sinks. Every sink must have been built with
    /// `shutdown`.
    pub fn with_sinks(
        config: ServerConfig,
        shutdown: Shutdown,
        bus: Arc<dyn Sink>,
        stores: Vec<Arc<dyn Sink>>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let mut sources = Vec::new();
        for source in &config.sources {
            let adapter =
                Adapter::from_id(&source.adapter).ok_or_else(|| ServerError::UnknownAdapter {
                    source_name: source.name.clone(),
                    adapter: source.adapter.clone(),
                })?;
            if source.enabled {
                sources.push((source.clone(), adapter));
            }
        }

        Ok(Self {
            config,
            sources,
            bus,
            stores,
            shutdown,
            done: Shutdown::new(),
            state: AtomicU8::new(ServerState::NotStarted as u8),
            shutting_down: AtomicBool::new(false),
            ready: Arc::new(AtomicBool::new(false)),
            connections: Mutex::new(Vec::new()),
            monitor: Mutex::new(None),
        })
    }

    pub fn state(&self) -> ServerState {
        ServerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Process-wide cancellation signal shared with every component
    pub fn shutdown_signal(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Bus first, then stores, in health-report order
    fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        let mut sinks = Vec::with_capacity(1 + self.stores.len());
        sinks.push(Arc::clone(&self.bus));
        sinks.extend(self.stores.iter().cloned());
        sinks
    }

    pub async fn connections(&self) -> Vec<Arc<SourceConnection>> {
        self.connections.lock().await.clone()
    }

    /// Monitor address once started
    pub async fn monitor_addr(&self) -> Option<std::net::SocketAddr> {
        self.monitor.lock().await.as_ref().map(|m| m.local_addr())
    }

    pub async fn start(&self) -> Result<(), ServerError> {
        if self
            .state
            .compare_exchange(
                ServerState::NotStarted as u8,
                ServerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Err(ServerError::AlreadyStarted);
        }

        let monitor_state = MonitorState::new(self.sinks(), Arc::clone(&self.ready));
        let monitor = match MonitorServer::start(&self.config.monitor.bind, monitor_state).await {
            Ok(monitor) => monitor,
            Err(e) => {
                self.state
                    .store(ServerState::Stopped as u8, Ordering::Release);
                return Err(e);
            }
        };
        *self.monitor.lock().await = Some(monitor);

        // A store that fails to connect keeps retrying on its own
        join_all(self.stores.iter().map(|store| store.start())).await;
        self.bus.start().await;

        let publisher = FanoutPublisher::new(self.sinks());
        let mut connections = self.connections.lock().await;
        for (config, adapter) in &self.sources {
            let conn = SourceConnection::new(
                config.clone(),
                *adapter,
                publisher.clone(),
                self.shutdown.clone(),
            );
            tokio::spawn(Arc::clone(&conn).run());
            connections.push(conn);
        }
        drop(connections);

        self.ready.store(true, Ordering::Release);
        info!(
            sources = self.sources.len(),
            stores = self.stores.len(),
            "startup complete"
        );
        Ok(())
    }

    /// Stop everything. Only the first call does any work; later and
    /// concurrent calls return immediately.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state
            .store(ServerState::ShuttingDown as u8, Ordering::Release);
        self.ready.store(false, Ordering::Release);
        info!("shutting down");

        self.bus.close().await;

        let connections = std::mem::take(&mut *self.connections.lock().await);
        join_all(connections.iter().map(|conn| conn.close())).await;

        let monitor = self.monitor.lock().await.take();
        if let Some(monitor) = monitor {
            monitor.stop(self.config.monitor.shutdown_grace()).await;
        }

        join_all(self.stores.iter().map(|store| store.flush())).await;
        join_all(self.stores.iter().map(|store| store.close())).await;

        if !self.shutdown.fire() {
            warn!("shutdown signal was already fired");
        }
        self.state.store(ServerState::Stopped as u8, Ordering::Release);
        info!("shutdown complete");
        self.done.fire();
    }

    /// Resolve once [`Self::shutdown`] has finished
    pub async fn wait_for_shutdown(&self) {
        self.done.wait().await;
    }
}

/// Resolve on the first SIGINT or SIGTERM
pub async fn termination_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

/// Call [`Server::shutdown`] once, on the first termination signal
pub fn spawn_signal_handler(server: Arc<Server>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        termination_signal().await;
        server.shutdown().await;
    })
}
