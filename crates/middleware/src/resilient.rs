//! Connect / fail / delayed-retry wrapper for external clients.
//!
//! A [`ResilientClient`] owns exactly one live handle behind its own
//! `RwLock`. Publish and store paths take the read lock and clone the handle
//! out; connect, close and swap take the write lock. While the handle is
//! absent every operation is a no-op for the caller.
//!
//! [`ResilientClient::handle_error`] is safe to call from any number of tasks
//! at once: the `reconnecting` flag admits a single caller, which drops the
//! handle and schedules one reconnect after the fixed retry delay. The delay
//! races the process [`Shutdown`] signal and loses to it. [`ResilientClient::close`]
//! is final: once it has run, no pending or later reconnect installs a handle.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::ClientError;
use crate::shutdown::Shutdown;

/// How to open and close one kind of external client
#[async_trait]
pub trait Connect: Send + Sync + 'static {
    type Handle: Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Handle, ClientError>;

    /// Release a handle that is no longer current
    async fn close(&self, _handle: Arc<Self::Handle>) {}

    /// Extra liveness check on a present handle
    fn is_healthy(&self, _handle: &Self::Handle) -> bool {
        true
    }
}

type ReconnectHook = Box<dyn Fn(&str) + Send + Sync>;

pub struct ResilientClient<C: Connect> {
    name: String,
    connector: C,
    handle: RwLock<Option<Arc<C::Handle>>>,
    reconnecting: AtomicBool,
    stopped: AtomicBool,
    retry_delay: Duration,
    shutdown: Shutdown,
    reconnects: AtomicU64,
    on_reconnect: Option<ReconnectHook>,
}

impl<C: Connect> ResilientClient<C> {
    pub fn new(
        name: impl Into<String>,
        connector: C,
        retry_delay: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            name: name.into(),
            connector,
            handle: RwLock::new(None),
            reconnecting: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            retry_delay,
            shutdown,
            reconnects: AtomicU64::new(0),
            on_reconnect: None,
        }
    }

    /// Called with the client name each time a reconnect is scheduled
    pub fn with_reconnect_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_reconnect = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open the client and install the handle. A failure is logged and
    /// handed to [`Self::handle_error`] before being returned.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        if self.is_stopped() {
            return Err(ClientError::Shutdown);
        }

        match self.connector.connect().await {
            Ok(handle) => {
                let previous = self.handle.write().await.replace(Arc::new(handle));
                if let Some(previous) = previous {
                    self.connector.close(previous).await;
                }
                info!(client = %self.name, "client connected");

                // Closed or shut down while the dial was in flight
                if self.is_stopped() {
                    self.release().await;
                }
                Ok(())
            }
            Err(e) => {
                error!(client = %self.name, error = %e, "client connect failed");
                self.handle_error(&e);
                Err(e)
            }
        }
    }

    /// Closed, or the process is shutting down
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire) || self.shutdown.is_shutdown()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }

    /// Number of reconnects scheduled over the client's lifetime
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Acquire)
    }

    /// Current handle, if connected
    pub async fn handle(&self) -> Option<Arc<C::Handle>> {
        self.handle.read().await.clone()
    }

    /// Handle present and passing the connector's own check
    pub async fn is_healthy(&self) -> bool {
        match self.handle().await {
            Some(handle) => self.connector.is_healthy(&handle),
            None => false,
        }
    }

    /// Drop and close the current handle and stop reconnecting for good.
    /// Safe to call repeatedly.
    pub async fn close(&self) {
        self.stopped.store(true, Ordering::Release);
        self.release().await;
    }

    async fn release(&self) {
        let handle = self.handle.write().await.take();
        if let Some(handle) = handle {
            self.connector.close(handle).await;
            info!(client = %self.name, "client closed");
        }
    }

    /// Report a failure of this client.
    ///
    /// Returns `true` when this call scheduled the reconnect, `false` when it
    /// was absorbed (client closed, shutdown in progress or a reconnect
    /// already pending).
    pub fn handle_error(self: &Arc<Self>, err: impl Display) -> bool {
        if self.is_stopped() {
            debug!(client = %self.name, error = %err, "ignoring error on stopped client");
            return false;
        }
        if self
            .reconnecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(client = %self.name, error = %err, "reconnect already pending");
            return false;
        }

        warn!(
            client = %self.name,
            error = %err,
            delay_ms = self.retry_delay.as_millis() as u64,
            "client error, scheduling reconnect"
        );
        self.reconnects.fetch_add(1, Ordering::AcqRel);
        if let Some(hook) = &self.on_reconnect {
            hook(&self.name);
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.release().await;

            tokio::select! {
                _ = this.shutdown.wait() => {
                    debug!(client = %this.name, "reconnect cancelled by shutdown");
                    return;
                }
                _ = tokio::time::sleep(this.retry_delay) => {}
            }
            if this.is_stopped() {
                debug!(client = %this.name, "reconnect cancelled by close");
                return;
            }

            this.reconnecting.store(false, Ordering::Release);
            // A failed attempt schedules the next one itself
            let _ = this.connect().await;
        });

        true
    }
}
