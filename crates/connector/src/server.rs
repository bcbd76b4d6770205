//! HTTP monitor: liveness, readiness and Prometheus metrics.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::future::join_all;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stockmq_middleware::Shutdown;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::ServerError;
use crate::health::HealthStatus;
use crate::metrics::encode_metrics;
use crate::sinks::Sink;

/// Shared state for the monitor endpoints
#[derive(Clone)]
pub struct MonitorState {
    sinks: Vec<Arc<dyn Sink>>,
    ready: Arc<AtomicBool>,
}

impl MonitorState {
    pub fn new(sinks: Vec<Arc<dyn Sink>>, ready: Arc<AtomicBool>) -> Self {
        Self { sinks, ready }
    }

    /// Ask every dependency at once and collect the names that are down
    pub async fn health(&self) -> HealthStatus {
        let checks = self.sinks.iter().map(|sink| async move {
            if sink.is_healthy().await {
                None
            } else {
                Some(sink.name().to_string())
            }
        });
        let failed = join_all(checks).await.into_iter().flatten().collect();
        HealthStatus::from_failed(failed)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

async fn livez(State(state): State<MonitorState>) -> (StatusCode, Json<HealthStatus>) {
    let status = state.health().await;
    let code = if status.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn readyz(State(state): State<MonitorState>) -> (StatusCode, Json<HealthStatus>) {
    if state.is_ready() {
        (StatusCode::OK, Json(HealthStatus::from_failed(vec![])))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthStatus::from_failed(vec!["startup".to_string()])),
        )
    }
}

async fn metrics() -> impl IntoResponse {
    match encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn create_router(state: MonitorState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// A running monitor listener
pub struct MonitorServer {
    addr: SocketAddr,
    stop: Shutdown,
    task: JoinHandle<()>,
}

impl MonitorServer {
    /// Bind `bind` and start serving. Binding is the only failure reported.
    pub async fn start(bind: &str, state: MonitorState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(bind).await.map_err(|e| ServerError::Bind {
            addr: bind.to_string(),
            reason: e.to_string(),
        })?;
        let addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: bind.to_string(),
            reason: e.to_string(),
        })?;

        let stop = Shutdown::new();
        let signal = stop.clone();
        let app = create_router(state);
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.wait().await })
                .await
            {
                error!(error = %e, "monitor server failed");
            }
        });

        info!(addr = %addr, "monitor listening");
        Ok(Self { addr, stop, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and drain in-flight requests for at most `grace`
    pub async fn stop(self, grace: Duration) {
        self.stop.fire();
        let mut task = self.task;
        match tokio::time::timeout(grace, &mut task).await {
            Ok(_) => info!("monitor stopped"),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "monitor drain timed out");
                task.abort();
            }
        }
    }
}
