//! Instrumented HTTP target for load runs.
//!
//! Routes:
//! - `/` (and any unknown path): drains the request body, answers `Hello, World!`
//! - `/status`: `Service is UP` until some request took longer than the
//!   latency threshold, `Service is DOWN` afterwards
//! - `/metrics`: request counter and latency histogram in text exposition format
//! - `/visualization`: HTML page that polls `/metrics` every 5 seconds

mod routes;
mod state;

pub use routes::{handle, Route};
pub use state::{ServiceStatus, TargetMetrics, TargetState};

use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use std::convert::Infallible;
use std::env;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{error, info};

use crate::utils::parse_duration_string;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8081";
pub const DEFAULT_LATENCY_THRESHOLD: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Invalid {var} value '{value}': {message}")]
    InvalidVar {
        var: &'static str,
        value: String,
        message: String,
    },

    #[error("Failed to register target metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Target server error: {0}")]
    Server(#[from] hyper::Error),

    #[error("Target server task failed: {0}")]
    Task(String),
}

/// Target server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetConfig {
    pub listen_addr: SocketAddr,
    pub latency_threshold: Duration,
}

impl TargetConfig {
    /// Reads `TARGET_LISTEN_ADDR` and `LATENCY_THRESHOLD`.
    pub fn from_env() -> Result<Self, TargetError> {
        let addr_str =
            env::var("TARGET_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = addr_str
            .parse::<SocketAddr>()
            .map_err(|e| TargetError::InvalidVar {
                var: "TARGET_LISTEN_ADDR",
                value: addr_str.clone(),
                message: e.to_string(),
            })?;

        let latency_threshold = match env::var("LATENCY_THRESHOLD") {
            Ok(value) => parse_duration_string(&value).map_err(|message| {
                TargetError::InvalidVar {
                    var: "LATENCY_THRESHOLD",
                    value: value.clone(),
                    message,
                }
            })?,
            Err(_) => DEFAULT_LATENCY_THRESHOLD,
        };

        Ok(Self {
            listen_addr,
            latency_threshold,
        })
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8081)),
            latency_threshold: DEFAULT_LATENCY_THRESHOLD,
        }
    }
}

/// Serves the target on `addr` until `shutdown` resolves.
///
/// Binding failure is returned immediately. `on_bound` receives the actual
/// address, which differs from `addr` when port 0 was requested.
pub async fn serve_with_shutdown<F>(
    addr: SocketAddr,
    state: Arc<TargetState>,
    shutdown: F,
    on_bound: impl FnOnce(SocketAddr),
) -> Result<(), TargetError>
where
    F: Future<Output = ()>,
{
    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| handle(req, state.clone())))
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);
    let local_addr = server.local_addr();
    info!(addr = %local_addr, "Target server listening");
    on_bound(local_addr);

    server.with_graceful_shutdown(shutdown).await?;
    info!(addr = %local_addr, "Target server stopped");
    Ok(())
}

/// Serves the target until the process exits.
pub async fn serve(config: &TargetConfig) -> Result<(), TargetError> {
    let state = Arc::new(TargetState::new(config.latency_threshold)?);
    serve_with_shutdown(config.listen_addr, state, std::future::pending(), |_| {}).await
}

/// A target running on a background task.
pub struct TargetHandle {
    pub addr: SocketAddr,
    pub state: Arc<TargetState>,
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<Result<(), TargetError>>,
}

impl TargetHandle {
    /// Base URL of the running target, with a trailing slash.
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Stops accepting connections and waits for in-flight requests.
    pub async fn shutdown(self) -> Result<(), TargetError> {
        let _ = self.shutdown.send(());
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Target server task failed");
                Err(TargetError::Task(e.to_string()))
            }
        }
    }
}

/// Starts a target on a background task and returns once it is listening.
pub async fn spawn(config: &TargetConfig) -> Result<TargetHandle, TargetError> {
    let state = Arc::new(TargetState::new(config.latency_threshold)?);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (bound_tx, bound_rx) = oneshot::channel::<SocketAddr>();

    let server_state = state.clone();
    let listen_addr = config.listen_addr;
    let join = tokio::spawn(async move {
        serve_with_shutdown(
            listen_addr,
            server_state,
            async {
                let _ = shutdown_rx.await;
            },
            move |addr| {
                let _ = bound_tx.send(addr);
            },
        )
        .await
    });

    match bound_rx.await {
        Ok(addr) => Ok(TargetHandle {
            addr,
            state,
            shutdown: shutdown_tx,
            join,
        }),
        // The sender is dropped unsent only when binding failed.
        Err(_) => match join.await {
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Err(TargetError::Task("stopped before listening".to_string())),
            Err(e) => Err(TargetError::Task(e.to_string())),
        },
    }
}
