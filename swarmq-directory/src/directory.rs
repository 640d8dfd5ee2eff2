//! Daemon wiring
//!
//! Owns the registration database, both listeners, and the shutdown token
//! that sequences the graceful drain: stop accepting, cancel every open
//! connection, wait for the handlers, stop the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use swarmq_common::{DirectoryConfig, Metrics, Result, SwarmError};

use crate::http;
use crate::registration::RegistrationDb;
use crate::tcp::TcpServer;

pub struct Directory {
    pub config: DirectoryConfig,
    pub db: RegistrationDb,
    pub metrics: Metrics,
    tcp_addr: SocketAddr,
    http_addr: SocketAddr,
    tcp_listener: Mutex<Option<TcpListener>>,
    http_listener: Mutex<Option<TcpListener>>,
    shutdown: CancellationToken,
}

impl Directory {
    /// Bind both listeners up front so IDENTIFY responses can report the
    /// real ports.
    pub async fn new(config: DirectoryConfig) -> Result<Arc<Self>> {
        let metrics = Metrics::new(&config.base)?;

        tracing::info!("swarmq-directory v{}", env!("CARGO_PKG_VERSION"));

        let tcp_listener = TcpListener::bind(&config.tcp_address).await.map_err(|e| {
            SwarmError::Config(format!("listen ({}) failed - {}", config.tcp_address, e))
        })?;
        let http_listener = TcpListener::bind(&config.http_address).await.map_err(|e| {
            SwarmError::Config(format!("listen ({}) failed - {}", config.http_address, e))
        })?;
        let tcp_addr = tcp_listener.local_addr()?;
        let http_addr = http_listener.local_addr()?;

        Ok(Arc::new(Self {
            config,
            db: RegistrationDb::new(),
            metrics,
            tcp_addr,
            http_addr,
            tcp_listener: Mutex::new(Some(tcp_listener)),
            http_listener: Mutex::new(Some(http_listener)),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Address the TCP listener actually bound.
    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    /// Address the HTTP listener actually bound.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Run the TCP acceptor and the HTTP server until the first fatal error
    /// or a shutdown request. Both sides are fully drained before this
    /// returns; the first one to finish triggers the drain for the other.
    pub async fn main(self: Arc<Self>) -> Result<()> {
        let tcp_listener = self
            .tcp_listener
            .lock()
            .take()
            .ok_or_else(|| SwarmError::Internal("directory already started".to_string()))?;
        let http_listener = self
            .http_listener
            .lock()
            .take()
            .ok_or_else(|| SwarmError::Internal("directory already started".to_string()))?;

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        let tcp_server = Arc::new(TcpServer::new(self.clone()));
        let shutdown = self.shutdown.clone();
        tasks.spawn(async move { tcp_server.serve(tcp_listener, shutdown).await });

        let app = http::router(self.clone());
        let shutdown = self.shutdown.clone();
        tracing::info!("HTTP: listening on {}", self.http_addr);
        tasks.spawn(async move {
            axum::serve(http_listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(SwarmError::Io)
        });

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let task_result = match joined {
                Ok(r) => r,
                Err(e) => Err(SwarmError::Internal(format!("task failed: {}", e))),
            };
            if let Err(e) = task_result {
                tracing::error!("{}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
            // whichever side finishes first starts the drain for the rest
            self.exit();
        }

        result
    }

    /// Request shutdown. Idempotent: only the first call starts the drain.
    pub fn exit(&self) {
        self.shutdown.cancel();
    }
}
