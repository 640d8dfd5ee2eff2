//! TCP acceptor
//!
//! Reads the 4-byte protocol magic from each accepted connection, selects a
//! dialect, and tracks open connections so shutdown can force every handler
//! to unwind and drain its disconnect cleanup.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use swarmq_common::{Result, SwarmError};
use swarmq_protocol::{read_magic, send_response, MAGIC_V1};

use crate::directory::Directory;
use crate::protocol::{LookupProtocolV1, Protocol};

pub struct TcpServer {
    directory: Arc<Directory>,
    conns: DashMap<SocketAddr, CancellationToken>,
}

impl TcpServer {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self {
            directory,
            conns: DashMap::new(),
        }
    }

    /// Accept until the shutdown token fires or a non-transient error, then
    /// cancel every open connection and wait for the handlers to finish.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        tracing::info!("TCP: listening on {}", listener.local_addr()?);

        let mut handlers = JoinSet::new();
        let result = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let token = CancellationToken::new();
                        self.conns.insert(addr, token.clone());
                        self.directory.metrics.incr("directory.connections", 1);

                        let server = self.clone();
                        handlers.spawn(async move {
                            server.handle(stream, addr, token).await;
                        });
                    }
                    Err(e) if is_transient_accept_error(&e) => {
                        tracing::warn!("temporary Accept() failure - {}", e);
                        tokio::task::yield_now().await;
                    }
                    Err(e) => break Err(SwarmError::Io(e)),
                },
                _ = shutdown.cancelled() => break Ok(()),
            }
        };
        drop(listener);

        self.close_all();
        while handlers.join_next().await.is_some() {}

        tracing::info!("TCP: closing");
        result
    }

    /// Per-connection: read the magic, pick the dialect, run its IO loop to
    /// completion, then drop the connection from the open set.
    async fn handle(&self, stream: TcpStream, addr: SocketAddr, shutdown: CancellationToken) {
        if let Err(e) = self.handle_conn(stream, addr, shutdown).await {
            tracing::error!("client({}) - {}", addr, e);
        }
        self.conns.remove(&addr);
        self.directory.metrics.incr("directory.connections.closed", 1);
    }

    async fn handle_conn(
        &self,
        mut stream: TcpStream,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<()> {
        tracing::info!("TCP: new client({})", addr);

        let magic = tokio::select! {
            magic = read_magic(&mut stream) => match magic {
                Ok(magic) => magic,
                Err(e) => {
                    tracing::error!("failed to read protocol version - {}", e);
                    return Ok(());
                }
            },
            _ = shutdown.cancelled() => return Ok(()),
        };
        tracing::info!(
            "CLIENT({}): desired protocol magic '{}'",
            addr,
            String::from_utf8_lossy(&magic)
        );

        let prot: Box<dyn Protocol> = if magic == *MAGIC_V1 {
            Box::new(LookupProtocolV1::new(self.directory.clone()))
        } else {
            send_response(&mut stream, b"E_BAD_PROTOCOL").await?;
            tracing::error!(
                "client({}) bad protocol magic '{}'",
                addr,
                String::from_utf8_lossy(&magic)
            );
            return Ok(());
        };

        prot.io_loop(stream, addr, shutdown).await
    }

    /// Force every open connection's handler to unwind.
    pub fn close_all(&self) {
        for entry in self.conns.iter() {
            entry.value().cancel();
        }
    }
}

fn is_transient_accept_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}
