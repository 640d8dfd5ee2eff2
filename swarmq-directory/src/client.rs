//! Per-connection client state

use std::net::SocketAddr;
use std::sync::Arc;

use crate::registration::PeerInfo;

/// Where a connection is in its lifecycle. The protocol magic is consumed by
/// the acceptor before a `Client` exists, so the first state here is waiting
/// for IDENTIFY.
#[derive(Debug, Clone)]
pub enum ClientState {
    AwaitingIdentify,
    Ready(Arc<PeerInfo>),
}

/// One accepted lookup-protocol connection.
#[derive(Debug)]
pub struct Client {
    pub remote_addr: SocketAddr,
    pub state: ClientState,
}

impl Client {
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            remote_addr,
            state: ClientState::AwaitingIdentify,
        }
    }

    pub fn peer_info(&self) -> Option<&Arc<PeerInfo>> {
        match &self.state {
            ClientState::Ready(peer_info) => Some(peer_info),
            ClientState::AwaitingIdentify => None,
        }
    }

    /// Transition to Ready. The peer record's `id` is fixed for the lifetime
    /// of the connection.
    pub fn identify(&mut self, peer_info: Arc<PeerInfo>) {
        self.state = ClientState::Ready(peer_info);
    }
}

impl std::fmt::Display for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.remote_addr)
    }
}
