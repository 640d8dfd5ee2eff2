//! The `  V1` lookup dialect
//!
//! Line-oriented commands with length-prefixed replies. REGISTER and
//! UNREGISTER require a prior IDENTIFY; fatal errors close the connection
//! after the error reply is written. Whatever ends the loop, the handler
//! removes the producer from every registration before returning.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use swarmq_common::{
    default_hostname, is_valid_channel_name, is_valid_topic_name, Result, SwarmError,
};
use swarmq_protocol::{read_len_prefixed, send_response, ClientError, ProtocolError};

use crate::client::Client;
use crate::directory::Directory;
use crate::registration::{unix_nanos, PeerInfo, Producer, Registration};

/// A protocol dialect, selected by the 4-byte magic the acceptor reads.
#[async_trait]
pub trait Protocol: Send + Sync {
    async fn io_loop(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<()>;
}

pub struct LookupProtocolV1 {
    directory: Arc<Directory>,
}

impl LookupProtocolV1 {
    pub fn new(directory: Arc<Directory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Protocol for LookupProtocolV1 {
    async fn io_loop(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let mut client = Client::new(addr);
        let (read_half, mut writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        let result = loop {
            line.clear();
            let read = tokio::select! {
                read = reader.read_line(&mut line) => read,
                _ = shutdown.cancelled() => break Ok(()),
            };
            match read {
                Ok(0) => break Ok(()), // EOF
                Ok(_) if !line.ends_with('\n') => {
                    break Err(ProtocolError::BadFraming("unterminated line".to_string()).into());
                }
                Ok(_) => {}
                Err(e) => break Err(SwarmError::Io(e)),
            }

            let params: Vec<&str> = line.trim().split(' ').collect();
            self.directory.metrics.incr("directory.commands", 1);

            match self.exec(&mut client, &mut reader, &params).await {
                Ok(response) => {
                    if let Err(e) = send_response(&mut writer, &response).await {
                        break Err(e.into());
                    }
                }
                Err(err) => {
                    tracing::error!("[{}] - {}", client, err);

                    if let Err(send_err) =
                        send_response(&mut writer, err.to_string().as_bytes()).await
                    {
                        tracing::error!("[{}] - {}", client, send_err);
                        break Err(send_err.into());
                    }

                    // fatal client errors forcibly close the connection
                    if err.is_fatal() {
                        break Ok(());
                    }
                }
            }
        };

        tracing::info!("CLIENT({}): closing", client);
        if let Some(peer_info) = client.peer_info() {
            let registrations = self.directory.db.lookup_registrations(&peer_info.id);
            for r in registrations {
                let (removed, left) = self.directory.db.remove_producer(&r, &peer_info.id);
                if removed {
                    tracing::info!(
                        "DB: client({}) UNREGISTER category:{} key:{} subkey:{}",
                        client,
                        r.category,
                        r.key,
                        r.subkey
                    );
                }
                if left == 0 && r.is_ephemeral() {
                    self.directory.db.remove_registration(&r);
                }
            }
        }

        result
    }
}

impl LookupProtocolV1 {
    async fn exec<R>(
        &self,
        client: &mut Client,
        reader: &mut R,
        params: &[&str],
    ) -> std::result::Result<Vec<u8>, ClientError>
    where
        R: AsyncRead + Unpin + Send,
    {
        match params.first().copied() {
            Some("PING") => self.ping(client),
            Some("IDENTIFY") => self.identify(client, reader).await,
            Some("REGISTER") => self.register(client, &params[1..]),
            Some("UNREGISTER") => self.unregister(client, &params[1..]),
            other => Err(ClientError::fatal(
                "E_INVALID",
                format!("invalid command {}", other.unwrap_or_default()),
            )),
        }
    }

    async fn identify<R>(
        &self,
        client: &mut Client,
        reader: &mut R,
    ) -> std::result::Result<Vec<u8>, ClientError>
    where
        R: AsyncRead + Unpin + Send,
    {
        if client.peer_info().is_some() {
            return Err(ClientError::fatal("E_INVALID", "cannot IDENTIFY again"));
        }

        let body = read_len_prefixed(reader).await.map_err(|e| {
            ClientError::fatal("E_BAD_BODY", format!("IDENTIFY failed to read body - {}", e))
        })?;

        // body is a json structure with producer information
        let mut peer_info: PeerInfo = serde_json::from_slice(&body).map_err(|e| {
            ClientError::fatal(
                "E_BAD_BODY",
                format!("IDENTIFY failed to decode JSON body - {}", e),
            )
        })?;
        peer_info.id = client.remote_addr.to_string();
        peer_info.remote_address = client.remote_addr.to_string();

        // require all fields
        if peer_info.broadcast_address.is_empty()
            || peer_info.tcp_port == 0
            || peer_info.http_port == 0
            || peer_info.version.is_empty()
        {
            return Err(ClientError::fatal("E_BAD_BODY", "IDENTIFY missing fields"));
        }

        peer_info.touch(unix_nanos());

        tracing::info!(
            "CLIENT({}): IDENTIFY Address:{} TCP:{} HTTP:{} Version:{}",
            client,
            peer_info.broadcast_address,
            peer_info.tcp_port,
            peer_info.http_port,
            peer_info.version
        );

        let peer_info = Arc::new(peer_info);
        client.identify(peer_info.clone());
        let key = Registration::new("client", "", "");
        if self.directory.db.add_producer(key, Producer::new(peer_info)) {
            tracing::info!("DB: client({}) REGISTER category:client key: subkey:", client);
        }

        let data = serde_json::json!({
            "tcp_port": self.directory.tcp_addr().port(),
            "http_port": self.directory.http_addr().port(),
            "version": env!("CARGO_PKG_VERSION"),
            "broadcast_address": self.directory.config.broadcast_address,
            "hostname": default_hostname(),
        });
        match serde_json::to_vec(&data) {
            Ok(response) => Ok(response),
            // clients accept a plain OK when the response cannot be marshaled
            Err(_) => {
                tracing::error!("marshaling {:?}", data);
                Ok(b"OK".to_vec())
            }
        }
    }

    fn register(
        &self,
        client: &mut Client,
        params: &[&str],
    ) -> std::result::Result<Vec<u8>, ClientError> {
        let peer_info = client
            .peer_info()
            .cloned()
            .ok_or_else(|| ClientError::fatal("E_INVALID", "client must IDENTIFY"))?;

        let (topic, channel) = get_topic_chan("REGISTER", params)?;

        if let Some(channel) = &channel {
            let key = Registration::new("channel", topic.as_str(), channel.as_str());
            if self
                .directory
                .db
                .add_producer(key, Producer::new(peer_info.clone()))
            {
                tracing::info!(
                    "DB: client({}) REGISTER category:channel key:{} subkey:{}",
                    client,
                    topic,
                    channel
                );
            }
        }

        let key = Registration::new("topic", topic.as_str(), "");
        if self.directory.db.add_producer(key, Producer::new(peer_info)) {
            tracing::info!(
                "DB: client({}) REGISTER category:topic key:{} subkey:",
                client,
                topic
            );
        }

        Ok(b"OK".to_vec())
    }

    fn unregister(
        &self,
        client: &mut Client,
        params: &[&str],
    ) -> std::result::Result<Vec<u8>, ClientError> {
        let peer_info = client
            .peer_info()
            .cloned()
            .ok_or_else(|| ClientError::fatal("E_INVALID", "client must IDENTIFY"))?;

        let (topic, channel) = get_topic_chan("UNREGISTER", params)?;
        let db = &self.directory.db;

        if let Some(channel) = &channel {
            let key = Registration::new("channel", topic.as_str(), channel.as_str());
            let (removed, left) = db.remove_producer(&key, &peer_info.id);
            if removed {
                tracing::info!(
                    "DB: client({}) UNREGISTER category:channel key:{} subkey:{}",
                    client,
                    topic,
                    channel
                );
            }
            // ephemeral channels are deleted outright once empty
            if left == 0 && key.is_ephemeral() {
                db.remove_registration(&key);
            }
        } else {
            // a topic unregistration should not leave channel entries behind;
            // warn when the sweep actually removes anything
            for r in db.find_registrations("channel", &topic, "*") {
                let (removed, _) = db.remove_producer(&r, &peer_info.id);
                if removed {
                    tracing::warn!(
                        "client({}) unexpected UNREGISTER category:channel key:{} subkey:{}",
                        client,
                        topic,
                        r.subkey
                    );
                }
            }

            let key = Registration::new("topic", topic.as_str(), "");
            let (removed, left) = db.remove_producer(&key, &peer_info.id);
            if removed {
                tracing::info!(
                    "DB: client({}) UNREGISTER category:topic key:{} subkey:",
                    client,
                    topic
                );
            }
            if left == 0 && key.is_ephemeral() {
                db.remove_registration(&key);
            }
        }

        Ok(b"OK".to_vec())
    }

    fn ping(&self, client: &mut Client) -> std::result::Result<Vec<u8>, ClientError> {
        if let Some(peer_info) = client.peer_info() {
            // a PING can arrive before any other command on this connection
            let last = peer_info.last_update();
            let now = unix_nanos();
            tracing::info!(
                "CLIENT({}): pinged (last ping {}ns ago)",
                peer_info.id,
                now - last
            );
            peer_info.touch(now);
        }
        Ok(b"OK".to_vec())
    }
}

fn get_topic_chan(
    command: &str,
    params: &[&str],
) -> std::result::Result<(String, Option<String>), ClientError> {
    if params.is_empty() {
        return Err(ClientError::fatal(
            "E_INVALID",
            format!("{} insufficient number of params", command),
        ));
    }

    let topic = params[0];
    let channel = params.get(1).copied().filter(|c| !c.is_empty());

    if !is_valid_topic_name(topic) {
        return Err(ClientError::fatal(
            "E_BAD_TOPIC",
            format!("{} topic name '{}' is not valid", command, topic),
        ));
    }

    if let Some(channel) = channel {
        if !is_valid_channel_name(channel) {
            return Err(ClientError::fatal(
                "E_BAD_CHANNEL",
                format!("{} channel name '{}' is not valid", command, channel),
            ));
        }
    }

    Ok((topic.to_string(), channel.map(str::to_string)))
}
