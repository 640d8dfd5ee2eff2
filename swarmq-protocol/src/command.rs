//! Directory commands
//!
//! Client-side encoding of the requests a producer sends to the directory.
//! A request is a single space-separated line terminated by `\n`; IDENTIFY
//! is followed by a 4-byte big-endian length and a JSON body.

use bytes::{BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Identify { body: serde_json::Value },
    Register { topic: String, channel: Option<String> },
    Unregister { topic: String, channel: Option<String> },
    Ping,
}

impl Command {
    /// Serialize the command to its wire form.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();

        match self {
            Command::Identify { body } => {
                buf.put_slice(b"IDENTIFY\n");
                let json = serde_json::to_vec(body)
                    .map_err(|e| ProtocolError::Serialization(e.to_string()))?;
                buf.put_u32(json.len() as u32);
                buf.put_slice(&json);
            }

            Command::Register { topic, channel } => {
                buf.put_slice(b"REGISTER ");
                buf.put_slice(topic.as_bytes());
                if let Some(channel) = channel {
                    buf.put_slice(b" ");
                    buf.put_slice(channel.as_bytes());
                }
                buf.put_slice(b"\n");
            }

            Command::Unregister { topic, channel } => {
                buf.put_slice(b"UNREGISTER ");
                buf.put_slice(topic.as_bytes());
                if let Some(channel) = channel {
                    buf.put_slice(b" ");
                    buf.put_slice(channel.as_bytes());
                }
                buf.put_slice(b"\n");
            }

            Command::Ping => {
                buf.put_slice(b"PING\n");
            }
        }

        Ok(buf.freeze())
    }

    /// Get command name
    pub fn name(&self) -> &'static str {
        match self {
            Command::Identify { .. } => "IDENTIFY",
            Command::Register { .. } => "REGISTER",
            Command::Unregister { .. } => "UNREGISTER",
            Command::Ping => "PING",
        }
    }
}
