//! Reply framing
//!
//! Every reply on the wire is length-prefixed. Framed replies additionally
//! carry a frame type between the length and the payload; the messaging
//! dialect uses them to multiplex responses, errors, and messages on one
//! stream. The lookup dialect replies unframed.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::errors::{ProtocolError, Result};

/// Frame types carried by framed replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Response = 0,
    Error = 1,
    Message = 2,
}

impl TryFrom<i32> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(FrameType::Response),
            1 => Ok(FrameType::Error),
            2 => Ok(FrameType::Message),
            _ => Err(ProtocolError::InvalidFrameType(value)),
        }
    }
}

/// A framed reply: `<size:i32 BE><frame_type:i32 BE><body>` where `size`
/// covers the frame type and the body.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: FrameType,
    pub body: Bytes,
}

impl Frame {
    pub fn new(frame_type: FrameType, body: Bytes) -> Self {
        Self { frame_type, body }
    }

    /// Serialize the frame, length prefix included.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(8 + self.body.len());
        buf.put_i32((self.body.len() + 4) as i32);
        buf.put_i32(self.frame_type as i32);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Deserialize a frame from bytes, validating the length prefix.
    pub fn from_bytes(mut data: Bytes) -> Result<Self> {
        if data.len() < 8 {
            return Err(ProtocolError::BadFraming(format!(
                "frame too short ({} bytes)",
                data.len()
            )));
        }

        let size = data.get_i32();
        if size < 4 {
            return Err(ProtocolError::BadFraming(format!("invalid frame size {}", size)));
        }
        let frame_type = FrameType::try_from(data.get_i32())?;

        let body_len = (size - 4) as usize;
        if data.len() < body_len {
            return Err(ProtocolError::BadFraming(format!(
                "frame body short ({} of {} bytes)",
                data.len(),
                body_len
            )));
        }
        let body = data.split_to(body_len);

        Ok(Self { frame_type, body })
    }

    /// Total size on the wire, length prefix included.
    pub fn total_size(&self) -> usize {
        4 + 4 + self.body.len()
    }
}
