//! Async wire helpers
//!
//! Server side: length-prefixed and framed reply writers. Client side:
//! magic and length-prefixed payload readers. Readers reject negative
//! lengths before allocating and report short reads as framing errors.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::errors::{ProtocolError, Result};
use crate::frame::FrameType;

/// Upper bound on any length-prefixed payload accepted from the wire.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Write `<len:i32 BE><data>`.
pub async fn send_response<W>(w: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_i32(data.len() as i32).await?;
    w.write_all(data).await?;
    w.flush().await?;
    Ok(())
}

/// Write `<len:i32 BE><frame_type:i32 BE><data>`; `len` covers the frame
/// type and the data.
pub async fn send_framed_response<W>(w: &mut W, frame_type: FrameType, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_i32((data.len() + 4) as i32).await?;
    w.write_i32(frame_type as i32).await?;
    w.write_all(data).await?;
    w.flush().await?;
    Ok(())
}

/// Read the 4-byte protocol magic that opens every connection.
pub async fn read_magic<R>(r: &mut R) -> Result<[u8; 4]>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Read one `<len:i32 BE><payload>` unit. Used for IDENTIFY bodies on the
/// server and for replies on the client.
pub async fn read_len_prefixed<R>(r: &mut R) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = r.read_i32().await.map_err(short_read)?;
    if len < 0 {
        return Err(ProtocolError::BadFraming(format!("negative payload length {}", len)));
    }
    let len = len as usize;
    if len > MAX_BODY_SIZE {
        return Err(ProtocolError::BadFraming(format!(
            "payload length {} exceeds limit {}",
            len, MAX_BODY_SIZE
        )));
    }

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).await.map_err(short_read)?;
    Ok(payload)
}

fn short_read(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::BadFraming("short read".to_string())
    } else {
        ProtocolError::Io(e)
    }
}
