//! Stream framing: `[u32 little-endian length][payload]`

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Errors that can occur during message framing
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {0} bytes (max {1})")]
    MessageTooLarge(usize, usize),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn closed_on_eof(e: io::Error) -> FramingError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FramingError::ConnectionClosed
    } else {
        FramingError::Io(e)
    }
}

/// Read one frame, refusing payloads above `limit` before allocating
pub async fn read_frame<R: AsyncRead + Unpin>(
    stream: &mut R,
    limit: usize,
) -> Result<Vec<u8>, FramingError> {
    let len = stream.read_u32_le().await.map_err(closed_on_eof)? as usize;
    if len > limit {
        return Err(FramingError::MessageTooLarge(len, limit));
    }

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await.map_err(closed_on_eof)?;
    Ok(payload)
}

/// Write one frame and flush it
pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    payload: &[u8],
    limit: usize,
) -> Result<(), FramingError> {
    if payload.len() > limit {
        return Err(FramingError::MessageTooLarge(payload.len(), limit));
    }

    stream.write_u32_le(payload.len() as u32).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}
