//! Framing: 4-byte big-endian length prefix + payload.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;
use crate::protocol_constants::{FRAME_LEN_SIZE, MAX_FRAME_LEN};

/// Writes one frame and flushes.
///
/// # Errors
///
/// Returns [`TransportError::FrameTooLarge`] without writing anything if the
/// payload exceeds [`MAX_FRAME_LEN`], or an I/O error.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` on a clean end of stream between frames.
///
/// # Errors
///
/// Returns [`TransportError::FrameTooLarge`] if the announced length exceeds
/// [`MAX_FRAME_LEN`], or an I/O error (including EOF inside a frame).
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; FRAME_LEN_SIZE];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(Bytes::from(payload)))
}
