use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::WireMessage;

// frame structure : length(4, big endian) + postcard(Frame)

pub const FRAME_PREAMBLE: u16 = 0x4857;
pub const PROTOCOL_VERSION: u8 = 0x01;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Serialize, Deserialize, Debug)]
struct Frame<M> {
    preamble: u16,
    version: u8,
    message: M,
}

#[derive(Debug, Error)]
pub enum OutletError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Postcard error: {0}")]
    Postcard(#[from] postcard::Error),
    #[error("Invalid frame preamble: {0:#06X}")]
    InvalidPreamble(u16),
    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
    #[error("Frame of {0} bytes exceeds the frame size limit")]
    TooLarge(usize),
    #[error("Unexpected message: expected {expected}")]
    UnexpectedMessage { expected: &'static str },
}

pub async fn write_frame<W>(writer: &mut W, message: &WireMessage) -> Result<(), OutletError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = postcard::to_allocvec(&Frame {
        preamble: FRAME_PREAMBLE,
        version: PROTOCOL_VERSION,
        message,
    })?;

    if bytes.len() > MAX_FRAME_SIZE {
        return Err(OutletError::TooLarge(bytes.len()));
    }

    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;

    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<WireMessage, OutletError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(OutletError::TooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    let frame: Frame<WireMessage> = postcard::from_bytes(&buf)?;
    if frame.preamble != FRAME_PREAMBLE {
        return Err(OutletError::InvalidPreamble(frame.preamble));
    }
    if frame.version != PROTOCOL_VERSION {
        return Err(OutletError::UnsupportedVersion(frame.version));
    }

    Ok(frame.message)
}
