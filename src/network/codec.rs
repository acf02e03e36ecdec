// network/codec.rs - Versioned Frame Codec

//! Frame layout:
//!
//! ```text
//! +----------------+---------+------------------------------+
//! | length (u32 BE)| version | bincode(Message)             |
//! +----------------+---------+------------------------------+
//! ```
//!
//! `length` counts the version byte plus the encoded message.

use bytes::{BufMut, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::Message;

/// Current wire version
pub const WIRE_VERSION: u8 = 1;

/// Default upper bound for a single frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Errors produced while encoding or decoding frames
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("Unsupported wire version {0}")]
    UnsupportedVersion(u8),

    #[error("Frame of {size} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Empty frame")]
    EmptyFrame,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encode a message as version byte + bincode payload
pub fn encode_message(message: &Message) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serde::encode_to_vec(message, bincode::config::standard())
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    let mut payload = Vec::with_capacity(body.len() + 1);
    payload.push(WIRE_VERSION);
    payload.extend_from_slice(&body);
    Ok(payload)
}

/// Decode a payload produced by [`encode_message`]
pub fn decode_message(payload: &[u8]) -> Result<Message, CodecError> {
    let (&version, body) = payload.split_first().ok_or(CodecError::EmptyFrame)?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let (message, consumed): (Message, usize) =
        bincode::serde::decode_from_slice(body, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;

    if consumed != body.len() {
        return Err(CodecError::Decode(format!(
            "{} trailing bytes after message",
            body.len() - consumed
        )));
    }

    Ok(message)
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W>(writer: &mut W, message: &Message, max: usize) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let payload = encode_message(message)?;
    if payload.len() > max {
        return Err(CodecError::FrameTooLarge {
            size: payload.len(),
            max,
        });
    }

    let mut frame = BytesMut::with_capacity(payload.len() + 4);
    frame.put_u32(payload.len() as u32);
    frame.put_slice(&payload);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame, rejecting oversized frames before allocating
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Message, CodecError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len == 0 {
        return Err(CodecError::EmptyFrame);
    }
    if len > max {
        return Err(CodecError::FrameTooLarge { size: len, max });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_message(&payload)
}
