//! Message serialization and deserialization using postcard
//!
//! Every message travels on its own QUIC stream, length-prefixed:
//! ```text
//! [Length: u32 (big-endian)][Message bytes (postcard serialized)]
//! ```
//!
//! Signaling traffic is small (SDP blobs, ciphertext, ICE candidates), so
//! frames are capped at 1 MiB.

use crate::{CURRENT_VERSION, Message, ProtocolVersion, error::ProtocolError, error::Result};

#[cfg(feature = "async")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum allowed frame size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length prefix size in bytes
const LEN_PREFIX: usize = 4;

/// Encode a message to bytes using postcard
///
/// # Example
/// ```
/// use protocol::{ClientRequest, Message, encode_message};
///
/// let msg = Message::request(ClientRequest::RegisterDeviceToken {
///     token: "token".to_string(),
/// });
/// let bytes = encode_message(&msg).unwrap();
/// assert!(!bytes.is_empty());
/// ```
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    postcard::to_allocvec(message).map_err(ProtocolError::from)
}

/// Decode a message from bytes using postcard
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    postcard::from_bytes(bytes).map_err(ProtocolError::from)
}

/// Validate protocol version compatibility
///
/// Compatible if major versions match; minor differences are tolerated both ways.
pub fn validate_version(message_version: &ProtocolVersion) -> Result<()> {
    if !message_version.is_compatible_with(&CURRENT_VERSION) {
        return Err(ProtocolError::IncompatibleVersion {
            major: message_version.major,
            minor: message_version.minor,
            expected_major: CURRENT_VERSION.major,
            expected_minor: CURRENT_VERSION.minor,
        });
    }
    Ok(())
}

/// Encode a message with length prefix for framing
pub fn encode_framed(message: &Message) -> Result<Vec<u8>> {
    let message_bytes = encode_message(message)?;
    let message_len = message_bytes.len();

    if message_len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: message_len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(LEN_PREFIX + message_len);
    frame.extend_from_slice(&(message_len as u32).to_be_bytes());
    frame.extend_from_slice(&message_bytes);

    Ok(frame)
}

/// Decode a framed message
///
/// Trailing bytes after the frame are ignored.
pub fn decode_framed(frame: &[u8]) -> Result<Message> {
    if frame.len() < LEN_PREFIX {
        return Err(ProtocolError::IncompleteFrame {
            expected: LEN_PREFIX,
            actual: frame.len(),
        });
    }

    let length = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    check_frame_len(length)?;

    if frame.len() < LEN_PREFIX + length {
        return Err(ProtocolError::IncompleteFrame {
            expected: LEN_PREFIX + length,
            actual: frame.len(),
        });
    }

    decode_message(&frame[LEN_PREFIX..LEN_PREFIX + length])
}

fn check_frame_len(length: usize) -> Result<()> {
    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(())
}

/// Async: encode and write one framed message
#[cfg(feature = "async")]
pub async fn write_message_async<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWriteExt + Unpin,
{
    let framed = encode_framed(message)?;
    writer.write_all(&framed).await?;
    Ok(())
}

/// Async: read and decode one framed message
///
/// The length prefix is checked before the body is allocated.
#[cfg(feature = "async")]
pub async fn read_message_async<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_bytes = [0u8; LEN_PREFIX];
    reader.read_exact(&mut len_bytes).await?;
    let length = u32::from_be_bytes(len_bytes) as usize;
    check_frame_len(length)?;

    let mut message_bytes = vec![0u8; length];
    reader.read_exact(&mut message_bytes).await?;

    decode_message(&message_bytes)
}
