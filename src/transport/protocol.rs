//! Wire envelopes for the TCP transport
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::TransportError;

/// Largest message accepted from the wire
pub const MAX_MESSAGE_LEN: usize = 16 * 1024 * 1024;

/// Messages exchanged with the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// First message from a client: the topics it joins
    Hello { topics: Vec<String> },

    /// Ask the relay to forward `topic`
    Subscribe { topic: String },

    /// Client to relay
    Publish { topic: String, payload: Value },

    /// Relay to client
    Message { topic: String, payload: Value },

    /// Orderly disconnect
    Bye,
}

/// Write one length-prefixed envelope
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(envelope)?;
    if body.len() > MAX_MESSAGE_LEN {
        return Err(TransportError::TooLarge(body.len()));
    }
    let len = (body.len() as u32).to_le_bytes();

    writer.write_all(&len).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one length-prefixed envelope. Returns `None` on a clean end of
/// stream between messages.
pub async fn read_envelope<R>(reader: &mut R) -> Result<Option<Envelope>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        return Err(TransportError::TooLarge(len));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    Ok(Some(serde_json::from_slice(&body)?))
}
