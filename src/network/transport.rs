// network/transport.rs - One-Shot TCP Calls

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use super::codec::{read_frame, write_frame, CodecError, DEFAULT_MAX_FRAME_BYTES};
use crate::protocol::Message;

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out during {stage} with {addr}")]
    Timeout {
        addr: SocketAddr,
        stage: &'static str,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Network configuration shared by clients and servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Timeout for a whole request/reply exchange in milliseconds
    pub io_timeout_ms: u64,

    /// Largest accepted frame
    pub max_frame_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            io_timeout_ms: 10_000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

/// Open a fresh connection to `addr`, send `message`, wait for exactly one
/// reply and close.
pub async fn call(
    addr: SocketAddr,
    message: &Message,
    config: &NetworkConfig,
) -> Result<Message, TransportError> {
    let mut stream = timeout(config.connect_timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout {
            addr,
            stage: "connect",
        })?
        .map_err(|source| TransportError::Connect { addr, source })?;

    trace!(peer = %addr, kind = %message.kind, "Sending request");

    let reply = timeout(config.io_timeout(), async {
        write_frame(&mut stream, message, config.max_frame_bytes).await?;
        read_frame(&mut stream, config.max_frame_bytes).await
    })
    .await
    .map_err(|_| TransportError::Timeout {
        addr,
        stage: "exchange",
    })??;

    // Best effort: the reply is already in hand.
    let _ = stream.shutdown().await;

    trace!(peer = %addr, kind = %reply.kind, refused = reply.is_request, "Received reply");
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Content, MessageType};
    use tokio::net::TcpListener;

    #[test]
    fn test_network_config_default() {
        let config = NetworkConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.io_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut stream, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
            let reply = request.reply(Content::Empty);
            write_frame(&mut stream, &reply, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
        });

        let request = Message::request(MessageType::FetchSp, Content::Empty);
        let reply = call(addr, &request, &NetworkConfig::default()).await.unwrap();

        assert_eq!(reply.kind, MessageType::FetchSp);
        assert!(!reply.is_request);
    }

    #[tokio::test]
    async fn test_call_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let request = Message::request(MessageType::Certificate, Content::Empty);
        let err = call(addr, &request, &NetworkConfig::default()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[tokio::test]
    async fn test_call_times_out_on_silent_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = NetworkConfig {
            io_timeout_ms: 100,
            ..NetworkConfig::default()
        };
        let request = Message::request(MessageType::FetchSp, Content::Empty);
        let err = call(addr, &request, &config).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { stage: "exchange", .. }));
    }
}
