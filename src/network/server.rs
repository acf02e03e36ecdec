// network/server.rs - Accept Loop with Graceful Shutdown

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::codec::{read_frame, write_frame};
use super::transport::NetworkConfig;
use crate::observability::{record_request_handled, record_request_latency};
use crate::protocol::Message;

/// Server lifecycle errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Answers one decoded request with one reply
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, peer: SocketAddr, message: Message) -> Message;
}

/// Handle to a running accept loop
pub struct ServerHandle {
    name: String,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, wait for in-flight connections, then return.
    ///
    /// Only sends on a channel and awaits, so it is safe to call from an
    /// interrupt-driven task.
    pub async fn shutdown(self) -> Result<(), ServerError> {
        info!(server = %self.name, "Shutting down handler task");
        let _ = self.shutdown.send(true);
        self.task.await?;
        info!(server = %self.name, "Shutdown completed");
        Ok(())
    }
}

/// Spawn the accept loop for `listener` on its own task
pub fn spawn<H>(
    name: impl Into<String>,
    listener: TcpListener,
    handler: Arc<H>,
    config: NetworkConfig,
) -> Result<ServerHandle, ServerError>
where
    H: RequestHandler,
{
    let name = name.into();
    let local_addr = listener.local_addr()?;
    let (shutdown, shutdown_rx) = watch::channel(false);

    info!(server = %name, addr = %local_addr, "Serving requests");

    let task = tokio::spawn(accept_loop(
        name.clone(),
        listener,
        handler,
        config,
        shutdown_rx,
    ));

    Ok(ServerHandle {
        name,
        local_addr,
        shutdown,
        task,
    })
}

async fn accept_loop<H>(
    name: String,
    listener: TcpListener,
    handler: Arc<H>,
    config: NetworkConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    H: RequestHandler,
{
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = handler.clone();
                    let config = config.clone();
                    connections.spawn(serve_connection(stream, peer, handler, config));
                }
                Err(e) => warn!(server = %name, error = %e, "Accept failed"),
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    warn!(server = %name, error = %e, "Connection task failed");
                }
            }
        }
    }

    drop(listener);

    if !connections.is_empty() {
        debug!(server = %name, in_flight = connections.len(), "Draining in-flight connections");
    }
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            warn!(server = %name, error = %e, "Connection task failed");
        }
    }
}

/// Receive one request, process it, send one reply, close
async fn serve_connection<H>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    config: NetworkConfig,
) where
    H: RequestHandler,
{
    let request = match timeout(config.io_timeout(), read_frame(&mut stream, config.max_frame_bytes)).await {
        Ok(Ok(message)) => message,
        Ok(Err(e)) => {
            warn!(peer = %peer, error = %e, "Dropping undecodable request");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "Timed out waiting for request");
            return;
        }
    };

    let kind = request.kind;
    let started = Instant::now();
    let reply = handler.handle(peer, request).await;
    record_request_handled(kind.as_str(), reply.is_request);
    record_request_latency(kind.as_str(), started.elapsed());

    match timeout(config.io_timeout(), write_frame(&mut stream, &reply, config.max_frame_bytes)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(peer = %peer, kind = %kind, error = %e, "Failed to send reply"),
        Err(_) => warn!(peer = %peer, kind = %kind, "Timed out sending reply"),
    }

    let _ = stream.shutdown().await;
}
