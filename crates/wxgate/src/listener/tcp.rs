use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, warn};
use wxgate_protocol::Message;

use super::Limits;
use crate::buffer::{BufferError, MessageBuffer};
use crate::context::{ServeContext, StopCause};

/// Written back once a push has been decoded.
const ACK: &[u8] = b"200 OK";

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Source of inbound connections.
#[async_trait]
pub(super) trait Incoming: Send {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Incoming for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// One connection went away before it was accepted.
    Connection,
    /// Out of descriptors, buffers or memory. Clears up on its own.
    Exhausted,
    /// The listening socket itself is unusable.
    Fatal,
}

fn classify(e: &io::Error) -> AcceptFailure {
    match e.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionRefused
        | ErrorKind::ConnectionReset
        | ErrorKind::Interrupted
        | ErrorKind::TimedOut
        | ErrorKind::WouldBlock => AcceptFailure::Connection,
        ErrorKind::InvalidInput | ErrorKind::NotConnected | ErrorKind::Unsupported => {
            AcceptFailure::Fatal
        }
        _ => AcceptFailure::Exhausted,
    }
}

#[derive(Debug, Error)]
enum PushError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read timed out")]
    Timeout,

    #[error("message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("invalid message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Buffer(#[from] BufferError),
}

pub(super) async fn serve<L: Incoming>(
    mut listener: L,
    buffer: Arc<dyn MessageBuffer>,
    ctx: ServeContext,
    limits: Limits,
) {
    let mut backoff = MIN_ACCEPT_BACKOFF;
    loop {
        let accepted = tokio::select! {
            _ = ctx.stopped() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(v) => v,
            Err(e) => match classify(&e) {
                AcceptFailure::Connection => {
                    debug!(error = %e, "Callback connection dropped before accept");
                    continue;
                }
                AcceptFailure::Exhausted => {
                    warn!(error = %e, retry_in = ?backoff, "Callback accept failed, retrying");
                    tokio::select! {
                        _ = ctx.stopped() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_ACCEPT_BACKOFF);
                    continue;
                }
                AcceptFailure::Fatal => {
                    error!(error = %e, "Callback accept failed");
                    ctx.stop(StopCause::ListenerFailed(e.to_string()));
                    break;
                }
            },
        };
        backoff = MIN_ACCEPT_BACKOFF;

        let buffer = buffer.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_push(stream, peer, buffer.as_ref(), limits).await {
                warn!(%peer, error = %e, "Dropped callback push");
            }
        });
    }
}

async fn handle_push(
    mut stream: TcpStream,
    peer: SocketAddr,
    buffer: &dyn MessageBuffer,
    limits: Limits,
) -> Result<(), PushError> {
    let body = read_body(&mut stream, limits).await?;
    let msg: Message = serde_json::from_slice(&body)?;
    debug!(%peer, msg_id = msg.msg_id, msg_type = msg.msg_type, "Received message");

    buffer.put(msg).await?;

    stream.write_all(ACK).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Read until the peer half-closes, bounded by size and time.
async fn read_body(stream: &mut TcpStream, limits: Limits) -> Result<Vec<u8>, PushError> {
    let mut body = Vec::new();
    let cap = limits.max_message_bytes as u64 + 1;
    let mut limited = stream.take(cap);

    tokio::time::timeout(limits.read_timeout, limited.read_to_end(&mut body))
        .await
        .map_err(|_| PushError::Timeout)??;

    if body.len() > limits.max_message_bytes {
        return Err(PushError::TooLarge(limits.max_message_bytes));
    }
    Ok(body)
}
