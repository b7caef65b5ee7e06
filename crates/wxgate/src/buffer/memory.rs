use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::warn;
use wxgate_protocol::Message;

use super::{BufferError, MessageBuffer};
use crate::context::ServeContext;

/// In-process bounded buffer.
///
/// Consumers queue on the receiver mutex, which tokio hands out in FIFO order.
pub struct MemoryBuffer {
    tx: mpsc::Sender<Message>,
    rx: Mutex<mpsc::Receiver<Message>>,
}

impl MemoryBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is zero; config validation rejects that earlier.
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl MessageBuffer for MemoryBuffer {
    async fn put(&self, msg: Message) -> Result<(), BufferError> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!(msg_id = msg.msg_id, from = %msg.from_user, "Message buffer full, dropping message");
                Ok(())
            }
            // Both halves live in `self`.
            Err(mpsc::error::TrySendError::Closed(_)) => Ok(()),
        }
    }

    async fn get(&self, ctx: &ServeContext, timeout: Duration) -> Result<Option<Message>, BufferError> {
        let recv = async {
            let mut rx = self.rx.lock().await;
            rx.recv().await
        };

        tokio::select! {
            biased;
            cause = ctx.stopped() => Err(BufferError::Stopped(cause)),
            msg = recv => Ok(msg),
            _ = tokio::time::sleep(timeout) => Ok(None),
        }
    }
}
