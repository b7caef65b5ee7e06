//! Background long-poll loop over `sync-message`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wxgate_protocol::Message;

use crate::client::Client;
use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Messages held before the loop waits for the consumer.
    pub capacity: usize,
    /// Pause after a transient failure (connect error, timeout, 5xx).
    pub retry_delay: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Messages received by a running poll loop.
///
/// The loop ends on [`Subscription::close`], when the receiver is dropped,
/// or on the first non-transient error, such as the 401 the gateway answers
/// with once the account logged out. After that [`Subscription::recv`]
/// drains what was already received and then returns `None`; `close`
/// reports the error.
pub struct Subscription {
    messages: mpsc::Receiver<Message>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ClientError>>,
}

impl Subscription {
    pub(crate) fn spawn(client: Client, config: SubscriptionConfig) -> Self {
        let (tx, messages) = mpsc::channel(config.capacity.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll(client, tx, cancel.clone(), config.retry_delay));
        Self {
            messages,
            cancel,
            task,
        }
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.messages.recv().await
    }

    /// Stop polling and wait for the loop to finish.
    pub async fn close(self) -> Result<(), ClientError> {
        let Self {
            messages,
            cancel,
            task,
        } = self;
        cancel.cancel();
        drop(messages);
        task.await?
    }
}

async fn poll(
    client: Client,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    retry_delay: Duration,
) -> Result<(), ClientError> {
    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            batch = client.sync_message() => batch,
        };

        match batch {
            Ok(messages) => {
                for msg in messages {
                    debug!(msg_id = msg.msg_id, "Received message");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        sent = tx.send(msg) => {
                            if sent.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, retry_in = ?retry_delay, "sync-message failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}
