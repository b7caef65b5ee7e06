//! Queue between the callback listener and `sync-message` consumers.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;
use wxgate_protocol::Message;

use crate::config::BufferConfig;
use crate::context::{ServeContext, StopCause};

pub use memory::MemoryBuffer;
#[cfg(feature = "redis")]
pub use self::redis::RedisBuffer;

#[derive(Debug, Error)]
pub enum BufferError {
    /// The serve context was cancelled while waiting.
    #[error(transparent)]
    Stopped(#[from] StopCause),

    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("failed to encode or decode message: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid buffer config: {0}")]
    Config(String),
}

/// Bounded FIFO of pushed messages.
///
/// `put` never blocks the listener: when the buffer is full the new message
/// is dropped with a warning. Each message is handed to exactly one `get`.
#[async_trait]
pub trait MessageBuffer: Send + Sync {
    async fn put(&self, msg: Message) -> Result<(), BufferError>;

    /// Wait up to `timeout` for the next message.
    ///
    /// Returns `Ok(None)` on timeout and [`BufferError::Stopped`] once `ctx`
    /// is cancelled.
    async fn get(&self, ctx: &ServeContext, timeout: Duration) -> Result<Option<Message>, BufferError>;
}

/// Build the buffer selected by `config`: Redis when a URL is set, in-memory otherwise.
pub async fn from_config(config: &BufferConfig) -> Result<Arc<dyn MessageBuffer>, BufferError> {
    match config.redis_url.as_deref() {
        None => {
            info!(capacity = config.capacity, "Using in-memory message buffer");
            Ok(Arc::new(MemoryBuffer::new(config.capacity)))
        }
        #[cfg(feature = "redis")]
        Some(url) => {
            let buffer = RedisBuffer::connect(url, &config.queue, config.capacity).await?;
            info!(queue = %config.queue, capacity = config.capacity, "Using redis message buffer");
            Ok(Arc::new(buffer))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => Err(BufferError::Config(
            "a queue address is configured but redis support is not compiled in".to_string(),
        )),
    }
}
