//! Redis list backed buffer.
//!
//! Messages are `LPUSH`ed as JSON and taken with `BRPOP`, so the list reads
//! FIFO. Survives gateway restarts as far as Redis itself does.

use std::time::Duration;

use async_trait::async_trait;
use redis::Client;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};
use wxgate_protocol::Message;

use super::{BufferError, MessageBuffer};
use crate::context::ServeContext;

/// Push unless the list already holds `ARGV[2]` entries. Returns -1 when full.
const PUSH_BOUNDED: &str = r"
if redis.call('LLEN', KEYS[1]) >= tonumber(ARGV[2]) then
    return -1
end
return redis.call('LPUSH', KEYS[1], ARGV[1])
";

/// Local allowance past the server-side `BRPOP` timeout.
const POP_GRACE: Duration = Duration::from_secs(1);

/// Redis counts `BRPOP` timeouts in milliseconds and treats 0 as "forever".
const MIN_BLOCK: Duration = Duration::from_millis(1);

pub struct RedisBuffer {
    client: Client,
    /// Shared connection for pushes.
    conn: MultiplexedConnection,
    /// Connection reserved for `BRPOP`, which blocks whatever connection it
    /// runs on. Waiters queue on the lock in arrival order.
    blocking: Mutex<Option<MultiplexedConnection>>,
    queue: String,
    capacity: usize,
    push: redis::Script,
}

impl RedisBuffer {
    pub async fn connect(url: &str, queue: &str, capacity: usize) -> Result<Self, BufferError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        let blocking = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(Some(blocking)),
            queue: queue.to_string(),
            capacity,
            push: redis::Script::new(PUSH_BOUNDED),
        })
    }

    /// Pop one message, blocking server side until `deadline` at most.
    async fn pop(&self, deadline: Instant) -> Result<Option<Message>, BufferError> {
        let mut slot = self.blocking.lock().await;
        // Taken out for the duration of the call. If this future is dropped
        // mid-pop the connection goes with it, so a late reply is never read
        // by the next waiter.
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => self.client.get_multiplexed_async_connection().await?,
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let payload: Option<String> = if remaining < MIN_BLOCK {
            redis::cmd("RPOP")
                .arg(&self.queue)
                .query_async(&mut conn)
                .await?
        } else {
            let popped: Option<(String, String)> = redis::cmd("BRPOP")
                .arg(&self.queue)
                .arg(remaining.as_secs_f64())
                .query_async(&mut conn)
                .await?;
            popped.map(|(_, payload)| payload)
        };
        *slot = Some(conn);

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str::<Message>(&payload)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MessageBuffer for RedisBuffer {
    async fn put(&self, msg: Message) -> Result<(), BufferError> {
        let payload = serde_json::to_string(&msg)?;
        let mut conn = self.conn.clone();
        let len: i64 = self
            .push
            .key(&self.queue)
            .arg(payload)
            .arg(self.capacity)
            .invoke_async(&mut conn)
            .await?;
        if len < 0 {
            warn!(msg_id = msg.msg_id, queue = %self.queue, "Message queue full, dropping message");
        } else {
            debug!(msg_id = msg.msg_id, len, "Queued message");
        }
        Ok(())
    }

    async fn get(&self, ctx: &ServeContext, timeout: Duration) -> Result<Option<Message>, BufferError> {
        let deadline = Instant::now() + timeout;

        tokio::select! {
            biased;
            cause = ctx.stopped() => Err(BufferError::Stopped(cause)),
            result = self.pop(deadline) => result,
            _ = tokio::time::sleep_until(deadline + POP_GRACE) => {
                warn!(queue = %self.queue, "Redis pop overran its timeout");
                Ok(None)
            }
        }
    }
}
