//! Receives messages pushed by the remote endpoint and queues them.
//!
//! Two framings are supported, selected by [`CallbackMode`]:
//!
//! - **tcp**: one connection per message; the peer writes a JSON body,
//!   half-closes, and reads back `200 OK`.
//! - **http**: one `POST` per message on any path, answered with
//!   `{"code":0,"msg":"success"}`.
//!
//! Either way the listener runs until the serve context stops. Dropped
//! connections and descriptor or buffer exhaustion are retried with backoff.
//! An unusable listening socket stops the context, since the gateway cannot
//! deliver messages without it.

mod http;
mod tcp;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::info;

use crate::buffer::MessageBuffer;
use crate::config::{CallbackConfig, CallbackMode};
use crate::context::ServeContext;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind callback listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Per-push limits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub max_message_bytes: usize,
    pub read_timeout: Duration,
}

pub struct CallbackListener {
    listener: TcpListener,
    mode: CallbackMode,
    limits: Limits,
    buffer: Arc<dyn MessageBuffer>,
    ctx: ServeContext,
}

impl CallbackListener {
    /// Bind the listening socket. Failing here fails gateway startup.
    pub async fn bind(
        config: &CallbackConfig,
        buffer: Arc<dyn MessageBuffer>,
        ctx: ServeContext,
    ) -> Result<Self, ListenerError> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            mode: config.mode,
            limits: Limits {
                max_message_bytes: config.max_message_bytes,
                read_timeout: Duration::from_secs(config.read_timeout_seconds),
            },
            buffer,
            ctx,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn mode(&self) -> CallbackMode {
        self.mode
    }

    /// Accept pushes until the serve context stops.
    pub async fn serve(self) {
        let addr = self.local_addr().ok();
        info!(?addr, mode = ?self.mode, "Callback listener started");
        match self.mode {
            CallbackMode::Tcp => tcp::serve(self.listener, self.buffer, self.ctx, self.limits).await,
            CallbackMode::Http => http::serve(self.listener, self.buffer, self.ctx, self.limits).await,
        }
        info!(?addr, "Callback listener stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.serve())
    }
}
