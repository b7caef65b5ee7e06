//! Gateway lifecycle: wiring, startup and shutdown.
//!
//! Startup removes any stale message hook, binds the HTTP and callback
//! sockets, registers the callback with the remote endpoint and starts the
//! background tasks. A logout or listener failure stops the serve context but
//! the HTTP server keeps answering (with 401) until the shutdown signal, after
//! which the hook is removed.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use url::Url;

use crate::buffer::{self, BufferError, MessageBuffer};
use crate::config::{CallbackConfig, CallbackMode, Config};
use crate::context::{ServeContext, StopCause};
use crate::fanout::FanOut;
use crate::listener::{CallbackListener, ListenerError};
use crate::remote::{CallbackTarget, FileStaging, HttpRemote, RemoteEndpoint, RemoteError};
use crate::server::{AppState, build_app};
use crate::session::{SessionController, WatchConfig};
use crate::upload::{self, FileMerger};

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to build remote client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid callback url {url}: {source}")]
    CallbackUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to register message hook: {0}")]
    Hook(#[source] RemoteError),

    #[error("http server failed: {0}")]
    Serve(#[source] io::Error),
}

pub struct Gateway {
    config: Config,
    state: AppState,
}

impl Gateway {
    /// Build the production gateway: HTTP remote client and the configured buffer.
    pub async fn new(config: Config) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.remote.request_timeout())
            .build()?;
        let staging = FileStaging {
            dir: config.upload.temp_dir.clone(),
            remote_prefix: config.remote.file_path_prefix.clone(),
        };
        let remote = Arc::new(HttpRemote::new(
            client,
            config.remote.base_url.clone(),
            staging,
        ));
        let buffer = buffer::from_config(&config.buffer).await?;
        Ok(Self::with_parts(config, remote, buffer))
    }

    /// Build a gateway around an existing remote endpoint and buffer.
    pub fn with_parts(
        config: Config,
        remote: Arc<dyn RemoteEndpoint>,
        buffer: Arc<dyn MessageBuffer>,
    ) -> Self {
        let ctx = ServeContext::new();
        let fanout = match config.fanout.concurrency {
            Some(n) => FanOut::new(n),
            None => FanOut::with_available_parallelism(),
        };
        let merger = Arc::new(FileMerger::new(
            config.upload.chunk_dir(),
            config.upload.temp_dir.clone(),
            Duration::from_secs(config.upload.stale_after_seconds),
        ));

        let state = AppState {
            session: SessionController::new(remote.clone(), ctx),
            remote,
            buffer,
            merger,
            fanout,
            sync_wait: Duration::from_secs(config.buffer.sync_wait_seconds),
            max_chunk_bytes: config.upload.max_chunk_bytes,
            max_body_bytes: config.server.max_body_bytes,
        };
        Self { config, state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn context(&self) -> &ServeContext {
        self.state.session.context()
    }

    pub fn router(&self) -> Router {
        build_app(
            self.state.clone(),
            self.config.server.request_timeout_seconds,
        )
    }

    /// Bind both sockets and register the message hook.
    pub async fn bind(self) -> Result<BoundGateway, GatewayError> {
        let remote = self.state.remote.clone();
        if let Err(e) = remote.unhook_sync_msg().await {
            debug!(error = %e, "No previous message hook removed");
        }

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let http = TcpListener::bind(&addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;

        let listener = CallbackListener::bind(
            &self.config.callback,
            self.state.buffer.clone(),
            self.context().clone(),
        )
        .await?;
        let callback_addr = listener.local_addr().ok();
        let port = callback_addr
            .map(|addr| addr.port())
            .unwrap_or(self.config.callback.port);

        let target = callback_target(&self.config.callback, port)?;
        remote
            .hook_sync_msg(&target)
            .await
            .map_err(GatewayError::Hook)?;
        info!(?target, "Registered message hook");

        Ok(BoundGateway {
            gateway: self,
            http,
            listener,
            callback_addr,
        })
    }

    /// Bind, then serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<StopCause, GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.bind().await?.run(shutdown).await
    }
}

/// A gateway whose sockets are bound and whose hook is registered.
pub struct BoundGateway {
    gateway: Gateway,
    http: TcpListener,
    listener: CallbackListener,
    callback_addr: Option<SocketAddr>,
}

impl BoundGateway {
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn callback_addr(&self) -> Option<SocketAddr> {
        self.callback_addr
    }

    /// Serve until `shutdown` resolves. Returns why serving stopped; a logout
    /// seen before the signal takes precedence over the shutdown itself.
    pub async fn run<F>(self, shutdown: F) -> Result<StopCause, GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let BoundGateway {
            gateway,
            http,
            listener,
            ..
        } = self;
        let state = gateway.state.clone();
        let ctx = state.session.context().clone();

        let listener_task = listener.spawn();
        let watcher = state
            .session
            .spawn_login_watcher(WatchConfig::from(&gateway.config.session));
        let sweeper = upload::spawn_sweeper(
            state.merger.clone(),
            ctx.clone(),
            sweep_interval(Duration::from_secs(gateway.config.upload.stale_after_seconds)),
        );

        if let Ok(addr) = http.local_addr() {
            info!(%addr, "Gateway listening");
        }

        let stop = ctx.clone();
        let served = axum::serve(http, gateway.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown signal received");
                stop.stop(StopCause::Shutdown);
            })
            .await;

        ctx.stop(StopCause::Shutdown);
        if let Err(e) = state.remote.unhook_sync_msg().await {
            warn!(error = %e, "Failed to remove message hook");
        }
        for task in [listener_task, watcher, sweeper] {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        served.map_err(GatewayError::Serve)?;
        let cause = ctx.cause().unwrap_or(StopCause::Shutdown);
        info!(%cause, "Gateway stopped");
        Ok(cause)
    }
}

fn callback_target(config: &CallbackConfig, port: u16) -> Result<CallbackTarget, GatewayError> {
    match config.mode {
        CallbackMode::Tcp => Ok(CallbackTarget::Tcp {
            host: config.advertise_host.clone(),
            port,
        }),
        CallbackMode::Http => {
            let url = format!("http://{}:{}/", config.advertise_host, port);
            let parsed = Url::parse(&url).map_err(|source| GatewayError::CallbackUrl {
                url: url.clone(),
                source,
            })?;
            Ok(CallbackTarget::Http {
                url: parsed,
                timeout: Duration::from_secs(config.hook_timeout_seconds),
            })
        }
    }
}

fn sweep_interval(stale_after: Duration) -> Duration {
    (stale_after / 4).clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL)
}
