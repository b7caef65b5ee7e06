use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub fanout: FanOutConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Apply command-line / environment overrides on top of the file values.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(port) = overrides.callback_port {
            self.callback.port = port;
        }
        if let Some(url) = overrides.remote_url {
            self.remote.base_url = url;
        }
        if let Some(addr) = overrides.queue_addr {
            self.buffer.redis_url = Some(normalize_redis_url(&addr));
        }
        if let Some(dir) = overrides.temp_dir {
            self.upload.temp_dir = dir;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer.capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer.capacity must be at least 1".to_string(),
            ));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.fanout.concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "fanout.concurrency must be at least 1".to_string(),
            ));
        }
        if self.server.request_timeout_seconds <= self.buffer.sync_wait_seconds {
            return Err(ConfigError::Invalid(format!(
                "server.request_timeout_seconds ({}) must exceed buffer.sync_wait_seconds ({})",
                self.server.request_timeout_seconds, self.buffer.sync_wait_seconds
            )));
        }
        Ok(())
    }
}

/// Values taken from the command line or environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub callback_port: Option<u16>,
    pub remote_url: Option<String>,
    pub queue_addr: Option<String>,
    pub temp_dir: Option<PathBuf>,
}

/// Accept both `host:port` and full `redis://` URLs.
fn normalize_redis_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("redis://{}", addr)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound for a whole API request, long-polls included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Body limit for JSON routes. `send-image` and `send-file` carry the
    /// whole file base64 encoded. Uploads are bounded by
    /// `upload.max_chunk_bytes` instead.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    19089
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

// ============================================================================
// RemoteConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default = "default_remote_timeout")]
    pub request_timeout_seconds: u64,
    /// Where the remote endpoint sees files placed in `upload.temp_dir`.
    #[serde(default = "default_file_path_prefix")]
    pub file_path_prefix: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            request_timeout_seconds: default_remote_timeout(),
            file_path_prefix: default_file_path_prefix(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

fn default_remote_url() -> String {
    "http://127.0.0.1:19088".to_string()
}

fn default_remote_timeout() -> u64 {
    10
}

fn default_file_path_prefix() -> String {
    "C:\\data\\".to_string()
}

// ============================================================================
// CallbackConfig
// ============================================================================

/// How the remote endpoint pushes messages to us.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackMode {
    /// One TCP connection per message, raw JSON body.
    #[default]
    Tcp,
    /// One HTTP POST per message.
    Http,
}

#[derive(Debug, Deserialize)]
pub struct CallbackConfig {
    #[serde(default)]
    pub mode: CallbackMode,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_callback_port")]
    pub port: u16,
    /// Host name the remote endpoint uses to reach this gateway.
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Push timeout handed to the remote endpoint in HTTP mode.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_seconds: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            mode: CallbackMode::default(),
            host: default_host(),
            port: default_callback_port(),
            advertise_host: default_advertise_host(),
            max_message_bytes: default_max_message_bytes(),
            read_timeout_seconds: default_read_timeout(),
            hook_timeout_seconds: default_hook_timeout(),
        }
    }
}

fn default_callback_port() -> u16 {
    9999
}

fn default_advertise_host() -> String {
    "localhost".to_string()
}

fn default_max_message_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_read_timeout() -> u64 {
    10
}

fn default_hook_timeout() -> u64 {
    30
}

// ============================================================================
// SessionConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Deadline for a single login check.
    #[serde(default = "default_check_timeout")]
    pub check_timeout_ms: u64,
    /// Consecutive failed checks tolerated while logged in. `0` disables.
    #[serde(default = "default_unreachable_budget")]
    pub unreachable_budget: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            check_timeout_ms: default_check_timeout(),
            unreachable_budget: default_unreachable_budget(),
        }
    }
}

fn default_poll_interval() -> u64 {
    200
}

fn default_check_timeout() -> u64 {
    2000
}

fn default_unreachable_budget() -> u32 {
    150
}

// ============================================================================
// BufferConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// How long `sync-message` waits for a message before answering empty.
    #[serde(default = "default_sync_wait")]
    pub sync_wait_seconds: u64,
    /// Use a Redis list instead of the in-process queue.
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default = "default_queue")]
    pub queue: String,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            sync_wait_seconds: default_sync_wait(),
            redis_url: None,
            queue: default_queue(),
        }
    }
}

fn default_capacity() -> usize {
    100
}

fn default_sync_wait() -> u64 {
    25
}

fn default_queue() -> String {
    "wechat:message:queue".to_string()
}

// ============================================================================
// UploadConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UploadConfig {
    /// Directory shared with the remote endpoint.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
    /// Unfinished uploads idle for longer than this are discarded.
    #[serde(default = "default_stale_after")]
    pub stale_after_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            max_chunk_bytes: default_max_chunk_bytes(),
            stale_after_seconds: default_stale_after(),
        }
    }
}

impl UploadConfig {
    /// Directory holding chunks that have not been merged yet.
    pub fn chunk_dir(&self) -> PathBuf {
        self.temp_dir.join(".chunks")
    }
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("wxgate")
}

fn default_max_chunk_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_stale_after() -> u64 {
    60 * 60
}

// ============================================================================
// FanOutConfig
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct FanOutConfig {
    /// Concurrent lookups per request. Defaults to the available parallelism.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Tests
// ============================================================================
