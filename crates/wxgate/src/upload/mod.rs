//! Chunked uploads.
//!
//! Clients upload a file in numbered chunks under a key `filename:sha256`.
//! Chunks are staged as separate files and registered with a
//! [`FileMerger`]; once every chunk is in, the merger concatenates them in
//! index order and checks the digest against the key.

mod merger;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::context::ServeContext;

pub use merger::FileMerger;

// ============================================================================
// UploadKey
// ============================================================================

/// Identifies one file being uploaded: its name and the hex SHA-256 of the
/// whole content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadKey {
    file_name: String,
    hash: String,
}

impl UploadKey {
    pub fn new(file_name: impl Into<String>, hash: impl Into<String>) -> Result<Self, MergeError> {
        let file_name = file_name.into();
        let hash = hash.into().trim().to_ascii_lowercase();
        if hash.is_empty() {
            return Err(MergeError::InvalidKey(format!("{}:", file_name)));
        }
        Ok(Self { file_name, hash })
    }

    /// Parse `filename:hash`. The split is on the last `:` so file names
    /// may contain colons.
    pub fn parse(raw: &str) -> Result<Self, MergeError> {
        let (file_name, hash) = raw
            .rsplit_once(':')
            .ok_or_else(|| MergeError::InvalidKey(raw.to_string()))?;
        Self::new(file_name, hash)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Lower-case hex digest.
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for UploadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.hash)
    }
}

impl FromStr for UploadKey {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ============================================================================
// Chunks and results
// ============================================================================

/// A staged chunk file.
#[derive(Debug, Clone)]
pub struct UploadChunk {
    pub index: u32,
    pub path: PathBuf,
}

/// A fully assembled, verified upload.
#[derive(Debug, Clone)]
pub struct MergedFile {
    pub key: UploadKey,
    pub path: PathBuf,
    /// Digest computed while merging.
    pub hash: String,
}

impl MergedFile {
    /// Name of the merged file inside the shared directory.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
    }
}

// ============================================================================
// MergeError
// ============================================================================

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("invalid upload key: {0:?}")]
    InvalidKey(String),

    #[error("no chunks registered for {0}")]
    NotFound(String),

    #[error("upload {key} is missing chunk {index}")]
    MissingChunk { key: String, index: u32 },

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MergeError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ============================================================================
// Sweeper
// ============================================================================

/// Periodically discard chunk sets that stopped receiving chunks. Runs until
/// the serve context stops.
pub fn spawn_sweeper(merger: Arc<FileMerger>, ctx: ServeContext, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = ctx.stopped() => break,
                _ = interval.tick() => {
                    let removed = merger.sweep_stale().await;
                    if removed > 0 {
                        info!(removed, "Discarded stale uploads");
                    } else {
                        debug!("No stale uploads");
                    }
                }
            }
        }
    })
}
