use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{MergeError, MergedFile, UploadChunk, UploadKey};
use crate::sync::KeyedLocks;

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Chunks registered for one key, ordered by index.
#[derive(Debug)]
struct ChunkSet {
    chunks: BTreeMap<u32, PathBuf>,
    touched: Instant,
}

/// Registry of staged chunks and the merge step that assembles them.
///
/// `add` and `merge` for the same key are serialized; different keys proceed
/// in parallel.
pub struct FileMerger {
    chunk_dir: PathBuf,
    output_dir: PathBuf,
    stale_after: Duration,
    sets: DashMap<UploadKey, ChunkSet>,
    locks: KeyedLocks<UploadKey>,
}

impl FileMerger {
    /// `chunk_dir` holds staged chunks; merged files land in `output_dir`.
    pub fn new(chunk_dir: PathBuf, output_dir: PathBuf, stale_after: Duration) -> Self {
        Self {
            chunk_dir,
            output_dir,
            stale_after,
            sets: DashMap::new(),
            locks: KeyedLocks::new(),
        }
    }

    /// Write `bytes` to a fresh chunk file and register it.
    ///
    /// Returns the number of distinct indices registered for `key`.
    pub async fn store_chunk(&self, key: &UploadKey, index: u32, bytes: &[u8]) -> Result<usize, MergeError> {
        fs::create_dir_all(&self.chunk_dir)
            .await
            .map_err(|e| MergeError::io(&self.chunk_dir, e))?;
        let path = self.chunk_dir.join(format!("{}.part", ulid::Ulid::new()));
        fs::write(&path, bytes)
            .await
            .map_err(|e| MergeError::io(&path, e))?;
        self.add(key, UploadChunk { index, path }).await
    }

    /// Register a staged chunk. A repeated index replaces the earlier chunk,
    /// whose file is deleted.
    pub async fn add(&self, key: &UploadKey, chunk: UploadChunk) -> Result<usize, MergeError> {
        let lock = self.locks.get(key);
        let _guard = lock.lock().await;

        let (count, replaced) = {
            let mut set = self.sets.entry(key.clone()).or_insert_with(|| ChunkSet {
                chunks: BTreeMap::new(),
                touched: Instant::now(),
            });
            set.touched = Instant::now();
            let replaced = set.chunks.insert(chunk.index, chunk.path);
            (set.chunks.len(), replaced)
        };

        if let Some(old) = replaced {
            debug!(%key, index = chunk.index, "Replacing re-uploaded chunk");
            remove_quietly(&old).await;
        }
        debug!(%key, index = chunk.index, count, "Registered chunk");
        Ok(count)
    }

    /// Assemble all chunks of `key` in index order and verify the digest.
    ///
    /// The chunk set is consumed whatever the outcome; on failure no output
    /// file is left behind.
    pub async fn merge(&self, key: &UploadKey) -> Result<MergedFile, MergeError> {
        let lock = self.locks.get(key);
        let guard = lock.lock().await;
        let taken = self.sets.remove(key);
        drop(guard);
        drop(lock);
        self.locks.release(key);

        let (_, set) = taken.ok_or_else(|| MergeError::NotFound(key.to_string()))?;
        let chunks: Vec<(u32, PathBuf)> = set.chunks.into_iter().collect();

        let output = self.output_path(key);
        let result = self.assemble(key, &chunks, &output).await;

        for (_, path) in &chunks {
            remove_quietly(path).await;
        }

        match result {
            Ok(hash) => {
                info!(%key, path = %output.display(), chunks = chunks.len(), "Merged upload");
                Ok(MergedFile {
                    key: key.clone(),
                    path: output,
                    hash,
                })
            }
            Err(e) => {
                remove_quietly(&output).await;
                warn!(%key, error = %e, "Upload merge failed");
                Err(e)
            }
        }
    }

    /// Drop chunk sets idle for longer than the configured age. Returns how
    /// many were removed.
    pub async fn sweep_stale(&self) -> usize {
        let stale: Vec<UploadKey> = self
            .sets
            .iter()
            .filter(|entry| entry.touched.elapsed() >= self.stale_after)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in stale {
            let lock = self.locks.get(&key);
            let guard = lock.lock().await;
            // Re-check under the lock; a chunk may have arrived meanwhile.
            let taken = self
                .sets
                .remove_if(&key, |_, set| set.touched.elapsed() >= self.stale_after);
            drop(guard);
            drop(lock);
            self.locks.release(&key);

            if let Some((_, set)) = taken {
                for path in set.chunks.values() {
                    remove_quietly(path).await;
                }
                debug!(%key, "Discarded stale upload");
                removed += 1;
            }
        }
        removed
    }

    /// Number of uploads with registered chunks.
    pub fn pending(&self) -> usize {
        self.sets.len()
    }

    fn output_path(&self, key: &UploadKey) -> PathBuf {
        let mut name = ulid::Ulid::new().to_string().to_lowercase();
        if let Some(ext) = Path::new(key.file_name()).extension().and_then(|e| e.to_str()) {
            name.push('.');
            name.push_str(ext);
        }
        self.output_dir.join(name)
    }

    /// Copy chunks into `output`, hashing on the way. Returns the digest.
    async fn assemble(
        &self,
        key: &UploadKey,
        chunks: &[(u32, PathBuf)],
        output: &Path,
    ) -> Result<String, MergeError> {
        for (expected, (index, _)) in chunks.iter().enumerate() {
            if *index as usize != expected {
                return Err(MergeError::MissingChunk {
                    key: key.to_string(),
                    index: expected as u32,
                });
            }
        }

        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| MergeError::io(&self.output_dir, e))?;
        let mut out = File::create(output)
            .await
            .map_err(|e| MergeError::io(output, e))?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        for (_, path) in chunks {
            let mut chunk = File::open(path).await.map_err(|e| MergeError::io(path, e))?;
            loop {
                let n = chunk.read(&mut buf).await.map_err(|e| MergeError::io(path, e))?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n])
                    .await
                    .map_err(|e| MergeError::io(output, e))?;
            }
        }
        out.flush().await.map_err(|e| MergeError::io(output, e))?;

        let actual = format!("{:x}", hasher.finalize());
        if !actual.eq_ignore_ascii_case(key.hash()) {
            return Err(MergeError::HashMismatch {
                expected: key.hash().to_string(),
                actual,
            });
        }
        Ok(actual)
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove file");
    }
}
