//! Content-addressed local cache of artifact bytes.
//!
//! One file per artifact, named by the hex SHA-256 of its uncompressed
//! body. Writes go through a temp file and rename so readers never see a
//! partial body, and are fire-and-forget: a failed write is logged and
//! the next request simply re-fetches. Pruning removes every key the
//! current manifest no longer references.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

/// Directory-backed content-addressed byte store.
#[derive(Debug, Clone)]
pub struct ByteCache {
    root: PathBuf,
}

impl ByteCache {
    /// Open (and create) the cache directory.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, sha256: &str) -> PathBuf {
        self.root.join(sha256)
    }

    /// Look up bytes by content hash.
    pub async fn get(&self, sha256: &str) -> Option<Vec<u8>> {
        tokio::fs::read(self.entry_path(sha256)).await.ok()
    }

    /// Store bytes under their hash, detached from the caller.
    ///
    /// A failed write must never fail the fetch that produced the bytes,
    /// so the write happens on a spawned task and only logs.
    pub fn put_detached(&self, sha256: String, bytes: Arc<Vec<u8>>) {
        let final_path = self.entry_path(&sha256);
        let tmp_path = self.root.join(format!("{sha256}.tmp"));
        tokio::spawn(async move {
            let result = async {
                tokio::fs::write(&tmp_path, bytes.as_slice()).await?;
                tokio::fs::rename(&tmp_path, &final_path).await
            }
            .await;
            if let Err(error) = result {
                warn!(%sha256, %error, "cache write failed; entry will be re-fetched");
            }
        });
    }

    /// Delete every entry whose hash is not in `keep`. Best-effort: the
    /// first I/O error aborts the sweep without affecting correctness.
    pub async fn prune(&self, keep: &HashSet<String>) -> std::io::Result<usize> {
        let mut removed = 0usize;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep.contains(&name) {
                continue;
            }
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
        if removed > 0 {
            debug!(removed, "cache pruned");
        }
        Ok(removed)
    }
}
