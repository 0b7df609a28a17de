//! Artifact loading: fetch, verify, inflate, and the lazy shard pager.
//!
//! Fetch rule for an artifact with manifest hash `H`: try the local
//! content-addressed cache first; on miss fetch over the transport,
//! inflate transparently when the body starts with the gzip magic,
//! verify the SHA-256 against `H`, then hand the bytes back while a
//! detached task writes them into the cache.
//!
//! Index shards load on demand through [`ShardPager`] with per-shard
//! single-flight: concurrent requests for one shard share one pending
//! load. A pending fetch carries the abort token of the search that
//! started it; a cancelled fetch is retried by any still-live waiter.

use std::collections::HashMap;
use std::io::Read;
use std::sync::{Arc, Mutex};

use flate2::read::GzDecoder;
use futures::future::{BoxFuture, FutureExt, Shared};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use zmhsearch_core::{ZmhError, ZmhResult};
use zmhsearch_index::{AssetRef, Manifest};

use crate::cache::ByteCache;
use crate::transport::Transport;

/// Inflate gzip bodies, detected by the 1F 8B 08 magic. Everything else
/// passes through untouched.
pub(crate) fn maybe_inflate(bytes: Vec<u8>) -> ZmhResult<Vec<u8>> {
    if bytes.len() < 3 || bytes[0] != 0x1F || bytes[1] != 0x8B || bytes[2] != 0x08 {
        return Ok(bytes);
    }
    let mut out = Vec::with_capacity(bytes.len() * 3);
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| ZmhError::ArtifactCorrupted {
            name: "gzip body".to_owned(),
            detail: e.to_string(),
        })?;
    Ok(out)
}

/// Cache-aware artifact fetcher shared by init loading and shard paging.
#[derive(Clone)]
pub struct ArtifactFetcher {
    transport: Arc<dyn Transport>,
    cache: Option<ByteCache>,
}

impl ArtifactFetcher {
    /// Bundle a transport with an optional local cache.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, cache: Option<ByteCache>) -> Self {
        Self { transport, cache }
    }

    /// The cache handle, if one is configured.
    #[must_use]
    pub fn cache(&self) -> Option<&ByteCache> {
        self.cache.as_ref()
    }

    /// Fetch and parse the manifest. The manifest is served unhashed, so
    /// it bypasses the cache entirely.
    pub async fn fetch_manifest(&self, path: &str) -> ZmhResult<Manifest> {
        let raw = self
            .transport
            .fetch(path)
            .await
            .map_err(|e| ZmhError::ManifestUnavailable {
                reason: e.to_string(),
            })?;
        Manifest::parse(&maybe_inflate(raw)?)
    }

    /// Fetch one artifact by manifest reference, verifying size and hash
    /// against the uncompressed body.
    pub async fn fetch_asset(&self, asset: &AssetRef) -> ZmhResult<Arc<Vec<u8>>> {
        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.get(&asset.sha256).await {
                trace!(path = %asset.path, "artifact served from cache");
                return Ok(Arc::new(bytes));
            }
        }

        let raw = self.transport.fetch(&asset.path).await?;
        let body = maybe_inflate(raw)?;

        if body.len() as u64 != asset.bytes {
            return Err(ZmhError::ArtifactCorrupted {
                name: asset.path.clone(),
                detail: format!("size mismatch: manifest says {}, got {}", asset.bytes, body.len()),
            });
        }
        let digest = hex::encode(Sha256::digest(&body));
        if digest != asset.sha256 {
            return Err(ZmhError::HashMismatch {
                name: asset.path.clone(),
                expected: asset.sha256.clone(),
                actual: digest,
            });
        }

        let body = Arc::new(body);
        if let Some(cache) = &self.cache {
            cache.put_detached(asset.sha256.clone(), Arc::clone(&body));
        }
        debug!(path = %asset.path, bytes = body.len(), "artifact fetched");
        Ok(body)
    }
}

type SharedLoad = Shared<BoxFuture<'static, Result<Arc<Vec<u8>>, Arc<ZmhError>>>>;

struct PagerInner {
    fetcher: ArtifactFetcher,
    assets: Vec<AssetRef>,
    loaded: Mutex<HashMap<u32, Arc<Vec<u8>>>>,
    inflight: Mutex<HashMap<u32, SharedLoad>>,
}

/// Lazy, single-flight pager over the index shards. Cheap to clone;
/// clones share the resident set and the inflight registry.
#[derive(Clone)]
pub struct ShardPager {
    inner: Arc<PagerInner>,
}

impl ShardPager {
    /// Create a pager over the manifest's index shard list.
    #[must_use]
    pub fn new(fetcher: ArtifactFetcher, assets: Vec<AssetRef>) -> Self {
        Self {
            inner: Arc::new(PagerInner {
                fetcher,
                assets,
                loaded: Mutex::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Total shard count in the build.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        self.inner.assets.len() as u32
    }

    /// Bytes of a shard that has already been paged in.
    #[must_use]
    pub fn shard_bytes(&self, shard_id: u32) -> Option<Arc<Vec<u8>>> {
        self.inner
            .loaded
            .lock()
            .expect("pager lock poisoned")
            .get(&shard_id)
            .cloned()
    }

    /// Wait until every listed shard is resident. Returns early with
    /// `Cancelled` when `cancel` trips.
    pub async fn ensure(&self, shard_ids: &[u32], cancel: &CancellationToken) -> ZmhResult<()> {
        for &shard_id in shard_ids {
            self.ensure_one(shard_id, cancel).await?;
        }
        Ok(())
    }

    async fn ensure_one(&self, shard_id: u32, cancel: &CancellationToken) -> ZmhResult<()> {
        loop {
            if self
                .inner
                .loaded
                .lock()
                .expect("pager lock poisoned")
                .contains_key(&shard_id)
            {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(ZmhError::Cancelled { phase: "shard_load" });
            }

            let load = self.join_or_start_load(shard_id, cancel);
            let result = tokio::select! {
                () = cancel.cancelled() => return Err(ZmhError::Cancelled { phase: "shard_load" }),
                r = load => r,
            };
            match result {
                Ok(_) => return Ok(()),
                // The load we joined was started by an older search whose
                // token tripped. Its inflight entry is gone; start fresh.
                Err(e) if matches!(*e, ZmhError::Cancelled { .. }) => continue,
                Err(e) => {
                    let path = self
                        .inner
                        .assets
                        .get(shard_id as usize)
                        .map_or_else(String::new, |a| a.path.clone());
                    return Err(ZmhError::FetchFailed {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    /// Join the pending load for a shard or start one carrying this
    /// search's abort token.
    fn join_or_start_load(&self, shard_id: u32, cancel: &CancellationToken) -> SharedLoad {
        let mut inflight = self.inner.inflight.lock().expect("pager lock poisoned");
        if let Some(pending) = inflight.get(&shard_id) {
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let token = cancel.clone();
        let load: SharedLoad = async move {
            let Some(asset) = inner.assets.get(shard_id as usize).cloned() else {
                finish_load(&inner, shard_id, None);
                return Err(Arc::new(ZmhError::ArtifactCorrupted {
                    name: "ngram.index".to_owned(),
                    detail: format!("shard id {shard_id} out of range"),
                }));
            };
            let result = tokio::select! {
                () = token.cancelled() => Err(ZmhError::Cancelled { phase: "shard_fetch" }),
                r = inner.fetcher.fetch_asset(&asset) => r,
            };
            match result {
                Ok(bytes) => {
                    finish_load(&inner, shard_id, Some(Arc::clone(&bytes)));
                    Ok(bytes)
                }
                Err(e) => {
                    if !matches!(e, ZmhError::Cancelled { .. }) {
                        warn!(shard_id, error = %e, "index shard load failed");
                    }
                    finish_load(&inner, shard_id, None);
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared();

        inflight.insert(shard_id, load.clone());
        load
    }

    /// Opportunistically page in every remaining shard at bounded
    /// concurrency. Runs detached; failures are per-shard and silent
    /// (the next query will retry on demand).
    pub fn spawn_preload(&self, concurrency: usize) -> tokio::task::JoinHandle<()> {
        let pager = self.clone();
        tokio::spawn(async move {
            let pending: Vec<u32> = {
                let loaded = pager.inner.loaded.lock().expect("pager lock poisoned");
                (0..pager.shard_count())
                    .filter(|id| !loaded.contains_key(id))
                    .collect()
            };
            if pending.is_empty() {
                return;
            }
            debug!(shards = pending.len(), concurrency, "index shard preload started");
            let never = CancellationToken::new();
            futures::stream::iter(pending)
                .for_each_concurrent(concurrency.max(1), |shard_id| {
                    let pager = pager.clone();
                    let never = never.clone();
                    async move {
                        let _ = pager.ensure_one(shard_id, &never).await;
                    }
                })
                .await;
        })
    }
}

/// Move a completed load out of the inflight registry (and into the
/// resident map on success).
fn finish_load(inner: &PagerInner, shard_id: u32, bytes: Option<Arc<Vec<u8>>>) {
    if let Some(bytes) = bytes {
        inner
            .loaded
            .lock()
            .expect("pager lock poisoned")
            .insert(shard_id, bytes);
    }
    inner
        .inflight
        .lock()
        .expect("pager lock poisoned")
        .remove(&shard_id);
}
