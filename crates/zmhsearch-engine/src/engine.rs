//! The engine task: typed command/event messages, init, and the
//! latest-wins search loop.
//!
//! The engine runs as one cooperative task. Commands arrive over an mpsc
//! channel and are processed in order, except that search is latest-wins:
//! when a newer command arrives while a search is in flight, the current
//! search's shard-loading waits are cancelled and only the newest search
//! runs to completion. Shards the abandoned search already loaded stay
//! resident for the newer plan.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zmhsearch_core::types::{SortMode, StatusFilters};
use zmhsearch_core::{ZmhError, ZmhResult};
use zmhsearch_index::{Manifest, ManifestStats, MetaShard, TagsFile, TokenDict};

use crate::cache::ByteCache;
use crate::evaluator::{self, Scratch};
use crate::loader::{ArtifactFetcher, ShardPager};
use crate::meta_view::MetaView;
use crate::planner::QueryPlan;
use crate::ranker;
use crate::transport::Transport;

/// Prefix of every failure progress message.
pub const LOAD_FAILED_PREFIX: &str = "加载失败: ";

/// Connection quality hint from the embedding runtime; anything below
/// `Normal` suppresses opportunistic preloading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionHint {
    /// Preloading allowed.
    #[default]
    Normal,
    /// Slow link; skip preloading.
    Slow,
    /// User asked to save data; skip preloading.
    DataSaver,
}

/// Engine configuration, constructed by the embedder. No ambient state.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Manifest path relative to the transport root.
    pub manifest_path: String,
    /// Directory for the content-addressed byte cache; `None` disables
    /// local caching.
    pub cache_dir: Option<PathBuf>,
    /// Opportunistically load remaining index shards after ready.
    pub preload_index: bool,
    /// Parallelism of the preload sweep.
    pub preload_concurrency: usize,
    /// Connection quality hint.
    pub connection: ConnectionHint,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            manifest_path: "assets/manifest.json".to_owned(),
            cache_dir: None,
            preload_index: true,
            preload_concurrency: 2,
            connection: ConnectionHint::Normal,
        }
    }
}

/// One search request from the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Correlates the eventual `Results` event with this request.
    pub request_id: u64,
    /// Raw query text.
    pub query: String,
    /// Tag bits every result must carry.
    #[serde(default)]
    pub selected_tags: Vec<u8>,
    /// Tag bits no result may carry.
    #[serde(default)]
    pub excluded_tags: Vec<u8>,
    /// Status bit predicates.
    #[serde(default)]
    pub status: StatusFilters,
    /// Result ordering.
    #[serde(default)]
    pub sort: SortMode,
    /// 1-based page number.
    #[serde(default)]
    pub page: u32,
    /// Page size (0 = default).
    #[serde(default)]
    pub page_size: u32,
}

/// Commands accepted by the engine task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Run (or supersede) a search.
    Search(SearchRequest),
    /// Stop the engine task.
    Shutdown,
}

/// One result row, ready for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocItem {
    /// External publication id.
    pub id: i32,
    /// Title.
    pub title: String,
    /// Cover URL.
    pub cover: String,
    /// Author names.
    pub authors: Vec<String>,
    /// Alternate titles.
    pub aliases: Vec<String>,
    /// Status byte.
    pub flags: u8,
}

/// A completed search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Echo of the request id.
    pub request_id: u64,
    /// Total matches (not corpus size).
    pub total: u32,
    /// 1-based page number served.
    pub page: u32,
    /// Page size served.
    pub page_size: u32,
    /// Whether later pages exist.
    pub has_more: bool,
    /// The page of results.
    pub items: Vec<DocItem>,
}

/// Events emitted by the engine task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Human-readable progress (failures start with
    /// [`LOAD_FAILED_PREFIX`]).
    Progress {
        /// Stage description.
        stage: String,
    },
    /// Init finished; queries will be answered.
    Ready {
        /// Corpus statistics from the manifest.
        stats: ManifestStats,
        /// The tag table, for filter chips.
        tags: TagsFile,
    },
    /// A search completed. Failed searches emit `Progress` instead, so
    /// absence of `Results` for a request id signals failure.
    Results(SearchResults),
}

/// Command-channel handle held by the embedder.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Queue a command; returns `false` when the engine task is gone.
    pub async fn send(&self, command: EngineCommand) -> bool {
        self.tx.send(command).await.is_ok()
    }
}

/// Spawn the engine task on the current runtime.
#[must_use]
pub fn spawn_engine(
    config: EngineConfig,
    transport: Arc<dyn Transport>,
) -> (EngineHandle, mpsc::Receiver<EngineEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (evt_tx, evt_rx) = mpsc::channel(64);
    tokio::spawn(run_engine(config, transport, cmd_rx, evt_tx));
    (EngineHandle { tx: cmd_tx }, evt_rx)
}

/// Everything init produces; owned by the engine task for the session.
struct EngineState {
    stats: ManifestStats,
    tags: TagsFile,
    dict: TokenDict,
    meta: MetaView,
    pager: ShardPager,
    scratch: Scratch,
    result_cache: Option<(String, Vec<u32>)>,
    /// Hashes of every artifact in the current manifest, for pruning.
    keep_hashes: std::collections::HashSet<String>,
}

/// Run the engine until shutdown or channel close. This is the whole
/// lifetime of the search session.
pub async fn run_engine(
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    mut rx: mpsc::Receiver<EngineCommand>,
    tx: mpsc::Sender<EngineEvent>,
) {
    let cache = match &config.cache_dir {
        Some(dir) => match ByteCache::new(dir) {
            Ok(cache) => Some(cache),
            Err(error) => {
                warn!(%error, "cache directory unusable; running uncached");
                None
            }
        },
        None => None,
    };
    let fetcher = ArtifactFetcher::new(transport, cache);

    let mut state = match init(&config, &fetcher, &tx).await {
        Ok(state) => state,
        Err(error) => {
            // Fatal: report once and stay uninitialized.
            let _ = tx
                .send(EngineEvent::Progress {
                    stage: format!("{LOAD_FAILED_PREFIX}{error}"),
                })
                .await;
            return;
        }
    };

    let _ = tx
        .send(EngineEvent::Ready {
            stats: state.stats.clone(),
            tags: state.tags.clone(),
        })
        .await;
    info!(
        docs = state.stats.count,
        tokens = state.stats.unique_tokens,
        index_shards = state.stats.index_shard_count,
        "engine ready"
    );

    after_ready(&config, &fetcher, &state);

    let mut pending: Option<EngineCommand> = None;
    'run: loop {
        let command = match pending.take() {
            Some(c) => c,
            None => match rx.recv().await {
                Some(c) => c,
                None => break,
            },
        };
        let mut request = match command {
            EngineCommand::Shutdown => break,
            EngineCommand::Search(request) => request,
        };

        // Latest-wins: anything already queued supersedes this request.
        loop {
            match rx.try_recv() {
                Ok(EngineCommand::Search(newer)) => request = newer,
                Ok(EngineCommand::Shutdown) => break 'run,
                Err(_) => break,
            }
        }

        let request_id = request.request_id;
        let cancel = CancellationToken::new();
        tokio::select! {
            biased;
            newer = rx.recv() => {
                cancel.cancel();
                debug!(request_id, "search superseded");
                match newer {
                    Some(command) => pending = Some(command),
                    None => break,
                }
            }
            result = search(&mut state, request, cancel.clone(), &tx) => {
                match result {
                    Ok(()) => {}
                    Err(ZmhError::Cancelled { .. }) => {}
                    Err(error) => {
                        warn!(request_id, %error, "search failed");
                        let _ = tx
                            .send(EngineEvent::Progress {
                                stage: format!("{LOAD_FAILED_PREFIX}{error}"),
                            })
                            .await;
                    }
                }
            }
        }
    }
}

async fn init(
    config: &EngineConfig,
    fetcher: &ArtifactFetcher,
    tx: &mpsc::Sender<EngineEvent>,
) -> ZmhResult<EngineState> {
    let progress = |stage: &str| {
        let tx = tx.clone();
        let stage = stage.to_owned();
        async move {
            let _ = tx.send(EngineEvent::Progress { stage }).await;
        }
    };

    progress("正在加载索引清单").await;
    let manifest = fetcher.fetch_manifest(&config.manifest_path).await?;

    progress("正在加载索引数据").await;
    let (tags_bytes, dict_bytes, meta_bytes) = tokio::try_join!(
        fetcher.fetch_asset(&manifest.assets.tags),
        fetcher.fetch_asset(&manifest.assets.dict),
        futures::future::try_join_all(
            manifest
                .assets
                .meta_shards
                .iter()
                .map(|asset| fetcher.fetch_asset(asset)),
        ),
    )?;

    let tags = TagsFile::parse(&tags_bytes, &manifest.assets.tags.path)?;
    let dict = TokenDict::parse(&dict_bytes, &manifest.assets.dict.path)?;
    if let Some(max) = dict.max_shard_id() {
        if u32::from(max) >= manifest.stats.index_shard_count {
            return Err(ZmhError::ArtifactCorrupted {
                name: manifest.assets.dict.path.clone(),
                detail: format!(
                    "dict references shard {max} but the build has {} shards",
                    manifest.stats.index_shard_count
                ),
            });
        }
    }

    let mut shards = Vec::with_capacity(meta_bytes.len());
    for (asset, bytes) in manifest.assets.meta_shards.iter().zip(&meta_bytes) {
        shards.push(MetaShard::parse(bytes, &asset.path)?);
    }
    let meta = MetaView::new(shards, manifest.stats.meta_shard_docs, manifest.stats.count)?;

    let pager = ShardPager::new(fetcher.clone(), manifest.assets.index_shards.clone());
    let scratch = Scratch::new(manifest.stats.count);
    let keep_hashes = manifest.all_hashes().map(str::to_owned).collect();
    let Manifest { stats, .. } = manifest;

    Ok(EngineState {
        stats,
        tags,
        dict,
        meta,
        pager,
        scratch,
        result_cache: None,
        keep_hashes,
    })
}

/// Post-ready housekeeping: cache pruning and gated shard preloading.
/// Both detached; neither affects query correctness.
fn after_ready(config: &EngineConfig, fetcher: &ArtifactFetcher, state: &EngineState) {
    if let Some(cache) = fetcher.cache() {
        let cache = cache.clone();
        let keep = state.keep_hashes.clone();
        tokio::spawn(async move {
            if let Err(error) = cache.prune(&keep).await {
                warn!(%error, "cache prune failed");
            }
        });
    }

    if config.preload_index && config.connection == ConnectionHint::Normal {
        state.pager.spawn_preload(config.preload_concurrency.max(1));
    } else {
        debug!(connection = ?config.connection, "index preload suppressed");
    }
}

async fn search(
    state: &mut EngineState,
    request: SearchRequest,
    cancel: CancellationToken,
    tx: &mpsc::Sender<EngineEvent>,
) -> ZmhResult<()> {
    let plan = QueryPlan::new(
        &request.query,
        &request.selected_tags,
        &request.excluded_tags,
        request.status,
        request.sort,
        request.page,
        request.page_size,
    );

    if plan.is_empty_intent() {
        let _ = tx
            .send(EngineEvent::Results(SearchResults {
                request_id: request.request_id,
                total: 0,
                page: plan.page,
                page_size: plan.page_size,
                has_more: false,
                items: Vec::new(),
            }))
            .await;
        return Ok(());
    }

    let key = plan.cache_key();
    let cache_hit = matches!(&state.result_cache, Some((k, _)) if *k == key);
    if !cache_hit {
        let needed = evaluator::required_shards(&state.dict, &plan);
        state.pager.ensure(&needed, &cancel).await?;
        let mut resident: HashMap<u32, Arc<Vec<u8>>> = HashMap::with_capacity(needed.len());
        for &shard_id in &needed {
            let bytes = state.pager.shard_bytes(shard_id).ok_or_else(|| {
                ZmhError::ArtifactCorrupted {
                    name: format!("ngram.index.{shard_id}"),
                    detail: "shard evicted between load and evaluation".to_owned(),
                }
            })?;
            resident.insert(shard_id, bytes);
        }

        let EngineState {
            dict,
            meta,
            scratch,
            ..
        } = state;
        let candidates = evaluator::evaluate(&plan, dict, &resident, meta, scratch)?;
        let sorted = ranker::rank(&plan, meta, scratch, candidates);
        state.result_cache = Some((key, sorted));
    }

    let (_, ids) = state.result_cache.as_ref().expect("result cache just filled");
    let (slice, has_more) = ranker::page_slice(ids, plan.page, plan.page_size);
    let items: Vec<DocItem> = slice
        .iter()
        .map(|&doc| DocItem {
            id: state.meta.external_id(doc),
            title: state.meta.title(doc).to_owned(),
            cover: state.meta.cover(doc),
            authors: state.meta.authors(doc).into_iter().map(str::to_owned).collect(),
            aliases: state.meta.aliases(doc).into_iter().map(str::to_owned).collect(),
            flags: state.meta.flags(doc),
        })
        .collect();

    let _ = tx
        .send(EngineEvent::Results(SearchResults {
            request_id: request.request_id,
            total: ids.len() as u32,
            page: plan.page,
            page_size: plan.page_size,
            has_more,
            items,
        }))
        .await;
    Ok(())
}
