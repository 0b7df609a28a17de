//! Runtime query engine for zmh-search.
//!
//! The engine is a single long-lived task fed typed commands over a
//! channel. On startup it fetches the build manifest, loads the tag
//! table, token dictionary, and meta shards, and announces readiness;
//! index shards stay lazy and are paged in per query. Search follows a
//! two-pass pipeline: the posting evaluator produces a candidate set
//! under the per-term coverage threshold, the ranker scores and sorts it,
//! and the paginator slices out the requested page.
//!
//! Searches are latest-wins: a newer search cancels the shard-loading
//! waits of the one in flight, and only the latest completed search emits
//! results.

#![forbid(unsafe_code)]

pub mod cache;
pub mod engine;
pub mod evaluator;
pub mod loader;
pub mod meta_view;
pub mod planner;
pub mod ranker;
pub mod transport;

pub use cache::ByteCache;
pub use engine::{
    run_engine, spawn_engine, ConnectionHint, DocItem, EngineCommand, EngineConfig, EngineEvent,
    EngineHandle, SearchRequest, SearchResults, LOAD_FAILED_PREFIX,
};
pub use loader::{ArtifactFetcher, ShardPager};
pub use meta_view::MetaView;
pub use planner::QueryPlan;
pub use transport::{FileTransport, HttpTransport, Transport};
