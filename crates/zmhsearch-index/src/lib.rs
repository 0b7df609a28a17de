//! Binary artifact contract for zmh-search.
//!
//! This crate is the single source of truth for the on-disk layout shared
//! by the offline builder and the runtime engine:
//!
//! - **`meta`**: per-shard packed document metadata (ids, tag bitsets,
//!   status flags, string pools), little-endian with 4-byte-aligned
//!   sections.
//! - **`dict`**: sorted token-key dictionary with per-token shard id,
//!   offset, length, and document frequency.
//! - **`postings`**: delta-coded LEB128 doc-id lists.
//! - **`tags.json` / `manifest.json`**: serde models for the JSON
//!   artifacts.
//! - **shard math**: token-to-shard hashing and meta shard partitioning.

#![forbid(unsafe_code)]

pub mod dict;
pub mod manifest;
pub mod meta;
pub mod postings;
pub mod shard;
pub mod tags;

mod wire;

pub use dict::{DictEntry, TokenDict, DICT_MAGIC, DICT_VERSION};
pub use manifest::{AssetRef, Manifest, ManifestAssets, ManifestStats, MANIFEST_VERSION};
pub use meta::{MetaShard, StringPool, DEFAULT_SEP_CODE, META_MAGIC, META_VERSION};
pub use postings::{decode_postings, encode_postings, PostingsIter};
pub use shard::{
    default_index_shard_count, index_shard_of, meta_shard_count, DEFAULT_META_SHARD_DOCS,
};
pub use tags::{TagEntry, TagsFile, TAGS_VERSION};
