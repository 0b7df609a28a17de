//! Offline index builder for zmh-search.
//!
//! Reads a catalog dump (one JSON row per line), inverts the searchable
//! text into bigram posting lists, and writes the content-addressed
//! artifact set the runtime engine consumes: sharded `meta-lite` files,
//! the `ngram.dict` dictionary, `ngram.index` posting shards, `tags.json`,
//! and `manifest.json`.
//!
//! The library surface exists so integration tests (and the engine's test
//! suite) can build a corpus in a temp directory; the `zmh-build` binary
//! is a thin CLI wrapper.

#![forbid(unsafe_code)]

pub mod corpus;
pub mod emit;
pub mod source;

pub use corpus::{assign_tags, split_cover, Corpus, TagAssignment};
pub use emit::{build_from_rows, BuildOptions, BuildSummary};
pub use source::{read_dump, SourceRow, TagRef};

use std::path::Path;

use zmhsearch_core::ZmhResult;

/// Read a dump file and build the full artifact set.
pub fn build_from_dump(dump: &Path, opts: &BuildOptions) -> ZmhResult<BuildSummary> {
    let rows = read_dump(dump)?;
    build_from_rows(rows, opts)
}
