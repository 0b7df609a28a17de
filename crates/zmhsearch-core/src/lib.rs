//! Core types shared by the zmh-search builder and runtime engine.
//!
//! This crate defines text canonicalization and n-gram token keys
//! ([`text`]), the tag/status filter model and sort modes ([`types`]),
//! and the unified error type ([`ZmhError`]) used across the workspace.
//!
//! It has minimal external dependencies and is intended to be depended on
//! by every other crate in the workspace.

#![forbid(unsafe_code)]

pub mod error;
pub mod text;
pub mod types;

pub use error::{ZmhError, ZmhResult};
pub use text::{ngrams, normalize, token_key, NGRAM_N};
pub use types::{
    flag_bits, SortMode, StatusFilters, TagMask, Tri, LIST_SEP, MAX_TAG_BITS,
};
