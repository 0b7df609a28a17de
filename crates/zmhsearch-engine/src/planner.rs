//! Query planning: term parsing, filter masks, and the canonical cache
//! key.
//!
//! Syntax: whitespace-split terms; a `-` or `－` (U+FF0D) prefix marks an
//! exclusion. Term bodies are normalized and terms shorter than two chars
//! are discarded. A term in both lists is treated as exclusion only.
//! Both lists are deduplicated and sorted so equivalent queries produce
//! one cache key.

use std::collections::BTreeSet;

use zmhsearch_core::types::{SortMode, StatusFilters, TagMask};
use zmhsearch_core::normalize;

/// Largest accepted page size.
const MAX_PAGE_SIZE: u32 = 100;
/// Page size used when the request leaves it at zero.
const DEFAULT_PAGE_SIZE: u32 = 20;

/// A fully resolved query plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Normalized inclusion terms, sorted and deduplicated.
    pub include: Vec<String>,
    /// Normalized exclusion terms, sorted and deduplicated.
    pub exclude: Vec<String>,
    /// Tags every result must carry.
    pub selected: TagMask,
    /// Tags no result may carry.
    pub excluded: TagMask,
    /// Status bit predicates.
    pub status: StatusFilters,
    /// Result ordering.
    pub sort: SortMode,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub page_size: u32,
}

impl QueryPlan {
    /// Build a plan from raw UI inputs.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        raw_query: &str,
        selected_bits: &[u8],
        excluded_bits: &[u8],
        status: StatusFilters,
        sort: SortMode,
        page: u32,
        page_size: u32,
    ) -> Self {
        let (include, exclude) = parse_terms(raw_query);
        Self {
            include,
            exclude,
            selected: TagMask::from_bits(selected_bits),
            excluded: TagMask::from_bits(excluded_bits),
            status,
            sort,
            page: page.max(1),
            page_size: if page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                page_size.min(MAX_PAGE_SIZE)
            },
        }
    }

    /// Whether any tag or status filter narrows the corpus.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        !self.selected.is_empty() || !self.excluded.is_empty() || !self.status.is_identity()
    }

    /// Whether the query expresses no intent at all (no terms, no
    /// filters): such a query returns empty rather than the whole corpus.
    #[must_use]
    pub fn is_empty_intent(&self) -> bool {
        self.include.is_empty() && !self.has_filters()
    }

    /// Canonical key for the resolved doc-id sequence. Pagination fields
    /// are deliberately absent: pages reuse the cached sequence.
    #[must_use]
    pub fn cache_key(&self) -> String {
        format!(
            "q={}|x={}|t={:08x}.{:08x}|e={:08x}.{:08x}|s={}|o={}",
            self.include.join("\u{1}"),
            self.exclude.join("\u{1}"),
            self.selected.lo,
            self.selected.hi,
            self.excluded.lo,
            self.excluded.hi,
            self.status.key_fragment(),
            self.sort.as_str(),
        )
    }
}

/// Split a raw query into normalized (include, exclude) term lists.
#[must_use]
pub fn parse_terms(raw: &str) -> (Vec<String>, Vec<String>) {
    let mut include = BTreeSet::new();
    let mut exclude = BTreeSet::new();
    for word in raw.split_whitespace() {
        let (negated, body) = match word.strip_prefix('-').or_else(|| word.strip_prefix('－')) {
            Some(rest) => (true, rest),
            None => (false, word),
        };
        let term = normalize(body);
        if term.chars().count() < 2 {
            continue;
        }
        if negated {
            exclude.insert(term);
        } else {
            include.insert(term);
        }
    }
    // Exclusion dominates.
    let include = include.difference(&exclude).cloned().collect();
    (include, exclude.into_iter().collect())
}
