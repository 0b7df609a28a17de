//! Posting evaluation: per-term n-gram coverage, multi-term AND, and the
//! exclude mask.
//!
//! For an include term with `k` distinct bigrams, a doc matches when at
//! least `ceil(k * 0.6)` of them (never more than `k`, never fewer than
//! one) hit — the coverage threshold that buys typo tolerance. Terms are
//! evaluated one at a time against reusable scratch counters; counters
//! are reset by walking the touched list, never the whole corpus.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use zmhsearch_core::{ngrams, token_key, ZmhError, ZmhResult, NGRAM_N};
use zmhsearch_index::{PostingsIter, TokenDict};

use crate::meta_view::MetaView;
use crate::planner::QueryPlan;

/// Fraction of a term's distinct bigrams that must hit.
const COVERAGE: f64 = 0.6;

/// Reusable per-query scratch buffers, sized to the corpus.
pub struct Scratch {
    /// Per-doc hit counter for the term currently being evaluated.
    hits: Vec<u16>,
    /// Docs whose counter is nonzero (reset walks only these).
    touched: Vec<u32>,
    /// Per-doc accumulated coverage score for the current query.
    pub score: Vec<f32>,
    /// Exclude-mask bit vector, one bit per doc.
    excluded: Vec<u64>,
}

impl Scratch {
    /// Allocate buffers for a corpus of `count` docs.
    #[must_use]
    pub fn new(count: u32) -> Self {
        let count = count as usize;
        Self {
            hits: vec![0; count],
            touched: Vec::new(),
            score: vec![0.0; count],
            excluded: vec![0; count.div_ceil(64)],
        }
    }

    fn reset_hits(&mut self) {
        for &doc in &self.touched {
            self.hits[doc as usize] = 0;
        }
        self.touched.clear();
    }

    fn clear_exclude_mask(&mut self) {
        self.excluded.fill(0);
    }

    fn mark_excluded(&mut self, doc: u32) {
        self.excluded[(doc / 64) as usize] |= 1 << (doc % 64);
    }

    /// Whether the exclude mask covers this doc.
    #[must_use]
    pub fn is_excluded(&self, doc: u32) -> bool {
        self.excluded[(doc / 64) as usize] & (1 << (doc % 64)) != 0
    }
}

/// One term resolved against the dictionary.
struct ResolvedTerm {
    /// Distinct bigram count (including bigrams absent from the dict).
    k: usize,
    /// Dictionary indices of the found bigrams, df-ascending.
    found: Vec<usize>,
    /// Hits required for a doc to match this term.
    min_hit: u16,
}

fn resolve_term(dict: &TokenDict, term: &str) -> ResolvedTerm {
    let grams: BTreeSet<String> = ngrams(term, NGRAM_N);
    let k = grams.len();
    let mut found: Vec<usize> = grams
        .iter()
        .filter_map(|g| token_key(g))
        .filter_map(|key| dict.lookup(key))
        .collect();
    // Rarest tokens first keeps the counters small early.
    found.sort_by_key(|&i| dict.dfs[i]);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let min_hit = ((k as f64 * COVERAGE).ceil() as usize).max(1).min(k) as u16;
    ResolvedTerm { k, found, min_hit }
}

/// Index shards needed to evaluate every term of a plan.
#[must_use]
pub fn required_shards(dict: &TokenDict, plan: &QueryPlan) -> Vec<u32> {
    let mut shards = BTreeSet::new();
    for term in plan.include.iter().chain(&plan.exclude) {
        for idx in resolve_term(dict, term).found {
            shards.insert(u32::from(dict.shard_ids[idx]));
        }
    }
    shards.into_iter().collect()
}

fn posting_bytes<'a>(
    dict: &TokenDict,
    shards: &'a HashMap<u32, Arc<Vec<u8>>>,
    idx: usize,
) -> ZmhResult<&'a [u8]> {
    let shard_id = u32::from(dict.shard_ids[idx]);
    let shard = shards.get(&shard_id).ok_or_else(|| ZmhError::ArtifactCorrupted {
        name: format!("ngram.index.{shard_id}"),
        detail: "shard not resident at evaluation time".to_owned(),
    })?;
    let start = dict.offsets[idx] as usize;
    let end = start + usize::from(dict.lengths[idx]);
    shard
        .get(start..end)
        .ok_or_else(|| ZmhError::ArtifactCorrupted {
            name: format!("ngram.index.{shard_id}"),
            detail: format!("posting span {start}..{end} exceeds shard size {}", shard.len()),
        })
}

fn passes_filters(plan: &QueryPlan, meta: &MetaView, doc: u32) -> bool {
    let (lo, hi) = meta.tag_bits(doc);
    plan.selected.all_present_in(lo, hi)
        && plan.excluded.none_present_in(lo, hi)
        && plan.status.accepts(meta.flags(doc))
}

/// Build the exclude mask: any doc reaching an exclude term's coverage
/// threshold is marked.
fn build_exclude_mask(
    plan: &QueryPlan,
    dict: &TokenDict,
    shards: &HashMap<u32, Arc<Vec<u8>>>,
    scratch: &mut Scratch,
) -> ZmhResult<()> {
    scratch.clear_exclude_mask();
    for term in &plan.exclude {
        let resolved = resolve_term(dict, term);
        if resolved.found.is_empty() {
            continue;
        }
        scratch.reset_hits();
        for &idx in &resolved.found {
            let mut iter = PostingsIter::new(posting_bytes(dict, shards, idx)?);
            while let Some(doc) = iter.next_doc()? {
                let slot = &mut scratch.hits[doc as usize];
                if *slot == 0 {
                    scratch.touched.push(doc);
                }
                *slot += 1;
            }
        }
        for i in 0..scratch.touched.len() {
            let doc = scratch.touched[i];
            if scratch.hits[doc as usize] >= resolved.min_hit {
                scratch.mark_excluded(doc);
            }
        }
    }
    scratch.reset_hits();
    Ok(())
}

/// Evaluate a plan into its unsorted candidate doc-id set.
///
/// Coverage scores for the candidates are left in `scratch.score`; the
/// ranker reads them for relevance ordering. With no include terms the
/// candidates are every doc passing the filters (minus the exclude
/// mask) — callers gate the no-intent case beforehand.
pub fn evaluate(
    plan: &QueryPlan,
    dict: &TokenDict,
    shards: &HashMap<u32, Arc<Vec<u8>>>,
    meta: &MetaView,
    scratch: &mut Scratch,
) -> ZmhResult<Vec<u32>> {
    build_exclude_mask(plan, dict, shards, scratch)?;

    if plan.include.is_empty() {
        let candidates = (0..meta.count())
            .filter(|&doc| !scratch.is_excluded(doc) && passes_filters(plan, meta, doc))
            .collect();
        return Ok(candidates);
    }

    let mut candidates: Vec<u32> = Vec::new();
    for (term_no, term) in plan.include.iter().enumerate() {
        let resolved = resolve_term(dict, term);
        if resolved.found.is_empty() {
            // No bigram of this term exists in the corpus; the AND of all
            // terms is empty.
            return Ok(Vec::new());
        }

        scratch.reset_hits();
        for &idx in &resolved.found {
            let mut iter = PostingsIter::new(posting_bytes(dict, shards, idx)?);
            while let Some(doc) = iter.next_doc()? {
                if scratch.is_excluded(doc) || !passes_filters(plan, meta, doc) {
                    continue;
                }
                let slot = &mut scratch.hits[doc as usize];
                if *slot == 0 {
                    scratch.touched.push(doc);
                }
                *slot += 1;
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let k = resolved.k as f32;
        if term_no == 0 {
            for i in 0..scratch.touched.len() {
                let doc = scratch.touched[i];
                let hits = scratch.hits[doc as usize];
                if hits >= resolved.min_hit {
                    candidates.push(doc);
                    scratch.score[doc as usize] = f32::from(hits) / k;
                }
            }
        } else {
            let hits = &scratch.hits;
            let score = &mut scratch.score;
            candidates.retain(|&doc| {
                let h = hits[doc as usize];
                if h >= resolved.min_hit {
                    score[doc as usize] += f32::from(h) / k;
                    true
                } else {
                    false
                }
            });
        }
        if candidates.is_empty() {
            break;
        }
    }
    scratch.reset_hits();
    Ok(candidates)
}
