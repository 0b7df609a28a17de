//! Ranking and pagination.
//!
//! Relevance = accumulated coverage (from the evaluator) plus full-text
//! bonuses per include term: +1.4 when the normalized title contains the
//! term, +0.6 for the joined aliases, +0.4 for the joined authors. Ties
//! break toward the higher external id (newer publication). The id sorts
//! skip scoring entirely and order candidates by doc-id, which the
//! builder made equivalent to publication order.

use zmhsearch_core::normalize;
use zmhsearch_core::types::SortMode;

use crate::evaluator::Scratch;
use crate::meta_view::MetaView;
use crate::planner::QueryPlan;

const TITLE_BONUS: f32 = 1.4;
const ALIAS_BONUS: f32 = 0.6;
const AUTHOR_BONUS: f32 = 0.4;

/// Order the candidate set according to the plan's sort mode, consuming
/// the coverage scores left in `scratch`.
#[must_use]
pub fn rank(
    plan: &QueryPlan,
    meta: &MetaView,
    scratch: &Scratch,
    mut candidates: Vec<u32>,
) -> Vec<u32> {
    let effective = if plan.include.is_empty() && plan.sort == SortMode::Relevance {
        // Without terms there is nothing to score; newest first.
        SortMode::IdDesc
    } else {
        plan.sort
    };

    match effective {
        SortMode::IdAsc => candidates.sort_unstable(),
        SortMode::IdDesc => candidates.sort_unstable_by(|a, b| b.cmp(a)),
        SortMode::Relevance => {
            let mut scored: Vec<(u32, f32)> = candidates
                .into_iter()
                .map(|doc| (doc, full_score(plan, meta, scratch, doc)))
                .collect();
            scored.sort_unstable_by(|a, b| {
                b.1.total_cmp(&a.1)
                    .then_with(|| meta.external_id(b.0).cmp(&meta.external_id(a.0)))
            });
            return scored.into_iter().map(|(doc, _)| doc).collect();
        }
    }
    candidates
}

fn full_score(plan: &QueryPlan, meta: &MetaView, scratch: &Scratch, doc: u32) -> f32 {
    // `rank` redirects term-less relevance to IdDesc, so there is always
    // at least one include term to score against.
    debug_assert!(!plan.include.is_empty());
    let mut score = scratch.score[doc as usize];
    let title = normalize(meta.title(doc));
    let aliases = normalize(meta.aliases_joined(doc));
    let authors = normalize(meta.authors_joined(doc));
    for term in &plan.include {
        if title.contains(term.as_str()) {
            score += TITLE_BONUS;
        }
        if aliases.contains(term.as_str()) {
            score += ALIAS_BONUS;
        }
        if authors.contains(term.as_str()) {
            score += AUTHOR_BONUS;
        }
    }
    score
}

/// Slice page `page` (1-based) of size `size` out of the resolved
/// sequence. `has_more` is true when later pages exist.
#[must_use]
pub fn page_slice(ids: &[u32], page: u32, size: u32) -> (&[u32], bool) {
    let start = (page.saturating_sub(1) as usize).saturating_mul(size as usize);
    if start >= ids.len() {
        return (&[], false);
    }
    let end = ids.len().min(start + size as usize);
    (&ids[start..end], end < ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_slice_partitions_the_sequence() {
        let ids: Vec<u32> = (0..7).collect();
        let (p1, more1) = page_slice(&ids, 1, 3);
        let (p2, more2) = page_slice(&ids, 2, 3);
        let (p3, more3) = page_slice(&ids, 3, 3);
        assert_eq!(p1, &[0, 1, 2]);
        assert!(more1);
        assert_eq!(p2, &[3, 4, 5]);
        assert!(more2);
        assert_eq!(p3, &[6]);
        assert!(!more3);

        // Concatenation of all pages equals the full vector.
        let mut joined = p1.to_vec();
        joined.extend_from_slice(p2);
        joined.extend_from_slice(p3);
        assert_eq!(joined, ids);
    }

    #[test]
    fn page_slice_past_the_end_is_empty() {
        let ids = [1u32, 2];
        let (slice, more) = page_slice(&ids, 9, 10);
        assert!(slice.is_empty());
        assert!(!more);
    }

    #[test]
    fn page_slice_exact_boundary_has_no_more() {
        let ids = [1u32, 2, 3, 4];
        let (slice, more) = page_slice(&ids, 2, 2);
        assert_eq!(slice, &[3, 4]);
        assert!(!more);
    }
}
