//! Unified read view over the loaded meta shards.
//!
//! Meta shards partition doc-id space in contiguous ranges of a fixed
//! width, so locating a doc is a divide and a remainder. The view owns
//! the decoded shards for the session.

use zmhsearch_core::{ZmhError, ZmhResult};
use zmhsearch_index::MetaShard;

/// All meta shards of a build, addressable by global doc-id.
#[derive(Debug)]
pub struct MetaView {
    shards: Vec<MetaShard>,
    /// Shard width in docs; 0 means a single unsharded file.
    width: u32,
    count: u32,
}

impl MetaView {
    /// Assemble the view, verifying the shard widths form a contiguous
    /// partition of `expected_count` docs.
    pub fn new(shards: Vec<MetaShard>, width: u32, expected_count: u32) -> ZmhResult<Self> {
        let total: usize = shards.iter().map(MetaShard::count).sum();
        if total as u32 != expected_count {
            return Err(ZmhError::ArtifactCorrupted {
                name: "meta-lite".to_owned(),
                detail: format!("shards hold {total} docs, manifest says {expected_count}"),
            });
        }
        if width > 0 {
            if let Some(pos) = shards
                .iter()
                .take(shards.len().saturating_sub(1))
                .position(|s| s.count() as u32 != width)
            {
                return Err(ZmhError::ArtifactCorrupted {
                    name: format!("meta-lite.{pos}"),
                    detail: format!(
                        "non-final shard holds {} docs, expected width {width}",
                        shards[pos].count()
                    ),
                });
            }
        }
        Ok(Self {
            shards,
            width,
            count: expected_count,
        })
    }

    /// Docs in the corpus.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    fn locate(&self, doc: u32) -> (&MetaShard, usize) {
        if self.width == 0 {
            (&self.shards[0], doc as usize)
        } else {
            let shard = (doc / self.width) as usize;
            (&self.shards[shard], (doc % self.width) as usize)
        }
    }

    /// External publication id.
    #[must_use]
    pub fn external_id(&self, doc: u32) -> i32 {
        let (shard, i) = self.locate(doc);
        shard.ids[i]
    }

    /// Tag bitset halves.
    #[must_use]
    pub fn tag_bits(&self, doc: u32) -> (u32, u32) {
        let (shard, i) = self.locate(doc);
        (shard.tag_lo[i], shard.tag_hi[i])
    }

    /// Status byte.
    #[must_use]
    pub fn flags(&self, doc: u32) -> u8 {
        let (shard, i) = self.locate(doc);
        shard.flags[i]
    }

    /// Title.
    #[must_use]
    pub fn title(&self, doc: u32) -> &str {
        let (shard, i) = self.locate(doc);
        shard.titles.get(i)
    }

    /// Cover URL rejoined from base + path.
    #[must_use]
    pub fn cover(&self, doc: u32) -> String {
        let (shard, i) = self.locate(doc);
        shard.cover(i)
    }

    /// Author names.
    #[must_use]
    pub fn authors(&self, doc: u32) -> Vec<&str> {
        let (shard, i) = self.locate(doc);
        shard.authors_of(i)
    }

    /// Alias titles.
    #[must_use]
    pub fn aliases(&self, doc: u32) -> Vec<&str> {
        let (shard, i) = self.locate(doc);
        shard.aliases_of(i)
    }

    /// Pooled (separator-joined) author string, for full-text bonuses.
    #[must_use]
    pub fn authors_joined(&self, doc: u32) -> &str {
        let (shard, i) = self.locate(doc);
        shard.authors.get(i)
    }

    /// Pooled (separator-joined) alias string, for full-text bonuses.
    #[must_use]
    pub fn aliases_joined(&self, doc: u32) -> &str {
        let (shard, i) = self.locate(doc);
        shard.aliases.get(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zmhsearch_index::{StringPool, DEFAULT_SEP_CODE};

    fn shard(ids: &[i32]) -> MetaShard {
        let n = ids.len();
        MetaShard {
            sep_code: DEFAULT_SEP_CODE,
            ids: ids.to_vec(),
            tag_lo: ids.iter().map(|&i| i as u32).collect(),
            tag_hi: vec![0; n],
            flags: vec![0; n],
            titles: StringPool::from_strings(
                ids.iter().map(|i| format!("t{i}")).collect::<Vec<_>>(),
            ),
            cover_bases: StringPool::from_strings([""]),
            cover_base_ids: vec![0; n],
            cover_paths: StringPool::from_strings(vec![""; n]),
            authors: StringPool::from_strings(vec![""; n]),
            aliases: StringPool::from_strings(vec![""; n]),
        }
    }

    #[test]
    fn locates_across_shards() {
        let view = MetaView::new(vec![shard(&[10, 20]), shard(&[30])], 2, 3).unwrap();
        assert_eq!(view.external_id(0), 10);
        assert_eq!(view.external_id(1), 20);
        assert_eq!(view.external_id(2), 30);
        assert_eq!(view.title(2), "t30");
        assert_eq!(view.tag_bits(1), (20, 0));
    }

    #[test]
    fn unsharded_view_uses_width_zero() {
        let view = MetaView::new(vec![shard(&[1, 2, 3])], 0, 3).unwrap();
        assert_eq!(view.external_id(2), 3);
    }

    #[test]
    fn rejects_count_mismatch() {
        let err = MetaView::new(vec![shard(&[1])], 0, 5).unwrap_err();
        assert!(matches!(err, ZmhError::ArtifactCorrupted { .. }));
    }

    #[test]
    fn rejects_short_interior_shard() {
        let err = MetaView::new(vec![shard(&[1]), shard(&[2, 3])], 2, 3).unwrap_err();
        assert!(err.to_string().contains("non-final"));
    }
}
