//! Corpus assembly: doc ordering, tag bit assignment, cover-base
//! extraction, and n-gram inversion.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};
use zmhsearch_core::types::MAX_TAG_BITS;
use zmhsearch_core::{ngrams, normalize, token_key, NGRAM_N};
use zmhsearch_index::{TagEntry, TagsFile, TAGS_VERSION};

use crate::source::SourceRow;

/// Tag bit assignment for one build.
#[derive(Debug, Clone)]
pub struct TagAssignment {
    /// The `tags.json` artifact content.
    pub file: TagsFile,
    /// How many tags did not fit in the 50 bit slots.
    pub dropped: usize,
    bit_by_id: HashMap<u16, u8>,
}

impl TagAssignment {
    /// Bit slot for an external tag id, if it was assigned one.
    #[must_use]
    pub fn bit_of(&self, tag_id: u16) -> Option<u8> {
        self.bit_by_id.get(&tag_id).copied()
    }
}

/// Count tag document frequencies and assign bit slots.
///
/// Assignment policy (stable across builds for an unchanged tag set):
/// sort by `count` descending then `tagId` ascending, give the first 50
/// tags bits 0..49, drop the rest with a warning.
#[must_use]
pub fn assign_tags(rows: &[SourceRow]) -> TagAssignment {
    let mut count_by_id: BTreeMap<u16, u32> = BTreeMap::new();
    let mut name_by_id: HashMap<u16, String> = HashMap::new();
    for row in rows {
        for tag in &row.tags {
            *count_by_id.entry(tag.tag_id).or_default() += 1;
            name_by_id
                .entry(tag.tag_id)
                .or_insert_with(|| tag.tag_name.clone());
        }
    }

    let mut ranked: Vec<(u16, u32)> = count_by_id.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let dropped = ranked.len().saturating_sub(usize::from(MAX_TAG_BITS));
    if dropped > 0 {
        warn!(
            dropped,
            capacity = MAX_TAG_BITS,
            "tag set exceeds bitset capacity; least frequent tags dropped"
        );
    }

    let mut bit_by_id = HashMap::new();
    let mut entries = Vec::new();
    for (bit, &(tag_id, count)) in ranked.iter().take(usize::from(MAX_TAG_BITS)).enumerate() {
        let bit = bit as u8;
        bit_by_id.insert(tag_id, bit);
        entries.push(TagEntry {
            tag_id,
            name: name_by_id.remove(&tag_id).unwrap_or_else(|| tag_id.to_string()),
            count,
            bit,
        });
    }

    // Display order: busiest first, names break ties.
    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.name.cmp(&b.name))
            .then(a.tag_id.cmp(&b.tag_id))
    });

    TagAssignment {
        file: TagsFile {
            version: TAGS_VERSION,
            tags: entries,
        },
        dropped,
        bit_by_id,
    }
}

/// Split a cover URL into a shareable base (scheme + host + first path
/// segment) and the per-doc remainder.
///
/// URLs without that structure keep their full text in the path half and
/// use the reserved empty base.
#[must_use]
pub fn split_cover(url: &str) -> (&str, &str) {
    let Some(scheme_end) = url.find("://") else {
        return ("", url);
    };
    let host_start = scheme_end + 3;
    let Some(host_slash) = url[host_start..].find('/') else {
        return ("", url);
    };
    let seg_start = host_start + host_slash + 1;
    let Some(seg_slash) = url[seg_start..].find('/') else {
        return ("", url);
    };
    let base_end = seg_start + seg_slash + 1;
    (&url[..base_end], &url[base_end..])
}

/// The fully assembled corpus, ready for artifact emission. All vectors
/// are parallel and indexed by doc-id.
#[derive(Debug, Default)]
pub struct Corpus {
    /// External ids, ascending (doc-id order == publication order).
    pub ids: Vec<i32>,
    /// Titles.
    pub titles: Vec<String>,
    /// Author lists.
    pub authors: Vec<Vec<String>>,
    /// Alias lists.
    pub aliases: Vec<Vec<String>>,
    /// Raw cover URLs.
    pub covers: Vec<String>,
    /// Tag bits 0..31.
    pub tag_lo: Vec<u32>,
    /// Tag bits 32..49.
    pub tag_hi: Vec<u32>,
    /// Status bytes.
    pub flags: Vec<u8>,
    /// Token key -> ascending doc-id posting list.
    pub postings: BTreeMap<u32, Vec<u32>>,
    /// Tokens that could not be keyed (astral-plane chars).
    pub unkeyable_tokens: usize,
}

impl Corpus {
    /// Documents in the corpus.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.len()
    }
}

/// Order rows by external id and invert their searchable text.
#[must_use]
pub fn collect(mut rows: Vec<SourceRow>, tags: &TagAssignment) -> Corpus {
    rows.sort_by_key(|r| r.id);

    let mut corpus = Corpus::default();
    for (doc_id, row) in rows.into_iter().enumerate() {
        let doc_id = doc_id as u32;

        let mut lo = 0u32;
        let mut hi = 0u32;
        for tag in &row.tags {
            let Some(bit) = tags.bit_of(tag.tag_id) else {
                continue;
            };
            if bit < 32 {
                lo |= 1 << bit;
            } else {
                hi |= 1 << (bit - 32);
            }
        }

        let mut grams = ngrams(&normalize(&row.title), NGRAM_N);
        for alias in &row.aliases {
            grams.extend(ngrams(&normalize(alias), NGRAM_N));
        }
        for author in &row.authors {
            grams.extend(ngrams(&normalize(author), NGRAM_N));
        }
        for gram in &grams {
            match token_key(gram) {
                // Docs are visited in ascending order and each gram is
                // distinct per doc, so every posting list stays sorted.
                Some(key) => corpus.postings.entry(key).or_default().push(doc_id),
                None => corpus.unkeyable_tokens += 1,
            }
        }

        corpus.ids.push(row.id);
        corpus.titles.push(row.title);
        corpus.authors.push(row.authors);
        corpus.aliases.push(row.aliases);
        corpus.covers.push(row.cover);
        corpus.tag_lo.push(lo);
        corpus.tag_hi.push(hi);
        corpus.flags.push(row.flags);
    }

    debug!(
        docs = corpus.count(),
        tokens = corpus.postings.len(),
        unkeyable = corpus.unkeyable_tokens,
        "corpus inverted"
    );
    corpus
}
