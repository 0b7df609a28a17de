//! Cross-codec invariants on the binary artifact contract: alignment,
//! sorted keys, shard bounds, and posting/meta roundtrips over a small
//! synthetic corpus.

use std::collections::BTreeMap;

use zmhsearch_core::{ngrams, normalize, token_key, NGRAM_N};
use zmhsearch_index::{
    decode_postings, encode_postings, index_shard_of, DictEntry, MetaShard, StringPool, TokenDict,
    DEFAULT_SEP_CODE,
};

/// Invert a tiny corpus by hand, the way the builder does.
fn invert(titles: &[&str]) -> BTreeMap<u32, Vec<u32>> {
    let mut postings: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for (doc, title) in titles.iter().enumerate() {
        for gram in ngrams(&normalize(title), NGRAM_N) {
            if let Some(key) = token_key(&gram) {
                postings.entry(key).or_default().push(doc as u32);
            }
        }
    }
    postings
}

#[test]
fn inverted_postings_roundtrip_per_token() {
    let titles = ["阿虚的忧郁", "凉宫春日", "春日部防卫队", "abc abc"];
    let postings = invert(&titles);
    assert!(!postings.is_empty());

    for (&key, doc_ids) in &postings {
        let bytes = encode_postings(key, doc_ids).expect("sorted input");
        let decoded = decode_postings(&bytes).expect("well-formed varints");
        assert_eq!(&decoded, doc_ids, "token {key:#010x}");
        assert!(decoded.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn dict_over_inverted_corpus_has_sorted_keys_and_valid_spans() {
    let titles = ["凉宫春日", "春日部", "long running series"];
    let postings = invert(&titles);

    let shard_count = 4u32;
    let mut shards: Vec<Vec<u8>> = vec![Vec::new(); shard_count as usize];
    let mut entries = Vec::new();
    for (&key, doc_ids) in &postings {
        let shard_id = index_shard_of(key, shard_count);
        let pool = &mut shards[shard_id as usize];
        let bytes = encode_postings(key, doc_ids).unwrap();
        entries.push(DictEntry {
            key,
            shard_id: u8::try_from(shard_id).unwrap(),
            offset: u32::try_from(pool.len()).unwrap(),
            len: u16::try_from(bytes.len()).unwrap(),
            df: u16::try_from(doc_ids.len()).unwrap(),
        });
        pool.extend_from_slice(&bytes);
    }

    let dict_bytes = TokenDict::encode(2, &entries).unwrap();
    let dict = TokenDict::parse(&dict_bytes, "ngram.dict").unwrap();

    // Keys sorted ascending (BTreeMap iteration made the input sorted,
    // parse re-verifies).
    assert!(dict.keys.windows(2).all(|w| w[0] < w[1]));

    // Every span fits its shard, and decoding the span recovers the
    // original posting list.
    for i in 0..dict.len() {
        let shard = &shards[usize::from(dict.shard_ids[i])];
        assert!(u32::from(dict.shard_ids[i]) < shard_count);
        let start = dict.offsets[i] as usize;
        let end = start + usize::from(dict.lengths[i]);
        assert!(end <= shard.len());
        let decoded = decode_postings(&shard[start..end]).unwrap();
        assert_eq!(decoded, postings[&dict.keys[i]]);
        assert_eq!(usize::from(dict.dfs[i]), decoded.len());
    }
}

#[test]
fn meta_shard_partition_roundtrips_doc_ranges() {
    // 10 docs split into shards of width 4: [0..4), [4..8), [8..10).
    let width = 4usize;
    let count = 10usize;
    let all_ids: Vec<i32> = (0..count as i32).map(|i| i * 7 + 1).collect();

    let mut shards = Vec::new();
    for chunk in all_ids.chunks(width) {
        let n = chunk.len();
        let shard = MetaShard {
            sep_code: DEFAULT_SEP_CODE,
            ids: chunk.to_vec(),
            tag_lo: vec![1; n],
            tag_hi: vec![0; n],
            flags: vec![0; n],
            titles: StringPool::from_strings(
                chunk.iter().map(|id| format!("title {id}")).collect::<Vec<_>>(),
            ),
            cover_bases: StringPool::from_strings([""]),
            cover_base_ids: vec![0; n],
            cover_paths: StringPool::from_strings(vec![""; n]),
            authors: StringPool::from_strings(vec![""; n]),
            aliases: StringPool::from_strings(vec![""; n]),
        };
        shards.push(shard.encode().unwrap());
    }
    assert_eq!(shards.len(), 3);

    // Reassemble and verify the partition is contiguous and complete.
    let mut recovered = Vec::new();
    for (i, bytes) in shards.iter().enumerate() {
        let shard = MetaShard::parse(bytes, &format!("meta-lite.{i}")).unwrap();
        let expect = if i < 2 { width } else { count - 2 * width };
        assert_eq!(shard.count(), expect);
        recovered.extend(shard.ids.iter().copied());
    }
    assert_eq!(recovered, all_ids);
}
