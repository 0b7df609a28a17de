//! `meta` shard codec: packed document metadata.
//!
//! Each meta shard covers a contiguous doc-id range and packs parallel
//! arrays plus string pools behind a 16-byte header:
//!
//! ```text
//! magic   'Z','M','H','m'
//! version u16   (= META_VERSION)
//! sepCode u16   (list separator, default 0x001F)
//! count   u32   (docs in this shard)
//! baseCnt u32   (distinct cover bases in this shard)
//! ```
//!
//! Body sections, each zero-padded to a 4-byte boundary:
//! external ids (`i32[count]`), tag bitsets (`u32[count]` lo + `u32[count]`
//! hi), status flags (`u8[count]`), then string pools for titles, cover
//! bases, cover base-ids (`u8` or `u16` per doc depending on `baseCnt`),
//! cover paths, pooled authors, and pooled aliases.
//!
//! Authors and aliases are joined with the separator code point so each doc
//! stays one pool entry; base-id 0 is reserved for "no cover base".

use zmhsearch_core::types::LIST_SEP;
use zmhsearch_core::{ZmhError, ZmhResult};

use crate::wire::{pad4, put_i32, put_u16, put_u32, Reader};

/// Magic bytes of a meta shard.
pub const META_MAGIC: [u8; 4] = *b"ZMHm";
/// Current meta schema version (v2 = sharded layout with cover bases).
pub const META_VERSION: u16 = 2;
/// Default list separator code unit (U+001F).
pub const DEFAULT_SEP_CODE: u16 = 0x001F;

/// A string pool: `count + 1` offsets into one concatenated UTF-8 buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringPool {
    offsets: Vec<u32>,
    pool: String,
}

impl StringPool {
    /// Build a pool from owned or borrowed strings.
    pub fn from_strings<I, S>(strings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut offsets = vec![0u32];
        let mut pool = String::new();
        for s in strings {
            pool.push_str(s.as_ref());
            offsets.push(pool.len() as u32);
        }
        Self { offsets, pool }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Whether the pool holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry `i`, or `""` when out of range.
    #[must_use]
    pub fn get(&self, i: usize) -> &str {
        let (Some(&start), Some(&end)) = (self.offsets.get(i), self.offsets.get(i + 1)) else {
            return "";
        };
        &self.pool[start as usize..end as usize]
    }

    fn encode(&self, out: &mut Vec<u8>) {
        for &off in &self.offsets {
            put_u32(out, off);
        }
        out.extend_from_slice(self.pool.as_bytes());
        pad4(out);
    }

    fn parse(r: &mut Reader<'_>, count: usize) -> ZmhResult<Self> {
        let offsets = r.u32_vec(count + 1)?;
        if offsets[0] != 0 {
            return Err(r.error("string pool must start at offset 0"));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(r.error("string pool offsets are not monotone"));
        }
        let pool_len = *offsets.last().expect("count + 1 offsets") as usize;
        let bytes = r.take(pool_len)?;
        let pool = std::str::from_utf8(bytes)
            .map_err(|e| r.error(format!("string pool is not UTF-8: {e}")))?
            .to_owned();
        r.align4()?;
        Ok(Self { offsets, pool })
    }
}

/// One decoded meta shard.
///
/// Holds parallel per-doc arrays indexed by shard-local doc offset. The
/// builder constructs this directly and calls [`MetaShard::encode`]; the
/// engine gets one via [`MetaShard::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaShard {
    /// List separator code unit recorded in the header.
    pub sep_code: u16,
    /// External publication ids.
    pub ids: Vec<i32>,
    /// Tag bitset bits 0..31.
    pub tag_lo: Vec<u32>,
    /// Tag bitset bits 32..49.
    pub tag_hi: Vec<u32>,
    /// Status flag bytes.
    pub flags: Vec<u8>,
    /// Document titles.
    pub titles: StringPool,
    /// Distinct cover URL prefixes; entry 0 is always the empty base.
    pub cover_bases: StringPool,
    /// Per-doc index into `cover_bases`.
    pub cover_base_ids: Vec<u16>,
    /// Per-doc cover URL suffix.
    pub cover_paths: StringPool,
    /// Authors per doc, joined with the separator.
    pub authors: StringPool,
    /// Aliases per doc, joined with the separator.
    pub aliases: StringPool,
}

impl MetaShard {
    /// Docs in this shard.
    #[must_use]
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Separator as a char (falls back to U+001F on an invalid code unit).
    #[must_use]
    pub fn sep(&self) -> char {
        char::from_u32(u32::from(self.sep_code)).unwrap_or(LIST_SEP)
    }

    /// Re-join a doc's cover URL from base + path.
    #[must_use]
    pub fn cover(&self, i: usize) -> String {
        let base = self.cover_bases.get(usize::from(self.cover_base_ids[i]));
        let path = self.cover_paths.get(i);
        format!("{base}{path}")
    }

    /// A doc's authors, split back out of the pool.
    #[must_use]
    pub fn authors_of(&self, i: usize) -> Vec<&str> {
        split_pooled(self.authors.get(i), self.sep())
    }

    /// A doc's aliases, split back out of the pool.
    #[must_use]
    pub fn aliases_of(&self, i: usize) -> Vec<&str> {
        split_pooled(self.aliases.get(i), self.sep())
    }

    /// Pack into the on-disk layout.
    pub fn encode(&self) -> ZmhResult<Vec<u8>> {
        let count = self.count();
        let parallel = [
            self.tag_lo.len(),
            self.tag_hi.len(),
            self.flags.len(),
            self.titles.len(),
            self.cover_base_ids.len(),
            self.cover_paths.len(),
            self.authors.len(),
            self.aliases.len(),
        ];
        if parallel.iter().any(|&len| len != count) {
            return Err(ZmhError::ArtifactCorrupted {
                name: "meta".to_owned(),
                detail: "parallel sections disagree on doc count".to_owned(),
            });
        }
        let base_cnt = self.cover_bases.len();
        if let Some(&bad) = self
            .cover_base_ids
            .iter()
            .find(|&&id| usize::from(id) >= base_cnt)
        {
            return Err(ZmhError::ArtifactCorrupted {
                name: "meta".to_owned(),
                detail: format!("cover base id {bad} out of range ({base_cnt} bases)"),
            });
        }

        let mut out = Vec::new();
        out.extend_from_slice(&META_MAGIC);
        put_u16(&mut out, META_VERSION);
        put_u16(&mut out, self.sep_code);
        put_u32(&mut out, count as u32);
        put_u32(&mut out, base_cnt as u32);

        for &id in &self.ids {
            put_i32(&mut out, id);
        }
        for &lo in &self.tag_lo {
            put_u32(&mut out, lo);
        }
        for &hi in &self.tag_hi {
            put_u32(&mut out, hi);
        }
        out.extend_from_slice(&self.flags);
        pad4(&mut out);

        self.titles.encode(&mut out);
        self.cover_bases.encode(&mut out);

        if base_cnt <= 255 {
            // Range-checked above, so the narrowing cast is lossless.
            #[allow(clippy::cast_possible_truncation)]
            for &id in &self.cover_base_ids {
                out.push(id as u8);
            }
        } else {
            for &id in &self.cover_base_ids {
                put_u16(&mut out, id);
            }
        }
        pad4(&mut out);

        self.cover_paths.encode(&mut out);
        self.authors.encode(&mut out);
        self.aliases.encode(&mut out);
        Ok(out)
    }

    /// Decode one meta shard, validating magic, version, and section
    /// bounds. `name` labels errors (e.g. the manifest path).
    pub fn parse(bytes: &[u8], name: &str) -> ZmhResult<Self> {
        let mut r = Reader::new(bytes, name);
        r.expect_magic(&META_MAGIC)?;
        let version = r.u16()?;
        if version != META_VERSION {
            return Err(ZmhError::VersionMismatch {
                name: name.to_owned(),
                expected: META_VERSION,
                found: version,
            });
        }
        let sep_code = r.u16()?;
        let count = r.u32()? as usize;
        let base_cnt = r.u32()? as usize;

        let ids = r.i32_vec(count)?;
        let tag_lo = r.u32_vec(count)?;
        let tag_hi = r.u32_vec(count)?;
        let flags = r.u8_vec(count)?;
        r.align4()?;

        let titles = StringPool::parse(&mut r, count)?;
        let cover_bases = StringPool::parse(&mut r, base_cnt)?;

        let cover_base_ids = if base_cnt <= 255 {
            r.u8_vec(count)?.into_iter().map(u16::from).collect()
        } else {
            r.u16_vec(count)?
        };
        r.align4()?;

        let cover_paths = StringPool::parse(&mut r, count)?;
        let authors = StringPool::parse(&mut r, count)?;
        let aliases = StringPool::parse(&mut r, count)?;
        r.expect_eof()?;

        let shard = Self {
            sep_code,
            ids,
            tag_lo,
            tag_hi,
            flags,
            titles,
            cover_bases,
            cover_base_ids,
            cover_paths,
            authors,
            aliases,
        };
        if let Some(&bad) = shard
            .cover_base_ids
            .iter()
            .find(|&&id| usize::from(id) >= base_cnt)
        {
            return Err(ZmhError::ArtifactCorrupted {
                name: name.to_owned(),
                detail: format!("cover base id {bad} out of range ({base_cnt} bases)"),
            });
        }
        Ok(shard)
    }
}

fn split_pooled(joined: &str, sep: char) -> Vec<&str> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(sep).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_shard() -> MetaShard {
        let sep = char::from_u32(u32::from(DEFAULT_SEP_CODE)).unwrap();
        MetaShard {
            sep_code: DEFAULT_SEP_CODE,
            ids: vec![11, 42, 900],
            tag_lo: vec![0b101, 0, 1 << 31],
            tag_hi: vec![0, 1 << 17, 3],
            flags: vec![0, 0b1010, 0b0001],
            titles: StringPool::from_strings(["凉宫春日", "Second Title", ""]),
            cover_bases: StringPool::from_strings(["", "https://img.example.com/webpic/"]),
            cover_base_ids: vec![1, 1, 0],
            cover_paths: StringPool::from_strings(["a/1.jpg", "b/2.jpg", ""]),
            authors: StringPool::from_strings([
                format!("谷川流{sep}いとうのいぢ"),
                "Solo Author".to_owned(),
                String::new(),
            ]),
            aliases: StringPool::from_strings([
                String::new(),
                format!("alias one{sep}alias two"),
                String::new(),
            ]),
        }
    }

    #[test]
    fn string_pool_roundtrip_via_get() {
        let pool = StringPool::from_strings(["", "abc", "凉宫"]);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get(0), "");
        assert_eq!(pool.get(1), "abc");
        assert_eq!(pool.get(2), "凉宫");
        assert_eq!(pool.get(3), "");
    }

    #[test]
    fn encode_parse_roundtrip() {
        let shard = sample_shard();
        let bytes = shard.encode().unwrap();
        let parsed = MetaShard::parse(&bytes, "meta-lite.0").unwrap();
        assert_eq!(parsed, shard);
    }

    #[test]
    fn sections_are_aligned() {
        let bytes = sample_shard().encode().unwrap();
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn cover_rejoins_base_and_path() {
        let shard = sample_shard();
        assert_eq!(shard.cover(0), "https://img.example.com/webpic/a/1.jpg");
        assert_eq!(shard.cover(2), "");
    }

    #[test]
    fn authors_and_aliases_split() {
        let shard = sample_shard();
        assert_eq!(shard.authors_of(0), vec!["谷川流", "いとうのいぢ"]);
        assert_eq!(shard.authors_of(1), vec!["Solo Author"]);
        assert!(shard.authors_of(2).is_empty());
        assert_eq!(shard.aliases_of(1), vec!["alias one", "alias two"]);
        assert!(shard.aliases_of(0).is_empty());
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut bytes = sample_shard().encode().unwrap();
        bytes[0] = b'X';
        let err = MetaShard::parse(&bytes, "meta").unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let mut bytes = sample_shard().encode().unwrap();
        bytes[4] = 0x63; // version -> 0x0063
        let err = MetaShard::parse(&bytes, "meta").unwrap_err();
        assert!(matches!(err, ZmhError::VersionMismatch { found: 0x63, .. }));
    }

    #[test]
    fn parse_rejects_truncation() {
        let bytes = sample_shard().encode().unwrap();
        let err = MetaShard::parse(&bytes[..bytes.len() - 5], "meta").unwrap_err();
        assert!(matches!(err, ZmhError::ArtifactCorrupted { .. }));
    }

    #[test]
    fn parse_rejects_trailing_garbage() {
        let mut bytes = sample_shard().encode().unwrap();
        bytes.extend_from_slice(&[0, 1, 2, 3]);
        let err = MetaShard::parse(&bytes, "meta").unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn encode_rejects_mismatched_sections() {
        let mut shard = sample_shard();
        shard.flags.pop();
        assert!(shard.encode().is_err());
    }

    #[test]
    fn wide_base_ids_use_u16() {
        // 300 distinct bases forces the u16 base-id encoding.
        let count = 300usize;
        let bases: Vec<String> = std::iter::once(String::new())
            .chain((1..count).map(|i| format!("https://cdn{i}.example.com/")))
            .collect();
        let shard = MetaShard {
            sep_code: DEFAULT_SEP_CODE,
            ids: (0..count as i32).collect(),
            tag_lo: vec![0; count],
            tag_hi: vec![0; count],
            flags: vec![0; count],
            titles: StringPool::from_strings(vec!["t"; count]),
            cover_bases: StringPool::from_strings(&bases),
            cover_base_ids: (0..count as u16).collect(),
            cover_paths: StringPool::from_strings(vec!["p"; count]),
            authors: StringPool::from_strings(vec![""; count]),
            aliases: StringPool::from_strings(vec![""; count]),
        };
        let bytes = shard.encode().unwrap();
        let parsed = MetaShard::parse(&bytes, "meta").unwrap();
        assert_eq!(parsed.cover_base_ids, shard.cover_base_ids);
        assert_eq!(parsed.cover(299), "https://cdn299.example.com/p");
    }
}
