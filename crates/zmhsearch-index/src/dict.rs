//! `dict` codec: the sorted token dictionary.
//!
//! One dictionary covers every token in the corpus. Layout after the
//! 16-byte header (`'Z','M','H','d'`, version, n, count, reserved):
//! parallel arrays `keys: u32[count]` (sorted strictly ascending),
//! `shardIds: u8[count]` (padded to 4), `offsets: u32[count]`,
//! `lengths: u16[count]` (padded), `dfs: u16[count]` (padded).
//!
//! For the token at index `i`, its posting bytes live at
//! `[offsets[i], offsets[i] + lengths[i])` inside index shard
//! `shardIds[i]`.

use zmhsearch_core::{ZmhError, ZmhResult};

use crate::wire::{pad4, put_u16, put_u32, Reader};

/// Magic bytes of the dictionary artifact.
pub const DICT_MAGIC: [u8; 4] = *b"ZMHd";
/// Current dict schema version (v2 = sharded postings).
pub const DICT_VERSION: u16 = 2;

/// One token's dictionary row, builder-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry {
    /// 32-bit token key.
    pub key: u32,
    /// Index shard holding this token's postings.
    pub shard_id: u8,
    /// Byte offset of the postings within the shard.
    pub offset: u32,
    /// Byte length of the postings.
    pub len: u16,
    /// Document frequency.
    pub df: u16,
}

/// The decoded dictionary with binary-search lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenDict {
    /// N-gram width the index was built with.
    pub n: u16,
    /// Sorted token keys.
    pub keys: Vec<u32>,
    /// Per-token index shard id.
    pub shard_ids: Vec<u8>,
    /// Per-token byte offset within its shard.
    pub offsets: Vec<u32>,
    /// Per-token posting byte length.
    pub lengths: Vec<u16>,
    /// Per-token document frequency.
    pub dfs: Vec<u16>,
}

impl TokenDict {
    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the dictionary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Binary-search a token key; `None` when the corpus never saw it.
    #[must_use]
    pub fn lookup(&self, key: u32) -> Option<usize> {
        self.keys.binary_search(&key).ok()
    }

    /// Highest shard id referenced, or `None` for an empty dictionary.
    #[must_use]
    pub fn max_shard_id(&self) -> Option<u8> {
        self.shard_ids.iter().copied().max()
    }

    /// Pack sorted entries into the on-disk layout.
    ///
    /// `entries` must already be sorted by key; duplicate or unsorted keys
    /// are a build error.
    pub fn encode(n: u16, entries: &[DictEntry]) -> ZmhResult<Vec<u8>> {
        if let Some(pos) = entries.windows(2).position(|w| w[0].key >= w[1].key) {
            return Err(ZmhError::ArtifactCorrupted {
                name: "ngram.dict".to_owned(),
                detail: format!(
                    "keys not strictly ascending at index {} ({:#010x} then {:#010x})",
                    pos + 1,
                    entries[pos].key,
                    entries[pos + 1].key
                ),
            });
        }

        let mut out = Vec::with_capacity(16 + entries.len() * 13);
        out.extend_from_slice(&DICT_MAGIC);
        put_u16(&mut out, DICT_VERSION);
        put_u16(&mut out, n);
        put_u32(&mut out, entries.len() as u32);
        put_u32(&mut out, 0); // reserved

        for e in entries {
            put_u32(&mut out, e.key);
        }
        for e in entries {
            out.push(e.shard_id);
        }
        pad4(&mut out);
        for e in entries {
            put_u32(&mut out, e.offset);
        }
        for e in entries {
            put_u16(&mut out, e.len);
        }
        pad4(&mut out);
        for e in entries {
            put_u16(&mut out, e.df);
        }
        pad4(&mut out);
        Ok(out)
    }

    /// Decode and validate the dictionary.
    pub fn parse(bytes: &[u8], name: &str) -> ZmhResult<Self> {
        let mut r = Reader::new(bytes, name);
        r.expect_magic(&DICT_MAGIC)?;
        let version = r.u16()?;
        if version != DICT_VERSION {
            return Err(ZmhError::VersionMismatch {
                name: name.to_owned(),
                expected: DICT_VERSION,
                found: version,
            });
        }
        let n = r.u16()?;
        let count = r.u32()? as usize;
        let _reserved = r.u32()?;

        let keys = r.u32_vec(count)?;
        let shard_ids = r.u8_vec(count)?;
        r.align4()?;
        let offsets = r.u32_vec(count)?;
        let lengths = r.u16_vec(count)?;
        r.align4()?;
        let dfs = r.u16_vec(count)?;
        r.align4()?;
        r.expect_eof()?;

        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ZmhError::ArtifactCorrupted {
                name: name.to_owned(),
                detail: "token keys are not strictly ascending".to_owned(),
            });
        }
        Ok(Self {
            n,
            keys,
            shard_ids,
            offsets,
            lengths,
            dfs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<DictEntry> {
        vec![
            DictEntry {
                key: 0x0061_0062, // "ab"
                shard_id: 0,
                offset: 0,
                len: 3,
                df: 3,
            },
            DictEntry {
                key: 0x0062_0063, // "bc"
                shard_id: 1,
                offset: 0,
                len: 1,
                df: 1,
            },
            DictEntry {
                key: 0x51C9_5BAB, // "凉宫"
                shard_id: 0,
                offset: 3,
                len: 2,
                df: 2,
            },
        ]
    }

    #[test]
    fn encode_parse_roundtrip() {
        let entries = sample_entries();
        let bytes = TokenDict::encode(2, &entries).unwrap();
        assert_eq!(bytes.len() % 4, 0);

        let dict = TokenDict::parse(&bytes, "ngram.dict").unwrap();
        assert_eq!(dict.n, 2);
        assert_eq!(dict.len(), 3);
        for (i, e) in entries.iter().enumerate() {
            assert_eq!(dict.keys[i], e.key);
            assert_eq!(dict.shard_ids[i], e.shard_id);
            assert_eq!(dict.offsets[i], e.offset);
            assert_eq!(dict.lengths[i], e.len);
            assert_eq!(dict.dfs[i], e.df);
        }
    }

    #[test]
    fn lookup_finds_present_and_rejects_absent() {
        let bytes = TokenDict::encode(2, &sample_entries()).unwrap();
        let dict = TokenDict::parse(&bytes, "ngram.dict").unwrap();
        assert_eq!(dict.lookup(0x0061_0062), Some(0));
        assert_eq!(dict.lookup(0x51C9_5BAB), Some(2));
        assert_eq!(dict.lookup(0x0061_0063), None);
    }

    #[test]
    fn encode_rejects_unsorted_keys() {
        let mut entries = sample_entries();
        entries.swap(0, 2);
        assert!(TokenDict::encode(2, &entries).is_err());
    }

    #[test]
    fn encode_rejects_duplicate_keys() {
        let mut entries = sample_entries();
        entries[1].key = entries[0].key;
        assert!(TokenDict::encode(2, &entries).is_err());
    }

    #[test]
    fn parse_rejects_bad_magic() {
        let mut bytes = TokenDict::encode(2, &sample_entries()).unwrap();
        bytes[3] = b'x';
        assert!(TokenDict::parse(&bytes, "dict").is_err());
    }

    #[test]
    fn parse_rejects_version_drift() {
        let mut bytes = TokenDict::encode(2, &sample_entries()).unwrap();
        bytes[4] = 9;
        let err = TokenDict::parse(&bytes, "dict").unwrap_err();
        assert!(matches!(err, ZmhError::VersionMismatch { found: 9, .. }));
    }

    #[test]
    fn empty_dictionary_roundtrips() {
        let bytes = TokenDict::encode(2, &[]).unwrap();
        let dict = TokenDict::parse(&bytes, "dict").unwrap();
        assert!(dict.is_empty());
        assert_eq!(dict.lookup(1), None);
        assert_eq!(dict.max_shard_id(), None);
    }
}
