//! `tags.json` model: the tag table mapping stable tag ids to bit slots.

use serde::{Deserialize, Serialize};
use zmhsearch_core::types::MAX_TAG_BITS;
use zmhsearch_core::{ZmhError, ZmhResult};

/// Schema version written to `tags.json`.
pub const TAGS_VERSION: u32 = 1;

/// One named tag with its assigned bitset slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagEntry {
    /// Stable external tag identifier.
    pub tag_id: u16,
    /// Display name.
    pub name: String,
    /// Document frequency at build time.
    pub count: u32,
    /// Bitset slot (0..49).
    pub bit: u8,
}

/// The whole tag table artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsFile {
    /// Schema version.
    pub version: u32,
    /// Tag entries, sorted for display (count desc, name asc, tagId asc).
    pub tags: Vec<TagEntry>,
}

impl TagsFile {
    /// Parse from JSON bytes and validate bit assignments.
    pub fn parse(bytes: &[u8], name: &str) -> ZmhResult<Self> {
        let file: Self = serde_json::from_slice(bytes)?;
        file.validate(name)?;
        Ok(file)
    }

    /// Every bit must be unique and within the bitset capacity.
    pub fn validate(&self, name: &str) -> ZmhResult<()> {
        let mut seen = [false; MAX_TAG_BITS as usize];
        for tag in &self.tags {
            if tag.bit >= MAX_TAG_BITS {
                return Err(ZmhError::ArtifactCorrupted {
                    name: name.to_owned(),
                    detail: format!("tag {} bit {} out of range", tag.tag_id, tag.bit),
                });
            }
            if std::mem::replace(&mut seen[usize::from(tag.bit)], true) {
                return Err(ZmhError::ArtifactCorrupted {
                    name: name.to_owned(),
                    detail: format!("bit {} assigned twice", tag.bit),
                });
            }
        }
        Ok(())
    }

    /// Look up the bit slot for an external tag id.
    #[must_use]
    pub fn bit_of(&self, tag_id: u16) -> Option<u8> {
        self.tags.iter().find(|t| t.tag_id == tag_id).map(|t| t.bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TagsFile {
        TagsFile {
            version: TAGS_VERSION,
            tags: vec![
                TagEntry {
                    tag_id: 7,
                    name: "恋爱".into(),
                    count: 900,
                    bit: 0,
                },
                TagEntry {
                    tag_id: 3,
                    name: "冒险".into(),
                    count: 500,
                    bit: 1,
                },
            ],
        }
    }

    #[test]
    fn json_shape_is_camel_case() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"tagId\":7"));
        assert!(json.contains("\"bit\":0"));
        let parsed = TagsFile::parse(json.as_bytes(), "tags").unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn validate_rejects_high_bit() {
        let mut file = sample();
        file.tags[0].bit = MAX_TAG_BITS;
        assert!(file.validate("tags").is_err());
    }

    #[test]
    fn validate_rejects_duplicate_bit() {
        let mut file = sample();
        file.tags[1].bit = file.tags[0].bit;
        assert!(file.validate("tags").is_err());
    }

    #[test]
    fn bit_of_resolves_tag_ids() {
        let file = sample();
        assert_eq!(file.bit_of(3), Some(1));
        assert_eq!(file.bit_of(99), None);
    }
}
