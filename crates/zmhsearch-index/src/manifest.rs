//! `manifest.json` model: the build-level index of artifacts.
//!
//! The manifest is the only unhashed file a deployment serves; everything
//! else is content-addressed. `bytes` and `sha256` always describe the
//! uncompressed artifact body, regardless of transport encoding.

use serde::{Deserialize, Serialize};
use zmhsearch_core::{ZmhError, ZmhResult};

/// Manifest schema version.
pub const MANIFEST_VERSION: u32 = 2;

/// One artifact reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    /// Path relative to the manifest's directory.
    pub path: String,
    /// Hex SHA-256 of the uncompressed body.
    pub sha256: String,
    /// Uncompressed byte length.
    pub bytes: u64,
}

/// Corpus statistics recorded at build time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStats {
    /// Stats schema version.
    pub version: u32,
    /// Documents in the corpus.
    pub count: u32,
    /// Distinct tokens in the dictionary.
    pub unique_tokens: u32,
    /// Total posting bytes across all index shards.
    pub index_bytes: u64,
    /// Meta shard width (0 = unsharded).
    pub meta_shard_docs: u32,
    /// Number of meta shards.
    pub meta_shard_count: u32,
    /// Number of index shards.
    pub index_shard_count: u32,
    /// How the index shard count was chosen.
    pub index_shard_mode: String,
}

/// Artifact references grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestAssets {
    /// The tag table.
    pub tags: AssetRef,
    /// The token dictionary.
    pub dict: AssetRef,
    /// Meta shards in doc-id order.
    pub meta_shards: Vec<AssetRef>,
    /// Index shards in shard-id order.
    pub index_shards: Vec<AssetRef>,
}

/// The whole manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest schema version.
    pub version: u32,
    /// Build timestamp (ISO-8601).
    pub generated_at: String,
    /// Corpus statistics.
    pub stats: ManifestStats,
    /// Artifact references.
    pub assets: ManifestAssets,
}

impl Manifest {
    /// Parse from JSON bytes, rejecting unknown versions.
    pub fn parse(bytes: &[u8]) -> ZmhResult<Self> {
        let manifest: Self = serde_json::from_slice(bytes).map_err(|e| {
            ZmhError::ManifestUnavailable {
                reason: format!("malformed JSON: {e}"),
            }
        })?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ZmhError::ManifestUnavailable {
                reason: format!(
                    "unsupported manifest version {} (this build speaks {MANIFEST_VERSION})",
                    manifest.version
                ),
            });
        }
        Ok(manifest)
    }

    /// Every artifact hash in the manifest, for cache pruning.
    pub fn all_hashes(&self) -> impl Iterator<Item = &str> {
        [&self.assets.tags, &self.assets.dict]
            .into_iter()
            .chain(self.assets.meta_shards.iter())
            .chain(self.assets.index_shards.iter())
            .map(|a| a.sha256.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        let asset = |path: &str, sha: &str| AssetRef {
            path: path.to_owned(),
            sha256: sha.to_owned(),
            bytes: 10,
        };
        Manifest {
            version: MANIFEST_VERSION,
            generated_at: "2026-01-31T00:00:00Z".to_owned(),
            stats: ManifestStats {
                version: MANIFEST_VERSION,
                count: 2,
                unique_tokens: 5,
                index_bytes: 12,
                meta_shard_docs: 4096,
                meta_shard_count: 1,
                index_shard_count: 2,
                index_shard_mode: "pow2-1mib".to_owned(),
            },
            assets: ManifestAssets {
                tags: asset("assets/tags.aaa.json", "aa"),
                dict: asset("assets/ngram.dict.bbb.bin", "bb"),
                meta_shards: vec![asset("assets/meta-lite.0.ccc.bin", "cc")],
                index_shards: vec![
                    asset("assets/ngram.index.0.ddd.bin", "dd"),
                    asset("assets/ngram.index.1.eee.bin", "ee"),
                ],
            },
        }
    }

    #[test]
    fn serde_roundtrip_with_camel_case_keys() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(json.contains("\"generatedAt\""));
        assert!(json.contains("\"uniqueTokens\""));
        assert!(json.contains("\"metaShards\""));
        assert!(json.contains("\"indexShardMode\""));
        let parsed = Manifest::parse(json.as_bytes()).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn parse_rejects_future_version() {
        let mut manifest = sample();
        manifest.version = 99;
        let json = serde_json::to_vec(&manifest).unwrap();
        let err = Manifest::parse(&json).unwrap_err();
        assert!(matches!(err, ZmhError::ManifestUnavailable { .. }));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Manifest::parse(b"not json").is_err());
    }

    #[test]
    fn all_hashes_covers_every_asset() {
        let manifest = sample();
        let hashes: Vec<&str> = manifest.all_hashes().collect();
        assert_eq!(hashes, vec!["aa", "bb", "cc", "dd", "ee"]);
    }
}
