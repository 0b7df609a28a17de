//! Artifact emission: index sharding, meta sharding, content hashing,
//! manifest assembly, and the clean pass.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;
use zmhsearch_core::{ZmhError, ZmhResult};
use zmhsearch_index::{
    default_index_shard_count, encode_postings, index_shard_of, meta_shard_count, AssetRef,
    DictEntry, Manifest, ManifestAssets, ManifestStats, MetaShard, StringPool, TokenDict,
    DEFAULT_META_SHARD_DOCS, DEFAULT_SEP_CODE, MANIFEST_VERSION,
};

use crate::corpus::{assign_tags, collect, split_cover, Corpus};
use crate::source::SourceRow;

/// File-name prefixes the clean pass recognizes as ours.
const GENERATED_PREFIXES: [&str; 4] = ["meta-lite.", "ngram.dict.", "ngram.index.", "tags."];

/// Build configuration, CLI-shaped.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Output directory for artifacts and `manifest.json`.
    pub out_dir: PathBuf,
    /// Timestamp written to the manifest.
    pub generated_at: String,
    /// Purge stale generated files after writing.
    pub clean: bool,
    /// Meta shard width; `Some(0)` disables meta sharding, `None` uses
    /// the default width.
    pub meta_shard_docs: Option<u32>,
    /// Index shard count; `Some(0)` disables index sharding, `None`
    /// derives the count from total posting bytes.
    pub index_shard_count: Option<u32>,
}

impl BuildOptions {
    /// Options with defaults for the given output directory.
    #[must_use]
    pub fn new(out_dir: impl Into<PathBuf>, generated_at: impl Into<String>) -> Self {
        Self {
            out_dir: out_dir.into(),
            generated_at: generated_at.into(),
            clean: false,
            meta_shard_docs: None,
            index_shard_count: None,
        }
    }
}

/// What a build produced.
#[derive(Debug)]
pub struct BuildSummary {
    /// The manifest as written.
    pub manifest: Manifest,
    /// File names written into the output directory (manifest last).
    pub files: Vec<String>,
    /// Tags dropped for lack of bit slots.
    pub dropped_tags: usize,
    /// Tokens skipped because they cannot be keyed.
    pub unkeyable_tokens: usize,
}

/// Encoded posting pools per index shard plus the dictionary rows.
struct IndexAssembly {
    shards: Vec<Vec<u8>>,
    entries: Vec<DictEntry>,
    total_bytes: u64,
    mode: String,
}

fn assemble_index(corpus: &Corpus, requested: Option<u32>) -> ZmhResult<IndexAssembly> {
    // Encode every list once to learn the total size the default shard
    // policy needs.
    let mut encoded = Vec::with_capacity(corpus.postings.len());
    let mut total_bytes = 0u64;
    for (&key, doc_ids) in &corpus.postings {
        let bytes = encode_postings(key, doc_ids)?;
        if bytes.len() > usize::from(u16::MAX) {
            return Err(ZmhError::PostingOverflow {
                token_key: key,
                bytes: bytes.len(),
            });
        }
        if doc_ids.len() > usize::from(u16::MAX) {
            return Err(ZmhError::DfOverflow {
                token_key: key,
                df: doc_ids.len(),
            });
        }
        total_bytes += bytes.len() as u64;
        encoded.push((key, bytes, doc_ids.len()));
    }

    let (shard_count, mode) = match requested {
        Some(0) => (1, "single"),
        Some(k) => (k, "fixed"),
        None => (
            default_index_shard_count(usize::try_from(total_bytes).unwrap_or(usize::MAX)),
            "pow2-1mib",
        ),
    };
    if shard_count == 0 || shard_count > 256 {
        return Err(ZmhError::InvalidConfig {
            field: "index_shard_count".to_owned(),
            value: shard_count.to_string(),
            reason: "must be 1..=256 (shard ids are u8)".to_owned(),
        });
    }

    let mut shards: Vec<Vec<u8>> = vec![Vec::new(); shard_count as usize];
    let mut entries = Vec::with_capacity(encoded.len());
    for (key, bytes, df) in encoded {
        let shard_id = index_shard_of(key, shard_count);
        let pool = &mut shards[shard_id as usize];
        entries.push(DictEntry {
            key,
            shard_id: u8::try_from(shard_id).expect("shard count capped at 256"),
            offset: u32::try_from(pool.len()).map_err(|_| ZmhError::ArtifactCorrupted {
                name: format!("ngram.index.{shard_id}"),
                detail: "shard exceeds u32 offsets".to_owned(),
            })?,
            len: bytes.len() as u16,
            df: df as u16,
        });
        pool.extend_from_slice(&bytes);
    }

    Ok(IndexAssembly {
        shards,
        entries,
        total_bytes,
        mode: mode.to_owned(),
    })
}

/// Pack one contiguous doc-id range into a meta shard, deduplicating
/// cover bases within the range. Base-id 0 is the reserved empty base.
fn pack_meta_range(corpus: &Corpus, range: std::ops::Range<usize>) -> ZmhResult<Vec<u8>> {
    let sep = char::from_u32(u32::from(DEFAULT_SEP_CODE)).unwrap_or('\u{1F}');

    let mut bases: Vec<&str> = vec![""];
    let mut base_ids = Vec::with_capacity(range.len());
    let mut paths = Vec::with_capacity(range.len());
    for i in range.clone() {
        let (base, path) = split_cover(&corpus.covers[i]);
        let id = if base.is_empty() {
            0
        } else {
            match bases.iter().position(|&b| b == base) {
                Some(pos) => pos,
                None => {
                    bases.push(base);
                    bases.len() - 1
                }
            }
        };
        base_ids.push(u16::try_from(id).map_err(|_| ZmhError::ArtifactCorrupted {
            name: "meta-lite".to_owned(),
            detail: "more than 65535 cover bases in one shard".to_owned(),
        })?);
        paths.push(path);
    }

    let joined = |lists: &[Vec<String>]| {
        range
            .clone()
            .map(|i| lists[i].join(&sep.to_string()))
            .collect::<Vec<_>>()
    };

    let shard = MetaShard {
        sep_code: DEFAULT_SEP_CODE,
        ids: corpus.ids[range.clone()].to_vec(),
        tag_lo: corpus.tag_lo[range.clone()].to_vec(),
        tag_hi: corpus.tag_hi[range.clone()].to_vec(),
        flags: corpus.flags[range.clone()].to_vec(),
        titles: StringPool::from_strings(&corpus.titles[range.clone()]),
        cover_bases: StringPool::from_strings(&bases),
        cover_base_ids: base_ids,
        cover_paths: StringPool::from_strings(&paths),
        authors: StringPool::from_strings(joined(&corpus.authors)),
        aliases: StringPool::from_strings(joined(&corpus.aliases)),
    };
    shard.encode()
}

/// Write `data` as `<stem>.<sha12><ext>` and return its asset reference.
fn write_hashed(out_dir: &Path, stem: &str, ext: &str, data: &[u8]) -> ZmhResult<(String, AssetRef)> {
    let digest = hex::encode(Sha256::digest(data));
    let filename = format!("{stem}.{}{ext}", &digest[..12]);
    fs::write(out_dir.join(&filename), data)?;
    let asset = AssetRef {
        path: format!("assets/{filename}"),
        sha256: digest,
        bytes: data.len() as u64,
    };
    Ok((filename, asset))
}

/// Delete previously generated artifacts that are not part of this build.
fn clean_generated(out_dir: &Path, keep: &HashSet<String>) -> std::io::Result<usize> {
    let mut removed = 0usize;
    for entry in fs::read_dir(out_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if keep.contains(&name) {
            continue;
        }
        if GENERATED_PREFIXES.iter().any(|p| name.starts_with(p)) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Build the full artifact set from cleaned rows.
pub fn build_from_rows(rows: Vec<SourceRow>, opts: &BuildOptions) -> ZmhResult<BuildSummary> {
    fs::create_dir_all(&opts.out_dir)?;

    let tags = assign_tags(&rows);
    let corpus = collect(rows, &tags);
    let index = assemble_index(&corpus, opts.index_shard_count)?;
    let dict_bytes = TokenDict::encode(2, &index.entries)?;

    let meta_width = opts.meta_shard_docs.unwrap_or(DEFAULT_META_SHARD_DOCS);
    let count = corpus.count() as u32;
    let meta_shards = meta_shard_count(count, meta_width);

    let mut files = Vec::new();

    let tags_bytes = serde_json::to_vec(&tags.file)?;
    let (tags_name, tags_asset) = write_hashed(&opts.out_dir, "tags", ".json", &tags_bytes)?;
    files.push(tags_name);

    let (dict_name, dict_asset) = write_hashed(&opts.out_dir, "ngram.dict", ".bin", &dict_bytes)?;
    files.push(dict_name);

    let mut meta_assets = Vec::with_capacity(meta_shards as usize);
    for shard_no in 0..meta_shards {
        let start = (shard_no * meta_width.max(1)) as usize;
        let end = if meta_width == 0 {
            corpus.count()
        } else {
            corpus.count().min(start + meta_width as usize)
        };
        let bytes = pack_meta_range(&corpus, start..end)?;
        let stem = if meta_width == 0 {
            "meta-lite".to_owned()
        } else {
            format!("meta-lite.{shard_no}")
        };
        let (name, asset) = write_hashed(&opts.out_dir, &stem, ".bin", &bytes)?;
        files.push(name);
        meta_assets.push(asset);
    }

    let mut index_assets = Vec::with_capacity(index.shards.len());
    for (shard_id, pool) in index.shards.iter().enumerate() {
        let (name, asset) = write_hashed(
            &opts.out_dir,
            &format!("ngram.index.{shard_id}"),
            ".bin",
            pool,
        )?;
        files.push(name);
        index_assets.push(asset);
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        generated_at: opts.generated_at.clone(),
        stats: ManifestStats {
            version: MANIFEST_VERSION,
            count,
            unique_tokens: index.entries.len() as u32,
            index_bytes: index.total_bytes,
            meta_shard_docs: meta_width,
            meta_shard_count: meta_shards,
            index_shard_count: index.shards.len() as u32,
            index_shard_mode: index.mode.clone(),
        },
        assets: ManifestAssets {
            tags: tags_asset,
            dict: dict_asset,
            meta_shards: meta_assets,
            index_shards: index_assets,
        },
    };
    fs::write(
        opts.out_dir.join("manifest.json"),
        serde_json::to_vec(&manifest)?,
    )?;

    if opts.clean {
        let keep: HashSet<String> = files.iter().cloned().collect();
        let removed = clean_generated(&opts.out_dir, &keep)?;
        if removed > 0 {
            info!(removed, "stale artifacts cleaned");
        }
    }
    files.push("manifest.json".to_owned());

    info!(
        docs = manifest.stats.count,
        tokens = manifest.stats.unique_tokens,
        index_bytes = manifest.stats.index_bytes,
        meta_shards = manifest.stats.meta_shard_count,
        index_shards = manifest.stats.index_shard_count,
        "index build complete"
    );

    Ok(BuildSummary {
        manifest,
        files,
        dropped_tags: tags.dropped,
        unkeyable_tokens: corpus.unkeyable_tokens,
    })
}
