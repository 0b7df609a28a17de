//! Shard placement math shared by the builder and the loader.

/// Default meta shard width (docs per `meta` file).
pub const DEFAULT_META_SHARD_DOCS: u32 = 4096;

/// Target decoded size of one index shard under the default policy.
const INDEX_SHARD_TARGET_BYTES: usize = 1 << 20;

/// 32-bit avalanche mix (murmur3 finalizer). Spreads sequential token
/// keys evenly across shard buckets; must stay stable across builds
/// because `dict.shardIds` records its output.
const fn mix32(mut x: u32) -> u32 {
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2_AE35);
    x ^= x >> 16;
    x
}

/// Index shard holding a token's postings.
#[must_use]
pub const fn index_shard_of(token_key: u32, shard_count: u32) -> u32 {
    if shard_count <= 1 {
        return 0;
    }
    mix32(token_key) % shard_count
}

/// Default index shard count: one shard per MiB of postings, rounded up
/// to the next power of two (`stats.indexShardMode = "pow2-1mib"`).
#[must_use]
pub fn default_index_shard_count(total_postings_bytes: usize) -> u32 {
    let shards = total_postings_bytes.div_ceil(INDEX_SHARD_TARGET_BYTES).max(1);
    u32::try_from(shards.next_power_of_two()).unwrap_or(u32::MAX)
}

/// Number of meta shards for a corpus of `count` docs at `width` docs per
/// shard. `width == 0` disables sharding (one shard).
#[must_use]
pub const fn meta_shard_count(count: u32, width: u32) -> u32 {
    if width == 0 || count == 0 {
        return 1;
    }
    count.div_ceil(width)
}
