//! `zmh-build`: offline index builder CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use zmhsearch_builder::{build_from_dump, BuildOptions};

/// Build the client-side search index from a catalog dump.
#[derive(Debug, Parser)]
#[command(name = "zmh-build", version, about)]
struct Cli {
    /// Path to the catalog dump (JSON lines, one row per line).
    source: PathBuf,

    /// Output directory for artifacts and manifest.json.
    #[arg(long, default_value = "public/assets")]
    out_dir: PathBuf,

    /// Purge stale generated artifacts after writing.
    #[arg(long)]
    clean: bool,

    /// Override the generatedAt timestamp (ISO-8601).
    #[arg(long)]
    generated_at: Option<String>,

    /// Docs per meta shard; 0 disables meta sharding.
    #[arg(long)]
    meta_shard_docs: Option<u32>,

    /// Index shard count; 0 disables index sharding.
    #[arg(long)]
    index_shard_count: Option<u32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zmhsearch_builder=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("zmh-build: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let generated_at = cli
        .generated_at
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));

    let opts = BuildOptions {
        out_dir: cli.out_dir,
        generated_at,
        clean: cli.clean,
        meta_shard_docs: cli.meta_shard_docs,
        index_shard_count: cli.index_shard_count,
    };
    let summary = build_from_dump(&cli.source, &opts)?;

    println!("index written to {}:", opts.out_dir.display());
    for file in &summary.files {
        println!("- {file}");
    }
    let stats = &summary.manifest.stats;
    println!(
        "docs: {}, tokens: {}, index: {} bytes, meta shards: {}, index shards: {} ({})",
        stats.count,
        stats.unique_tokens,
        stats.index_bytes,
        stats.meta_shard_count,
        stats.index_shard_count,
        stats.index_shard_mode,
    );
    if summary.dropped_tags > 0 {
        println!("warning: {} tags beyond bitset capacity were dropped", summary.dropped_tags);
    }
    if summary.unkeyable_tokens > 0 {
        println!(
            "note: {} tokens could not be keyed as two UTF-16 units and were skipped",
            summary.unkeyable_tokens
        );
    }
    Ok(())
}
