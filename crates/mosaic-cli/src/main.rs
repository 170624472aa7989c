//! Mosaic operator tooling: offline index construction, startup
//! verification, and hit-file inspection.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mosaic_core::{load_resources, read_hits, BuildParams, QuantizerConfig, Vocabulary, WordIndex};

/// Operator tooling for the Mosaic quantization stage.
#[derive(Parser, Debug)]
#[command(name = "mosaic")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build and persist the nearest-neighbor index from a vocabulary file.
    ///
    /// This is the offline step every serving process depends on: run it
    /// once per vocabulary, then point the service's `index_dir` at the
    /// output directory.
    BuildIndex {
        /// Path of the binary visual-words file
        #[arg(short, long, env = "MOSAIC_VOCABULARY_PATH")]
        vocabulary: PathBuf,

        /// Directory receiving the persisted index
        #[arg(short, long, env = "MOSAIC_INDEX_DIR")]
        output: PathBuf,

        /// Maximum connections per graph node
        #[arg(long, default_value_t = 16)]
        max_connections: usize,

        /// Candidate-list width during construction
        #[arg(long, default_value_t = 200)]
        ef_construction: usize,
    },

    /// Run the fail-fast startup path against a configuration file.
    ///
    /// Loads the vocabulary, cross-checks its row count, loads the persisted
    /// index, and verifies the output directory exists, exactly as a serving
    /// process would before accepting its first request.
    Check {
        /// Path of the TOML configuration file
        #[arg(short, long, default_value = "mosaic.toml")]
        config: PathBuf,
    },

    /// Decode and print the records of a per-image hit file.
    Hits {
        /// Path of the hit file
        file: PathBuf,

        /// Print at most this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match Cli::parse().command {
        Command::BuildIndex {
            vocabulary,
            output,
            max_connections,
            ef_construction,
        } => build_index(&vocabulary, &output, max_connections, ef_construction),
        Command::Check { config } => check(&config),
        Command::Hits { file, limit } => hits(&file, limit),
    }
}

fn build_index(
    vocabulary_path: &Path,
    output: &Path,
    max_connections: usize,
    ef_construction: usize,
) -> anyhow::Result<()> {
    let vocabulary = Vocabulary::load(vocabulary_path).context("reading the vocabulary")?;
    tracing::info!(words = vocabulary.len(), "vocabulary read, building the graph");

    let params = BuildParams {
        max_connections,
        ef_construction,
        ..BuildParams::default()
    };
    let index = WordIndex::build(&vocabulary, &params);
    index.save(output).context("persisting the index")?;

    tracing::info!(path = %output.display(), "index persisted");
    Ok(())
}

fn check(config_path: &Path) -> anyhow::Result<()> {
    let config = QuantizerConfig::from_file(config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let (vocabulary, index) = load_resources(&config)?;

    println!("vocabulary: {} words", vocabulary.len());
    println!("index:      {} entries", index.len());
    println!("output dir: {}", config.output_dir.display());
    if !config.output_dir.is_dir() {
        anyhow::bail!(
            "output directory {} does not exist",
            config.output_dir.display()
        );
    }
    println!("ok");
    Ok(())
}

fn hits(file: &Path, limit: Option<usize>) -> anyhow::Result<()> {
    let hits = read_hits(file)?;
    let shown = limit.unwrap_or(hits.len()).min(hits.len());
    for hit in &hits[..shown] {
        println!(
            "word={:7} image={:5} angle={:5} x={:5} y={:5}",
            hit.word_id, hit.image_id, hit.angle, hit.x, hit.y
        );
    }
    if shown < hits.len() {
        println!("... {} more records", hits.len() - shown);
    }
    println!("{} records total", hits.len());
    Ok(())
}
