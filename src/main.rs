//! # docdex CLI
//!
//! The `docdex` binary drives the chunking, indexing, and sync pipeline.
//!
//! ## Usage
//!
//! ```bash
//! docdex --config ./docdex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docdex sync` | Reconcile the remote index with the current corpus |
//! | `docdex search "<query>"` | Search the corpus (lexical, or `--remote` hybrid) |
//! | `docdex get <path>` | Print a document by path |
//!
//! ## Examples
//!
//! ```bash
//! # Preview what a sync would change
//! docdex sync --dry-run
//!
//! # Drop and rebuild the remote index from scratch
//! docdex sync --recreate --batch-size 50
//!
//! # Local TF-IDF search, no network required
//! docdex search "configure authentication"
//!
//! # Hybrid keyword + vector search against the remote index
//! docdex search "configure authentication" --remote
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docdex::{config, search, sync};

/// docdex — documentation chunking, lexical indexing, and remote
/// hybrid-index synchronization.
#[derive(Parser)]
#[command(
    name = "docdex",
    about = "Documentation chunking, lexical indexing, and remote hybrid-index synchronization",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./docdex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Reconcile the remote index with the current corpus.
    ///
    /// Chunks every document, diffs chunk ids and content hashes against
    /// the remote index, and uploads or deletes only what changed.
    /// Unchanged chunks are never re-embedded.
    Sync {
        /// Drop and recreate the remote index before uploading.
        #[arg(long)]
        recreate: bool,

        /// Compute and report the plan without uploading or deleting.
        #[arg(long)]
        dry_run: bool,

        /// Upload/delete batch size (minimum 1).
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },

    /// Search the corpus.
    ///
    /// Uses the in-memory TF-IDF index by default; with `--remote`, the
    /// query is embedded and run against the remote hybrid index.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Query the remote hybrid index instead of the lexical fallback.
        #[arg(long)]
        remote: bool,
    },

    /// Print a document's full content by path.
    ///
    /// Accepts exact corpus-relative paths (extension optional) or a bare
    /// filename, which is matched against trailing path segments.
    Get {
        /// Document path (e.g. `get-started/quickstart`).
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync {
            recreate,
            dry_run,
            batch_size,
        } => {
            sync::run_sync(
                &cfg,
                sync::SyncOptions {
                    recreate,
                    dry_run,
                    batch_size: batch_size.max(1),
                },
            )
            .await?;
        }
        Commands::Search {
            query,
            limit,
            remote,
        } => {
            search::run_search(&cfg, &query, limit, remote).await?;
        }
        Commands::Get { path } => {
            search::run_get(&cfg, &path)?;
        }
    }

    Ok(())
}
