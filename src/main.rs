//! # hiremind CLI
//!
//! Ingests résumés and job-role descriptions into a local document store.
//!
//! ## Usage
//!
//! ```bash
//! hiremind --config ./config/hiremind.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hiremind init` | Create the SQLite database and schema |
//! | `hiremind ingest <cv\|role> [PATHS...]` | Run files (or a folder) through the pipeline |
//! | `hiremind get <cv\|role> <sha>` | Print a stored document with its sections |
//! | `hiremind list <cv\|role>` | List stored documents |
//! | `hiremind delete <cv\|role> <sha>` | Remove a document and its sections |
//! | `hiremind slice <file>` | Preview the section map of a file as JSON |
//! | `hiremind serve` | Start the HTTP server |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hiremind::models::DocumentKind;
use hiremind::progress::ProgressMode;
use hiremind::store::{DocumentStore, SqliteStore};
use hiremind::{config, get, ingest, server};

/// hiremind: résumé and job-role ingestion.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hiremind.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hiremind",
    about = "hiremind: résumé and job-role ingestion pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hiremind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest files into the store.
    ///
    /// Files whose content hash is already stored are reported as already
    /// present and skipped without any extraction or embedding work.
    Ingest {
        /// `cv` or `role`.
        #[arg(value_parser = parse_kind)]
        kind: DocumentKind,

        /// Files to ingest. When empty, `--folder` or the configured folder is used.
        paths: Vec<PathBuf>,

        /// Ingest every supported file directly inside this folder.
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Re-process files even if their hash is already stored.
        #[arg(long)]
        overwrite: bool,

        /// Progress output on stderr: `human`, `json` or `off`.
        /// Defaults to `human` on a terminal, `off` otherwise.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },

    /// Print a stored document.
    Get {
        #[arg(value_parser = parse_kind)]
        kind: DocumentKind,
        sha: String,
    },

    /// List stored documents, newest first.
    List {
        #[arg(value_parser = parse_kind)]
        kind: DocumentKind,
    },

    /// Delete a stored document and its sections.
    Delete {
        #[arg(value_parser = parse_kind)]
        kind: DocumentKind,
        sha: String,
    },

    /// Print the section map of a file as JSON.
    Slice { file: PathBuf },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn parse_kind(s: &str) -> Result<DocumentKind, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s)
        .ok_or_else(|| format!("invalid progress mode '{}': use human, json or off", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::connect(&cfg.db.path).await?;
            store.ensure_schema().await?;
            store.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            kind,
            paths,
            folder,
            overwrite,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, kind, paths, folder, overwrite, mode).await?;
        }
        Commands::Get { kind, sha } => {
            get::run_get(&cfg, kind, &sha).await?;
        }
        Commands::List { kind } => {
            get::run_list(&cfg, kind).await?;
        }
        Commands::Delete { kind, sha } => {
            get::run_delete(&cfg, kind, &sha).await?;
        }
        Commands::Slice { file } => {
            ingest::run_slice(&cfg, &file)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
