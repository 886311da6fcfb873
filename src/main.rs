//! # semdex CLI
//!
//! - `semdex serve` - run the indexing daemon in the foreground
//! - `semdex add <DIR>` / `semdex remove <DIR>` - manage watched directories
//! - `semdex search <QUERY>` - semantic search over the index
//! - `semdex list`, `status`, `reindex`, `clear`
//!
//! Logs go to stderr; `--json` prints machine-readable results on stdout.

use anyhow::Result;
use clap::{Parser, Subcommand};
use semdex::{Config, SearchOptions, Semdex};
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "semdex")]
#[command(about = "Local semantic search over your text files")]
#[command(version = VERSION)]
struct Cli {
    /// Path to config file (default: ~/.config/semdex/config.toml)
    #[arg(short, long, global = true, env = "SEMDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the indexing daemon until interrupted
    Serve,

    /// Register a directory and index its files
    Add {
        /// Directory to watch
        path: String,
    },

    /// Unregister a directory and drop its documents
    Remove {
        /// Previously added directory
        path: String,
    },

    /// List registered directories
    List,

    /// Search the index
    Search {
        /// Free-text query
        query: String,

        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only return documents under this directory
        #[arg(short, long)]
        path: Option<String>,

        /// Drop results scoring below this (0.0 - 1.0)
        #[arg(long)]
        min_score: Option<f32>,
    },

    /// Show index status
    Status,

    /// Re-index every registered directory
    Reindex,

    /// Delete all documents, keeping registered directories
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "semdex=debug" } else { "semdex=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::new(cli.config.as_deref())?;
    let search_defaults = config.search.clone();
    let service = Semdex::with_config(config).await?;

    match cli.command {
        Commands::Serve => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Interrupt received, stopping");
                    on_signal.cancel();
                }
            });
            service.run_daemon(cancel).await?;
        }
        Commands::Add { path } => {
            let added = service.add_directory(&path).await?;
            if cli.json {
                print_json(&added)?;
            } else {
                let verb = if added.already_registered { "Refreshed" } else { "Added" };
                println!("{} {}", verb, added.directory.path);
                match added.indexed {
                    Some(r) => println!(
                        "  {} indexed, {} skipped, {} errors",
                        r.indexed, r.skipped, r.errors
                    ),
                    None => println!("  {} files handed to the running daemon", added.queued_count),
                }
            }
        }
        Commands::Remove { path } => {
            let removed = service.remove_directory(&path).await?;
            if cli.json {
                print_json(&serde_json::json!({ "path": path, "removed": removed }))?;
            } else {
                println!("Removed {} ({} documents)", path, removed);
            }
        }
        Commands::List => {
            let directories = service.list_directories().await?;
            if cli.json {
                print_json(&directories)?;
            } else if directories.is_empty() {
                println!("No directories registered");
            } else {
                for dir in directories {
                    let last = dir
                        .last_indexed_at
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!("{}  ({} documents, last indexed {})", dir.path, dir.file_count, last);
                }
            }
        }
        Commands::Search {
            query,
            limit,
            path,
            min_score,
        } => {
            let options = SearchOptions {
                limit: limit.unwrap_or(search_defaults.limit),
                path,
                min_score: min_score.unwrap_or(search_defaults.min_score),
            };
            let results = service.search(&query, options).await?;
            if cli.json {
                print_json(&results)?;
            } else if results.is_empty() {
                println!("No results");
            } else {
                for r in results {
                    println!("{:.3}  {}", r.score, r.path);
                    println!("       {}", preview(&r.content));
                }
            }
        }
        Commands::Status => {
            let status = service.status().await?;
            if cli.json {
                print_json(&status)?;
            } else {
                println!("Model:       {} ({} dimensions)", status.model_name, status.dimensions);
                println!("Documents:   {}", status.documents);
                println!("Directories: {}", status.directories);
                println!("Queue:       {}", status.queue_size);
                println!(
                    "Mode:        {}",
                    if status.writable { "writer" } else { "read-only (daemon running)" }
                );
            }
        }
        Commands::Reindex => {
            let result = service.reindex_stale_files().await?;
            if cli.json {
                print_json(&result)?;
            } else {
                println!(
                    "{} indexed, {} skipped, {} errors",
                    result.indexed, result.skipped, result.errors
                );
            }
        }
        Commands::Clear => {
            service.clear_index().await?;
            if !cli.json {
                println!("Index cleared");
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// First line of a document, shortened for terminal output
fn preview(content: &str) -> String {
    let line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut out: String = line.chars().take(100).collect();
    if line.chars().count() > 100 {
        out.push_str("...");
    }
    out
}
