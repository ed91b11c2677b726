//! # Workshop Hub CLI (`wshub`)
//!
//! ```bash
//! wshub --config ./config/hub.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wshub init` | Create the SQLite database and run schema migrations |
//! | `wshub process <file>` | Process one manual from storage |
//! | `wshub process-all` | Process every manual in storage |
//! | `wshub status [file]` | Show processing status |
//! | `wshub search "<query>"` | Keyword search over manual chunks |
//! | `wshub serve` | Start the HTTP server and offline worker |
//!
//! Logging is controlled with `RUST_LOG` (default `info`) and written to
//! stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use workshop_hub::{commands, config, migrate, server};

/// Workshop Hub: manual ingestion and offline caching for a vehicle owners'
/// community hub.
#[derive(Parser)]
#[command(name = "wshub", version, about = "Workshop Hub manual ingestion and offline cache")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hub.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Process a single manual from storage.
    Process {
        /// Manual filename, relative to the storage root.
        filename: String,
    },

    /// Process every manual in storage.
    ProcessAll {
        /// Skip manuals that already completed.
        #[arg(long)]
        unprocessed: bool,

        /// Manuals processed at once (overrides `[batch].concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Pause between manuals in sequential mode (overrides `[batch].delay_ms`).
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Show processing status for one manual, or all of them.
    Status {
        filename: Option<String>,
    },

    /// Keyword search over processed manual chunks.
    Search {
        query: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Start the HTTP server.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Process { filename } => {
            commands::run_process(&cfg, &filename).await?;
        }
        Commands::ProcessAll {
            unprocessed,
            concurrency,
            delay_ms,
        } => {
            commands::run_process_all(&cfg, unprocessed, concurrency, delay_ms).await?;
        }
        Commands::Status { filename } => {
            commands::run_status(&cfg, filename.as_deref()).await?;
        }
        Commands::Search { query, limit } => {
            commands::run_search(&cfg, &query, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
