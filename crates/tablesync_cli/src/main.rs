//! Tablesync CLI
//!
//! Command-line client for a tablesync collection service.
//!
//! # Commands
//!
//! - `watch` - Keep a live view of the collection and print every change
//! - `list` - Print the current collection
//! - `create` - Validate and submit a record
//! - `delete` - Delete every record in the collection
//! - `connection-info` - Show the push channel coordinates

mod commands;

use clap::{Parser, Subcommand};
use std::time::Duration;
use tablesync_engine::{SyncConfig, SyncMode};
use tablesync_protocol::KeyPath;
use tracing_subscriber::EnvFilter;

/// Tablesync command-line client.
#[derive(Parser)]
#[command(name = "tablesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the collection service
    #[arg(global = true, short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Collection path under the base URL
    #[arg(global = true, long, default_value = "/messages/")]
    collection: String,

    /// JSON pointer to the record key
    #[arg(global = true, short, long, default_value = "/id")]
    key: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep a live view of the collection and print every change
    Watch {
        /// Sync mode (push, pull, push-with-fallback)
        #[arg(short, long, default_value = "push-with-fallback")]
        mode: SyncMode,

        /// Poll interval in milliseconds for pull mode
        #[arg(long, default_value = "1000")]
        poll_ms: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the current collection
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate and submit a record
    Create {
        /// Record body as JSON
        #[arg(short, long)]
        json: String,

        /// Fill in a random key if the record has none
        #[arg(short, long)]
        generate_id: bool,

        /// Field that must be present (JSON pointer, repeatable)
        #[arg(short, long)]
        require: Vec<String>,

        /// List whose elements must be non-null (JSON pointer, repeatable)
        #[arg(long)]
        require_elements: Vec<String>,
    },

    /// Delete every record in the collection
    Delete {
        /// Skip the confirmation check
        #[arg(short, long)]
        force: bool,
    },

    /// Show the push channel coordinates
    ConnectionInfo {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

impl Cli {
    fn config(&self) -> SyncConfig {
        SyncConfig::new(self.url.clone())
            .with_collection_path(self.collection.clone())
            .with_key_path(KeyPath::new(self.key.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = cli.config();
    match cli.command {
        Commands::Watch { mode, poll_ms, format } => {
            let config = config.with_poll_interval(Duration::from_millis(poll_ms));
            commands::watch::run(config, mode, &format).await?;
        }
        Commands::List { format } => {
            commands::list::run(&config, &format).await?;
        }
        Commands::Create {
            json,
            generate_id,
            require,
            require_elements,
        } => {
            commands::create::run(&config, &json, generate_id, &require, &require_elements).await?;
        }
        Commands::Delete { force } => {
            commands::delete::run(&config, force).await?;
        }
        Commands::ConnectionInfo { format } => {
            commands::connection_info::run(&config, &format).await?;
        }
        Commands::Version => {
            println!("Tablesync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
