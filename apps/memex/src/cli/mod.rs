//! # Memex CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Create an empty database
//! - `ingest` - Apply a JSON fact batch
//! - `entity` - Lookup by id or search by name
//! - `neighborhood` - Bounded traversal around an entity
//! - `contested` - Prior/current belief pairs
//! - `retract` - Retract a relationship
//! - `stats` - Graph statistics
//! - `serve` - Start the HTTP server

mod commands;

use crate::config::{Backend, MemexConfig};
use clap::{Parser, Subcommand};
use memex_core::MemexError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Memex - knowledge graph of entities, claims and provenance
#[derive(Parser, Debug)]
#[command(name = "memex")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a memex.toml configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the graph database (overrides config and MEMEX_DB)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (persistent) or "memory" (volatile)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Suppress the startup banner
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an empty database
    Init {
        /// Replace an existing database file
        #[arg(short, long)]
        force: bool,
    },

    /// Apply a JSON fact batch
    Ingest {
        /// Path to the batch file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Lookup an entity by id, or search by name
    Entity {
        /// Entity id
        #[arg(long, conflicts_with = "search", required_unless_present = "search")]
        id: Option<u64>,

        /// Name substring to search for
        #[arg(short, long)]
        search: Option<String>,

        /// Maximum search results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Expand the neighborhood of an entity
    Neighborhood {
        /// Center entity id
        #[arg(short, long)]
        center: u64,

        /// Traversal depth
        #[arg(short, long, default_value = "1")]
        depth: usize,

        /// Maximum visited entities, center included
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum relationship confidence (0.0 - 1.0)
        #[arg(short, long)]
        min_confidence: Option<f64>,

        /// Only relationships with this status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// List contested relationships with their current belief
    Contested,

    /// Retract a relationship
    Retract {
        /// Relationship id
        #[arg(long)]
        id: u64,
    },

    /// Show graph statistics
    Stats,

    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl clap::ValueEnum for Backend {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Redb, Self::Memory]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.as_str()))
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

impl Cli {
    /// Layered configuration: defaults, file, environment, then flags.
    pub fn resolve_config(&self) -> Result<MemexConfig, MemexError> {
        let mut config = MemexConfig::load(self.config.as_deref())?;
        config.apply_env()?;
        if let Some(path) = &self.database {
            config.storage.path = path.clone();
        }
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        Ok(config)
    }
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), MemexError> {
    let mut config = cli.resolve_config()?;
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Init { force } => cmd_init(&config, json_mode, force),
        Commands::Ingest { file } => cmd_ingest(&config, json_mode, &file),
        Commands::Entity { id, search, limit } => {
            cmd_entity(&config, json_mode, id, search.as_deref(), limit)
        }
        Commands::Neighborhood {
            center,
            depth,
            limit,
            min_confidence,
            status,
        } => cmd_neighborhood(
            &config,
            json_mode,
            &NeighborhoodArgs {
                center,
                depth,
                limit,
                min_confidence,
                status,
            },
        ),
        Commands::Contested => cmd_contested(&config, json_mode),
        Commands::Retract { id } => cmd_retract(&config, json_mode, id),
        Commands::Stats => cmd_stats(&config, json_mode),
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(&config).await
        }
    }
}
