//! # Memex
//!
//! Knowledge-graph server and CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                apps/memex (THE BINARY)           │
//! │                                                  │
//! │   ┌─────────────┐          ┌─────────────┐       │
//! │   │    CLI      │          │  HTTP API   │       │
//! │   │   (clap)    │          │   (axum)    │       │
//! │   └──────┬──────┘          └──────┬──────┘       │
//! │          └───────────┬────────────┘              │
//! │                      ▼                           │
//! │              ┌───────────────┐                   │
//! │              │  memex-core   │                   │
//! │              │ (THE ENGINE)  │                   │
//! │              └───────────────┘                   │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! memex init
//! memex ingest -f facts.json
//! memex neighborhood --center 1 --depth 2
//! memex serve --host 0.0.0.0 --port 8080
//! ```

use clap::Parser;
use memex::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // MEMEX_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MEMEX_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "memex=info,memex_core=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        eprintln!("memex v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
