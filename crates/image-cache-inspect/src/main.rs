//! Image cache inspector
//!
//! Resolves URLs to cache entries, reports their freshness and copies
//! entries out of the storage root. Configured through the same
//! environment variables as the cache itself.

mod commands;
mod error;

use crate::error::Result;
use clap::{Parser, Subcommand};
use file_image_cache::{CacheConfig, FileStorage};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "image-cache-inspect", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the entry path for a URL
    Path { url: String },
    /// Print entry details as JSON
    Stat {
        url: String,
        /// Treat the URL as a source image URL
        #[arg(long)]
        source: bool,
    },
    /// Copy a fresh entry to a file
    Get {
        url: String,
        #[arg(long)]
        source: bool,
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("image_cache_inspect=info".parse()?)
        .add_directive("file_image_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();

    let config = CacheConfig::from_env();
    info!("Storage root: {:?}", config.storage_root);
    info!("Result TTL: {:?} seconds", config.effective_result_ttl());

    let storage = FileStorage::new(config);

    match cli.command {
        Command::Path { url } => {
            println!("{}", commands::path(&storage, &url).display());
        }
        Command::Stat { url, source } => {
            let json = commands::stat(&storage, commands::kind_for(source), &url).await?;
            println!("{}", json);
        }
        Command::Get { url, source, out } => {
            commands::get(&storage, commands::kind_for(source), &url, &out).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_get() {
        let cli = Cli::parse_from([
            "image-cache-inspect",
            "get",
            "https://x/img.png",
            "--source",
            "-o",
            "/tmp/out.png",
        ]);
        match cli.command {
            Command::Get { url, source, out } => {
                assert_eq!(url, "https://x/img.png");
                assert!(source);
                assert_eq!(out, PathBuf::from("/tmp/out.png"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_stat_defaults_to_result() {
        let cli = Cli::parse_from(["image-cache-inspect", "stat", "https://x/img.png"]);
        assert!(matches!(cli.command, Command::Stat { source: false, .. }));
    }
}
