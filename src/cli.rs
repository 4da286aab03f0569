use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "orders")]
#[command(version = "0.1.0")]
#[command(about = "Order ingestion service with an LRU read cache", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config directory (default.toml, then <ORDERS_ENV>.toml)
    #[arg(short, long, default_value = "config", env = "ORDERS_CONFIG_DIR")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the ingestion pipeline and the HTTP API (default)
    Serve {
        /// Override http.port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override feed.url
        #[arg(long)]
        feed_url: Option<String>,
    },
    /// Run the producer emulator
    Produce {
        /// Port to serve ws://0.0.0.0:<port>/feed on
        #[arg(short, long, default_value = "9090")]
        port: u16,
        /// Milliseconds between events
        #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,
        /// Close each subscription after this many events
        #[arg(long)]
        count: Option<u64>,
        /// Re-send the previous order as every Nth event
        #[arg(long)]
        duplicate_every: Option<u64>,
        /// Send a malformed payload as every Mth event
        #[arg(long)]
        malformed_every: Option<u64>,
    },
    /// Decode and validate an order JSON file
    Validate {
        /// Path to the order file
        file: PathBuf,
    },
}

impl Cli {
    /// Apply `serve` overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(Commands::Serve { port, feed_url }) = &self.command {
            if let Some(port) = port {
                config.http.port = *port;
            }
            if let Some(url) = feed_url {
                config.feed.url = url.clone();
            }
        }
    }
}
