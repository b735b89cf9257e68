//! CLI parse: clap types for frameproxy. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Frameproxy CLI - Frame resolution proxy
#[derive(Parser)]
#[command(name = "frameproxy")]
#[command(about = "Resolves third-party frame documents and proxies their preview images")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config/ is read from here)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP proxy until interrupted
    Serve {
        /// Listen address (overrides server.listen_addr)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Resolve a single frame and print the result as JSON
    Resolve {
        /// Target frame URL
        url: String,
        /// Send a POST with this JSON payload instead of a GET
        #[arg(long)]
        post: Option<String>,
    },
}
