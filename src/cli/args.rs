//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Rekindle hot-update engine CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (default: rekindle.toml)
    #[arg(short = 'C', long, default_value = "rekindle.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Watch sources and push hot updates to connected clients
    #[command(visible_alias = "s")]
    Serve {
        /// Module graph manifest to seed the engine with
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        manifest: Option<PathBuf>,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// WebSocket port number
        #[arg(short, long)]
        port: Option<u16>,

        /// Coalescing window in milliseconds
        #[arg(short, long)]
        debounce_ms: Option<u64>,
    },

    /// Classify a single change against a module graph manifest
    #[command(visible_alias = "c")]
    Classify {
        /// Module graph manifest
        #[arg(value_hint = clap::ValueHint::FilePath)]
        manifest: PathBuf,

        /// Id of the changed module
        module: String,
    },
}
