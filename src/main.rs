//! Rekindle - hot updates for browser UI development.

use anyhow::Result;
use clap::{ColorChoice, Parser};

use rekindle::cli::serve::ServeOpts;
use rekindle::cli::{Cli, Commands, classify, serve};
use rekindle::config::Config;
use rekindle::logger;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = Config::load(&cli.config)?;

    match &cli.command {
        Commands::Serve {
            manifest,
            interface,
            port,
            debounce_ms,
        } => serve::run(
            &config,
            &ServeOpts {
                manifest: manifest.clone(),
                interface: *interface,
                port: *port,
                debounce_ms: *debounce_ms,
            },
        ),
        Commands::Classify { manifest, module } => classify::run(manifest, module),
    }
}
