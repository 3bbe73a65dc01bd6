// SPDX-FileCopyrightText: 2026 Atrium Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Atrium - omnichannel message routing and attendance queue engine.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod dispatch;
mod telemetry;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Atrium - omnichannel message routing and attendance queue engine.
#[derive(Parser, Debug)]
#[command(name = "atrium", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway, workers and operator realtime server.
    Serve,
    /// Validate configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => atrium_config::load_and_validate_path(path),
        None => atrium_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            atrium_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("atrium: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::CheckConfig) => {
            println!(
                "atrium: config ok (listen {}:{}, database {}, {} tenant override(s), {} operator(s))",
                config.server.host,
                config.server.port,
                config.storage.database_path,
                config.tenants.len(),
                config.operators.len()
            );
        }
        None => {
            println!("atrium: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["atrium", "--config", "/tmp/a.toml", "serve"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve)));
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/a.toml")));

        let cli = Cli::try_parse_from(["atrium", "check-config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
    }

    #[test]
    fn defaults_are_valid() {
        let config = atrium_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.server.port, atrium_config::AtriumConfig::default().server.port);
    }
}
