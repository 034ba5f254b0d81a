//! CLI module for lazypool
//!
//! # Usage
//!
//! ```bash
//! # Validate a config file and list its backends
//! lazypool --config pool.yaml check
//!
//! # Connect to every backend and report pool statistics
//! lazypool --config pool.yaml probe --acquire 3
//!
//! # Only resolve selected services
//! lazypool probe --service user --service order
//! ```

pub mod args;
pub mod commands;

use anyhow::{Context, Result};
use tracing::{debug, info};

use args::{Cli, Commands};
use crate::config;
use crate::core::Core;

/// Run the CLI application with already parsed arguments
pub async fn run(cli: Cli) -> Result<()> {
    debug!("CLI arguments: {:?}", cli);

    let config = config::load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Check => commands::cmd_check(&config),
        Commands::Probe { acquire, services } => {
            info!("Starting backend probe");
            let core = Core::new(config).await?;
            commands::cmd_probe(&core, acquire, &services).await
        }
    }
}
