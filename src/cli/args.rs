use clap::{Parser, Subcommand};

/// lazypool - Lazy, concurrency-safe backend connection pools
#[derive(Parser, Debug)]
#[command(name = "lazypool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path (falls back to LAZYPOOL_* environment variables)
    #[arg(long, global = true, env = "LAZYPOOL_CONFIG")]
    pub config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and list configured backends
    Check,

    /// Connect to every configured backend and report pool statistics
    Probe {
        /// Number of document connections to hold at once
        #[arg(long, default_value = "1")]
        acquire: usize,

        /// Services to resolve (default: all configured services)
        #[arg(long = "service", value_name = "NAME")]
        services: Vec<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe() {
        let cli = Cli::try_parse_from([
            "lazypool", "--config", "pool.yaml", "probe", "--acquire", "3", "--service", "user",
            "--service", "order",
        ])
        .unwrap();

        assert_eq!(cli.config.as_deref(), Some("pool.yaml"));
        match cli.command {
            Commands::Probe { acquire, services } => {
                assert_eq!(acquire, 3);
                assert_eq!(services, vec!["user", "order"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_defaults() {
        let cli = Cli::try_parse_from(["lazypool", "check"]).unwrap();
        assert_eq!(cli.log_level, "info");
        assert!(matches!(cli.command, Commands::Check));
    }
}
