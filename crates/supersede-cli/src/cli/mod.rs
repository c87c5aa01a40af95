//! CLI entry and dispatch.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{self, Config, LookupConfig};
use crate::logging;

mod commands;

#[derive(Parser)]
#[command(name = "supersede")]
#[command(version)]
#[command(about = "Latest-request-wins lookups: stale results never reach the screen")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use (default: $SUPERSEDE_HOME/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Looks up every stdin line as a query; only the latest query's result is shown
    Lookup(LookupArgs),
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Per-run overrides for the lookup settings in the config file.
#[derive(clap::Args, Debug, Clone, Default)]
struct LookupArgs {
    /// Base latency of one lookup in milliseconds
    #[arg(long, value_name = "MS")]
    latency_ms: Option<u64>,

    /// Latency removed per query character, in milliseconds
    #[arg(long, value_name = "MS")]
    per_char_ms: Option<u64>,

    /// Maximum matches printed per lookup
    #[arg(long, value_name = "N")]
    max_results: Option<usize>,

    /// Let superseded lookups run to completion instead of cancelling them
    #[arg(long = "no-cancel")]
    no_cancel: bool,

    /// Delay between consecutive queries, in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    interval_ms: u64,

    /// Also report lookups that were superseded
    #[arg(long)]
    show_stale: bool,

    /// Print pending-state transitions
    #[arg(long)]
    show_pending: bool,
}

impl LookupArgs {
    fn apply(&self, lookup: &mut LookupConfig) {
        if let Some(latency_ms) = self.latency_ms {
            lookup.latency_ms = latency_ms;
        }
        if let Some(per_char_ms) = self.per_char_ms {
            lookup.per_char_ms = per_char_ms;
        }
        if let Some(max_results) = self.max_results {
            lookup.max_results = max_results;
        }
        if self.no_cancel {
            lookup.cancel_superseded = false;
        }
    }
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Shows the config file path
    Path,
    /// Creates a config file with the commented defaults
    Init,
    /// Prints the default config (used to refresh default_config.toml)
    Generate,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config::paths::config_path()?,
    };

    match cli.command {
        Commands::Lookup(args) => {
            let mut config = Config::load_from(&config_path).context("load config")?;
            logging::init(&config.log_level);
            args.apply(&mut config.lookup);

            commands::lookup::run(
                &config.lookup,
                commands::lookup::LookupOptions {
                    interval: Duration::from_millis(args.interval_ms),
                    show_stale: args.show_stale,
                    show_pending: args.show_pending,
                },
            )
            .await
        }

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path(&config_path);
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(&config_path),
            ConfigCommands::Generate => commands::config::generate(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_args_override_config() {
        let mut lookup = LookupConfig::default();
        let args = LookupArgs {
            latency_ms: Some(10),
            max_results: Some(1),
            no_cancel: true,
            ..LookupArgs::default()
        };
        args.apply(&mut lookup);

        assert_eq!(lookup.latency_ms, 10);
        assert_eq!(lookup.per_char_ms, LookupConfig::default().per_char_ms);
        assert_eq!(lookup.max_results, 1);
        assert!(!lookup.cancel_superseded);
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
