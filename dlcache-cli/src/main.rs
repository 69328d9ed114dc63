//! dlcache CLI - fetch artifacts through the shared download cache.

mod commands;
mod error;
mod runner;
mod ui;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::cache::CacheAction;
use commands::config::ConfigCommands;
use commands::digest::DigestArgs;
use commands::fetch::FetchArgs;
use commands::verify::VerifyArgs;
use error::CliError;
use runner::GlobalOptions;

#[derive(Debug, Parser)]
#[command(name = "dlcache")]
#[command(version = dlcache::VERSION)]
#[command(about = "Download artifacts once and reuse them from a shared cache", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Override the cache directory from the configuration file
    #[arg(long, global = true, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download an artifact to a destination path
    Fetch(FetchArgs),

    /// Check a file against expected checksums
    Verify(VerifyArgs),

    /// Print the checksum of a file
    Digest(DigestArgs),

    /// Inspect the download cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show or initialize the configuration file
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

fn main() {
    let cli = Cli::parse();
    let global = GlobalOptions {
        verbose: cli.verbose,
        cache_dir: cli.cache_dir,
        config: cli.config,
    };

    if let Err(e) = run(&global, cli.command) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run(global: &GlobalOptions, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Fetch(args) => commands::fetch::run(global, args),
        Commands::Verify(args) => commands::verify::run(args),
        Commands::Digest(args) => commands::digest::run(args),
        Commands::Cache { action } => commands::cache::run(global, action),
        Commands::Config { command } => commands::config::run(global, command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fetch_arguments() {
        let cli = Cli::try_parse_from([
            "dlcache",
            "--verbose",
            "fetch",
            "https://host/a.jar",
            "out/a.jar",
            "--checksum",
            "sha256:00",
            "--checksum",
            "md5:11",
            "--no-overwrite",
            "--header",
            "X-Token: abc",
            "--retries",
            "5",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Fetch(args) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(args.checksums.len(), 2);
        assert!(args.no_overwrite);
        assert_eq!(args.retries, Some(5));
        assert_eq!(args.headers, vec!["X-Token: abc".to_string()]);
    }

    #[test]
    fn test_password_requires_user() {
        let result = Cli::try_parse_from([
            "dlcache",
            "fetch",
            "https://host/a.jar",
            "a.jar",
            "--password",
            "secret",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cache_dir_is_global() {
        let cli = Cli::try_parse_from(["dlcache", "cache", "list", "--cache-dir", "/tmp/c"]).unwrap();
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/c")));
    }

    #[test]
    fn test_config_defaults_to_show() {
        let cli = Cli::try_parse_from(["dlcache", "config"]).unwrap();
        assert!(matches!(cli.command, Commands::Config { command: None }));
    }
}
