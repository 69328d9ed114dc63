//! Configuration CLI commands.

use clap::Subcommand;

use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,

    /// Write the effective configuration to the configuration file
    Init,
}

/// Run a config subcommand.
pub fn run(global: &GlobalOptions, command: Option<ConfigCommands>) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    match command.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => run_show(&runner),
        ConfigCommands::Path => run_path(&runner),
        ConfigCommands::Init => run_init(&runner),
    }
}

/// Print every setting in INI layout.
fn run_show(runner: &CliRunner) -> Result<(), CliError> {
    let config = runner.config();
    match runner.config_path() {
        Some(path) if path.exists() => println!("# Loaded from {}", path.display()),
        Some(path) => println!("# {} does not exist, showing defaults", path.display()),
        None => println!("# No configuration directory, showing defaults"),
    }
    println!();

    println!("[cache]");
    println!("directory = {}", config.cache.directory.display());
    println!();

    let download = &config.download;
    println!("[download]");
    println!("retries = {}", download.retries);
    println!("connect_timeout_secs = {}", download.connect_timeout.as_secs());
    println!("read_timeout_secs = {}", download.read_timeout.as_secs());
    println!("lock_timeout_secs = {}", download.lock_timeout.as_secs());
    println!("fail_on_error = {}", download.fail_on_error);
    println!();

    println!("[logging]");
    match &config.logging.file {
        Some(file) => println!("file = {}", file.display()),
        None => println!("file = (not set)"),
    }
    Ok(())
}

fn run_path(runner: &CliRunner) -> Result<(), CliError> {
    let path = runner
        .config_path()
        .ok_or_else(|| CliError::Config("could not determine the configuration directory".to_string()))?;
    println!("{}", path.display());
    Ok(())
}

/// Save the configuration, creating the file with defaults when missing.
fn run_init(runner: &CliRunner) -> Result<(), CliError> {
    let path = runner
        .config_path()
        .ok_or_else(|| CliError::Config("could not determine the configuration directory".to_string()))?;
    runner.config().save_to(path)?;
    println!("Configuration file: {}", path.display());
    println!("CLI arguments override config file values when specified.");
    Ok(())
}
