//! Cache inspection CLI commands.

use clap::Subcommand;
use console::style;
use dlcache::cache::normalize_uri;

use super::common::parse_checksums;
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// List cached artifacts
    List,

    /// Show the cached file for a URI
    Lookup {
        /// Source URI
        uri: String,

        /// Only report a hit whose content matches algorithm:hexdigest (repeatable)
        #[arg(long = "checksum", value_name = "ALGO:HEX")]
        checksums: Vec<String>,
    },

    /// Print the cache directory
    Path,
}

/// Run a cache subcommand.
pub fn run(global: &GlobalOptions, action: CacheAction) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    let cache = runner.cache();

    match action {
        CacheAction::List => {
            let entries = cache.entries()?;
            println!("Download cache: {}", cache.base_dir().display());
            if entries.is_empty() {
                println!("  (empty)");
                return Ok(());
            }
            for entry in &entries {
                let installed = entry
                    .installed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                let marker = if entry.present {
                    style("●").green()
                } else {
                    style("○").red()
                };
                println!("  {} {}  {}", marker, installed, entry.uri);
                println!("      {}", style(&entry.file_name).dim());
            }
            println!();
            println!("{} entries", entries.len());
            Ok(())
        }
        CacheAction::Lookup { uri, checksums } => {
            let url = normalize_uri(&uri).map_err(|e| CliError::Usage(e.to_string()))?;
            let checksums = parse_checksums(&checksums)?;
            match cache.get_artifact(&url, &checksums)? {
                Some(path) => {
                    println!("{}", path.display());
                    Ok(())
                }
                None => Err(CliError::Usage(format!("Not cached: {}", url))),
            }
        }
        CacheAction::Path => {
            println!("{}", cache.base_dir().display());
            Ok(())
        }
    }
}
