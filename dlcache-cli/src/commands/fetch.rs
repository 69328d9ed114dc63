//! Fetch command - download one artifact through the cache.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use console::style;
use dlcache::{Credentials, DownloadOutcome, DownloadRequest};

use super::common::{format_size, parse_checksums, parse_header};
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};
use crate::ui::ProgressDisplay;

/// Arguments for the fetch command.
#[derive(Debug, clap::Args)]
pub struct FetchArgs {
    /// Source URI
    pub uri: String,

    /// Destination file, or an existing directory to download into
    pub dest: PathBuf,

    /// Expected checksum as algorithm:hexdigest (repeatable)
    #[arg(long = "checksum", value_name = "ALGO:HEX")]
    pub checksums: Vec<String>,

    /// Maximum number of fetch attempts
    #[arg(long)]
    pub retries: Option<u32>,

    /// Seconds to wait for another download of the same destination
    #[arg(long, value_name = "SECS")]
    pub lock_timeout: Option<u64>,

    /// Replace an existing destination file (default)
    #[arg(long, overrides_with = "no_overwrite")]
    pub overwrite: bool,

    /// Keep an existing destination file
    #[arg(long, overrides_with = "overwrite")]
    pub no_overwrite: bool,

    /// Ignore cached copies but still populate the cache
    #[arg(long)]
    pub skip_cache: bool,

    /// Do not read or write the cache at all
    #[arg(long)]
    pub no_cache: bool,

    /// Re-verify an existing destination file against the checksums
    #[arg(long)]
    pub always_verify: bool,

    /// Report failures as warnings and exit successfully
    #[arg(long)]
    pub continue_on_error: bool,

    /// Extra request header as Name:value (repeatable)
    #[arg(long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Basic-auth user name
    #[arg(long)]
    pub user: Option<String>,

    /// Basic-auth password
    #[arg(long, requires = "user")]
    pub password: Option<String>,

    /// Connect timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<u64>,

    /// Read timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub read_timeout: Option<u64>,
}

/// Run the fetch command.
pub fn run(global: &GlobalOptions, args: FetchArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(global)?;
    runner.log_startup("fetch");

    let request = build_request(&runner, &args)?;
    let progress = Arc::new(ProgressDisplay::new());
    let downloader = runner.downloader(progress);

    let outcome = downloader.download(&request)?;
    let dest = request.destination.display();
    match outcome {
        DownloadOutcome::AlreadyPresent => {
            println!("{} {} (already present)", style("Up to date:").green(), dest)
        }
        DownloadOutcome::FromCache => {
            println!("{} {} (from cache)", style("Fetched:").green(), dest)
        }
        DownloadOutcome::Downloaded { attempts, bytes } => println!(
            "{} {} ({}, {} attempt{})",
            style("Fetched:").green(),
            dest,
            format_size(bytes),
            attempts,
            if attempts == 1 { "" } else { "s" }
        ),
        DownloadOutcome::Skipped { reason } => {
            println!("{} {}: {}", style("Skipped:").yellow(), dest, reason)
        }
    }
    Ok(())
}

/// Combine configuration defaults with command-line overrides.
fn build_request(runner: &CliRunner, args: &FetchArgs) -> Result<DownloadRequest, CliError> {
    let mut request = if args.dest.is_dir() {
        DownloadRequest::into_directory(&args.uri, &args.dest)?
    } else {
        DownloadRequest::new(&args.uri, &args.dest)
    };
    request = request
        .apply_settings(&runner.config().download)
        .with_checksums(parse_checksums(&args.checksums)?)
        .with_overwrite(!args.no_overwrite || args.overwrite)
        .with_skip_cache(args.skip_cache)
        .with_use_cache(!args.no_cache)
        .with_always_verify(args.always_verify);

    if args.continue_on_error {
        request = request.with_fail_on_error(false);
    }
    if let Some(retries) = args.retries {
        request = request.with_retries(retries);
    }
    if let Some(secs) = args.lock_timeout {
        request = request.with_lock_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.connect_timeout {
        request = request.with_connect_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.read_timeout {
        request = request.with_read_timeout(Duration::from_secs(secs));
    }
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        request = request.with_header(name, value);
    }
    if let Some(user) = &args.user {
        request = request.with_credentials(Credentials::new(user, args.password.clone()));
    }

    request.validate()?;
    Ok(request)
}
