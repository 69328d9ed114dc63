//! Verify command - check a local file against expected checksums.

use std::path::PathBuf;

use console::style;
use dlcache::checksum;

use super::common::parse_checksums;
use crate::error::CliError;

/// Arguments for the verify command.
#[derive(Debug, clap::Args)]
pub struct VerifyArgs {
    /// File to verify
    pub file: PathBuf,

    /// Expected checksum as algorithm:hexdigest (repeatable)
    #[arg(long = "checksum", value_name = "ALGO:HEX", required = true)]
    pub checksums: Vec<String>,
}

/// Run the verify command.
pub fn run(args: VerifyArgs) -> Result<(), CliError> {
    if !args.file.is_file() {
        return Err(CliError::MissingFile(args.file));
    }
    let checksums = parse_checksums(&args.checksums)?;
    checksum::validate(&args.file, &checksums)?;

    for (algorithm, _) in checksums.iter() {
        println!("{} {} {}", style("OK").green(), algorithm, args.file.display());
    }
    Ok(())
}
