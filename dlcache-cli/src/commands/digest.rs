//! Digest command - print a file's checksum.

use std::path::PathBuf;

use dlcache::checksum::{self, ChecksumAlgorithm};

use crate::error::CliError;

/// Arguments for the digest command.
#[derive(Debug, clap::Args)]
pub struct DigestArgs {
    /// File to hash
    pub file: PathBuf,

    /// Algorithm: md5, sha1, sha256, sha384 or sha512
    #[arg(long, short, default_value = "sha256", value_parser = parse_algorithm)]
    pub algorithm: ChecksumAlgorithm,
}

/// Run the digest command.
///
/// Output is `algorithm:hex  path`, ready to paste into `--checksum`.
pub fn run(args: DigestArgs) -> Result<(), CliError> {
    if !args.file.is_file() {
        return Err(CliError::MissingFile(args.file));
    }
    let digest = checksum::digest_file(&args.file, args.algorithm)?;
    println!(
        "{}:{}  {}",
        args.algorithm.name().to_lowercase().replace('-', ""),
        digest,
        args.file.display()
    );
    Ok(())
}

fn parse_algorithm(raw: &str) -> Result<ChecksumAlgorithm, String> {
    raw.parse().map_err(|e: checksum::ChecksumError| e.to_string())
}
