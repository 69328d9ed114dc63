//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use dlcache::config::ConfigError;
use dlcache::logging::LoggingError;
use dlcache::{CacheError, ChecksumError, DownloadError};

/// Errors reported by CLI commands.
///
/// Every variant exits the process with status 1 after a single
/// `Error: ...` line on stderr.
#[derive(Debug)]
pub enum CliError {
    /// Bad command-line input.
    Usage(String),
    /// Configuration file problem.
    Config(String),
    /// Logging could not be initialized.
    Logging(LoggingError),
    /// A download failed.
    Download(DownloadError),
    /// A cache operation failed.
    Cache(CacheError),
    /// A file could not be hashed or did not match.
    Checksum(ChecksumError),
    /// A file to inspect does not exist.
    MissingFile(PathBuf),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Download(e) => write!(f, "{}", e),
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::Checksum(e) => write!(f, "{}", e),
            CliError::MissingFile(path) => write!(f, "No such file: {}", path.display()),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Download(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::Checksum(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<DownloadError> for CliError {
    fn from(e: DownloadError) -> Self {
        CliError::Download(e)
    }
}

impl From<CacheError> for CliError {
    fn from(e: CacheError) -> Self {
        CliError::Cache(e)
    }
}

impl From<ChecksumError> for CliError {
    fn from(e: ChecksumError) -> Self {
        CliError::Checksum(e)
    }
}
