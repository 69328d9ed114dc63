//! Per-download request parameters.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::cache::{normalize_uri, original_file_name};
use crate::checksum::{ChecksumAlgorithm, ChecksumSet};
use crate::config::DownloadSettings;
use crate::error::{DownloadError, DownloadResult};
use crate::policy::RetryPolicy;
use crate::transport::{Credentials, Timeouts};

/// Default number of fetch attempts.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default maximum wait for the destination lock (5 minutes).
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 300;

/// One artifact to download: where from, where to, and how strictly.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Source URI, possibly carrying a leading `[label]` annotation.
    pub uri: String,

    /// Final location of the artifact.
    pub destination: PathBuf,

    /// Expected digests. Empty means "no integrity claim".
    pub checksums: ChecksumSet,

    /// Maximum number of fetch attempts. Zero behaves like one.
    pub retries: u32,

    /// How long to wait for another download of the same destination.
    pub lock_timeout: Duration,

    /// Replace an existing destination file instead of keeping it.
    pub overwrite: bool,

    /// Ignore cached copies; the fetched file is still installed.
    pub skip_cache: bool,

    /// Consult and populate the download cache at all.
    pub use_cache: bool,

    /// Re-check an existing destination file and refetch it if it fails.
    pub always_verify: bool,

    /// Raise soft failures instead of skipping with a warning.
    pub fail_on_error: bool,

    /// Extra request headers.
    pub headers: Vec<(String, String)>,

    /// Basic-auth credentials.
    pub credentials: Option<Credentials>,

    pub timeouts: Timeouts,

    /// Pause between attempts.
    pub retry_policy: RetryPolicy,
}

impl DownloadRequest {
    /// Create a request with default settings.
    pub fn new(uri: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            uri: uri.into(),
            destination: destination.into(),
            checksums: ChecksumSet::new(),
            retries: DEFAULT_RETRIES,
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            overwrite: true,
            skip_cache: false,
            use_cache: true,
            always_verify: false,
            fail_on_error: true,
            headers: Vec::new(),
            credentials: None,
            timeouts: Timeouts::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Create a request whose destination is `dir` joined with the file name
    /// taken from the URI path.
    pub fn into_directory(uri: impl Into<String>, dir: &Path) -> DownloadResult<Self> {
        let uri = uri.into();
        let url = parse_uri(&uri)?;
        let destination = dir.join(original_file_name(&url));
        Ok(Self::new(uri, destination))
    }

    /// Add an expected digest.
    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Self {
        self.checksums.insert(algorithm, digest);
        self
    }

    /// Replace the expected digests.
    pub fn with_checksums(mut self, checksums: ChecksumSet) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_skip_cache(mut self, skip: bool) -> Self {
        self.skip_cache = skip;
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_always_verify(mut self, always_verify: bool) -> Self {
        self.always_verify = always_verify;
        self
    }

    pub fn with_fail_on_error(mut self, fail_on_error: bool) -> Self {
        self.fail_on_error = fail_on_error;
        self
    }

    /// Add a request header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connect = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.read = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Take retries, timeouts, and fail-on-error from process settings.
    pub fn apply_settings(mut self, settings: &DownloadSettings) -> Self {
        self.retries = settings.retries;
        self.lock_timeout = settings.lock_timeout;
        self.fail_on_error = settings.fail_on_error;
        self.timeouts = Timeouts {
            connect: settings.connect_timeout,
            read: settings.read_timeout,
        };
        self
    }

    /// Effective number of fetch attempts.
    pub fn max_attempts(&self) -> u32 {
        self.retries.max(1)
    }

    /// Check the request for malformed or conflicting parameters.
    ///
    /// Returns the normalized source URL.
    pub fn validate(&self) -> DownloadResult<Url> {
        let url = parse_uri(&self.uri)?;

        if self.destination.file_name().is_none() {
            return Err(DownloadError::Configuration(format!(
                "destination {} does not name a file",
                self.destination.display()
            )));
        }

        self.checksums
            .check_format()
            .map_err(|e| DownloadError::Configuration(e.to_string()))?;

        if self.always_verify && self.checksums.is_empty() {
            return Err(DownloadError::Configuration(
                "always_verify requires at least one checksum".to_string(),
            ));
        }

        Ok(url)
    }
}

fn parse_uri(uri: &str) -> DownloadResult<Url> {
    if uri.trim().is_empty() {
        return Err(DownloadError::Configuration(
            "source URI is empty".to_string(),
        ));
    }
    normalize_uri(uri).map_err(|e| DownloadError::Configuration(e.to_string()))
}
