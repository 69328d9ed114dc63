//! Error types for download orchestration.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::checksum::ChecksumError;
use crate::transport::TransportError;

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

/// Errors that can occur while downloading an artifact.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Invalid or conflicting request parameters, or a misconfigured cache.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A fetched or existing file failed checksum verification.
    #[error(transparent)]
    Integrity(#[from] ChecksumError),

    /// A fetch failure that may succeed when retried (I/O, timeout, HTTP 5xx).
    #[error("transient failure fetching {url}: {source}")]
    TransientTransport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// A fetch failure that retrying will not fix (HTTP 4xx and similar).
    #[error("failed to fetch {url}: {source}")]
    PermanentTransport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// The destination lock was not acquired in time.
    #[error("timed out after {}s waiting for the lock on {}", .waited.as_secs_f32(), .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// The artifact was downloaded but could not be added to the cache.
    #[error("failed to install {url} into the download cache: {source}")]
    CacheInstall {
        url: String,
        #[source]
        source: CacheError,
    },

    /// A filesystem operation on the destination failed.
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Every attempt failed; carries the last underlying cause.
    #[error("failed to download {url} to {} after {attempts} attempt(s): {last}", .destination.display())]
    Exhausted {
        url: String,
        destination: PathBuf,
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Whether the retry loop may try again after this error.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TransientTransport { .. } | Self::Integrity(_))
    }

    /// Whether `fail_on_error = false` may downgrade this error to a warning.
    ///
    /// Only failures caused by the remote or by contention qualify;
    /// configuration, filesystem, and cache install errors never do.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::Exhausted { .. } | Self::PermanentTransport { .. } | Self::LockTimeout { .. }
        )
    }

    /// Build the transport variant matching the error's classification.
    pub fn from_transport(url: &str, source: TransportError) -> Self {
        if source.is_transient() {
            Self::TransientTransport {
                url: url.to_string(),
                source,
            }
        } else {
            Self::PermanentTransport {
                url: url.to_string(),
                source,
            }
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;

    #[test]
    fn test_transport_classification() {
        let server = DownloadError::from_transport(
            "https://h/a",
            TransportError::Protocol {
                status: 503,
                status_line: "503 Service Unavailable".to_string(),
            },
        );
        assert!(matches!(server, DownloadError::TransientTransport { .. }));
        assert!(server.is_retriable());

        let client = DownloadError::from_transport(
            "https://h/a",
            TransportError::Protocol {
                status: 404,
                status_line: "404 Not Found".to_string(),
            },
        );
        assert!(matches!(client, DownloadError::PermanentTransport { .. }));
        assert!(!client.is_retriable());
    }

    #[test]
    fn test_integrity_is_retriable() {
        let err = DownloadError::from(ChecksumError::Mismatch {
            algorithm: ChecksumAlgorithm::Sha256,
            path: PathBuf::from("/tmp/a"),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        });
        assert!(err.is_retriable());
        assert!(err.to_string().contains("SHA-256 checksum mismatch"));
    }

    #[test]
    fn test_exhausted_display_names_destination_attempts_and_cause() {
        let err = DownloadError::Exhausted {
            url: "https://h/a.zip".to_string(),
            destination: PathBuf::from("/out/a.zip"),
            attempts: 3,
            last: Box::new(DownloadError::from_transport(
                "https://h/a.zip",
                TransportError::Io("connection refused".to_string()),
            )),
        };
        let message = err.to_string();
        assert!(message.contains("/out/a.zip"));
        assert!(message.contains("3 attempt(s)"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_only_remote_and_contention_failures_are_soft() {
        let lock = DownloadError::LockTimeout {
            path: PathBuf::from("/out/a.zip"),
            waited: Duration::from_secs(1),
        };
        let io = DownloadError::io(
            "create directory",
            "/out",
            io::Error::new(io::ErrorKind::AlreadyExists, "File exists"),
        );

        assert!(lock.is_soft());
        assert!(!io.is_soft());
        assert!(!DownloadError::Configuration("bad".to_string()).is_soft());
    }

    #[test]
    fn test_lock_timeout_display() {
        let err = DownloadError::LockTimeout {
            path: PathBuf::from("/out/a.zip"),
            waited: Duration::from_secs(2),
        };
        assert!(!err.is_retriable());
        assert!(err.to_string().contains("/out/a.zip"));
    }
}
