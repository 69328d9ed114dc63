//! Cache-aware, retrying download orchestrator.
//!
//! Every call to [`Downloader::download`] runs the same sequence under the
//! destination's target lock:
//!
//! ```text
//! CHECK_LOCAL ─► CHECK_CACHE ─► FETCH ─► VALIDATE ─► INSTALL ─► done
//!                                 ▲          │
//!                                 └─retry────┘
//! ```
//!
//! Fetched bytes are staged next to the destination and only renamed into
//! place after they pass validation, so a concurrent reader never sees a
//! partial file.

use std::fs;
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::DownloadCache;
use crate::checksum;
use crate::error::{DownloadError, DownloadResult};
use crate::lock::TargetLockRegistry;
use crate::progress::{ProgressListener, ProgressReporter};
use crate::request::DownloadRequest;
use crate::staging::{copy_atomically, StagingFile};
use crate::transport::{FetchRequest, Transport};

/// How a download request was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The destination already held an acceptable file.
    AlreadyPresent,
    /// The destination was copied from the download cache.
    FromCache,
    /// The artifact was fetched from its source.
    Downloaded { attempts: u32, bytes: u64 },
    /// A soft failure was downgraded to a warning; the destination is absent.
    Skipped { reason: String },
}

impl DownloadOutcome {
    /// Whether the destination file was (re)written.
    pub fn did_work(&self) -> bool {
        matches!(self, Self::FromCache | Self::Downloaded { .. })
    }
}

/// Downloads artifacts through a [`Transport`], backed by an optional cache.
pub struct Downloader {
    transport: Arc<dyn Transport>,
    cache: Option<Arc<DownloadCache>>,
    locks: Arc<TargetLockRegistry>,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("cache", &self.cache.as_ref().map(|c| c.base_dir().to_path_buf()))
            .field("locks", &self.locks.len())
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl Downloader {
    /// Create a downloader without a cache, using the process-wide lock registry.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache: None,
            locks: TargetLockRegistry::global(),
            listener: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<DownloadCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a private lock registry instead of the process-wide one.
    pub fn with_lock_registry(mut self, locks: Arc<TargetLockRegistry>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// The download cache, if one is configured.
    pub fn cache(&self) -> Option<&Arc<DownloadCache>> {
        self.cache.as_ref()
    }

    /// Make `request.destination` hold the artifact named by `request.uri`.
    ///
    /// Soft failures (lock timeout, exhausted retries, client errors) are
    /// returned as [`DownloadOutcome::Skipped`] when the request does not
    /// fail on error. Configuration, filesystem, and cache install errors are
    /// always returned as errors.
    pub fn download(&self, request: &DownloadRequest) -> DownloadResult<DownloadOutcome> {
        let url = request.validate()?;
        let destination = &request.destination;

        let _lock = match self.locks.acquire(destination, request.lock_timeout) {
            Ok(lock) => lock,
            Err(e) => return soft_failure(request, e),
        };

        if !self.check_local(request)? {
            debug!(path = %destination.display(), "Destination already present, nothing to do");
            return Ok(DownloadOutcome::AlreadyPresent);
        }

        let cache = self.cache.as_deref().filter(|_| request.use_cache);
        let reporter = ProgressReporter::new(url.as_str(), self.listener.clone());

        if let Some(cache) = cache.filter(|_| !request.skip_cache) {
            if self.check_cache(cache, &url, request)? {
                return Ok(DownloadOutcome::FromCache);
            }
        } else {
            debug!(uri = %url, "Skipping cache lookup");
        }

        let (attempts, bytes) = match self.fetch_with_retries(&url, request, &reporter) {
            Ok(done) => done,
            Err(e) => return soft_failure(request, e),
        };

        if let Some(cache) = cache {
            cache
                .install(&url, destination, &request.checksums)
                .map_err(|source| DownloadError::CacheInstall {
                    url: url.to_string(),
                    source,
                })?;
        }

        reporter.complete(bytes);
        info!(
            uri = %url,
            path = %destination.display(),
            attempts,
            bytes,
            "Download complete"
        );
        Ok(DownloadOutcome::Downloaded { attempts, bytes })
    }

    /// Returns `true` when the destination needs to be (re)populated.
    fn check_local(&self, request: &DownloadRequest) -> DownloadResult<bool> {
        let destination = &request.destination;
        if !destination.exists() {
            return Ok(true);
        }

        if !request.overwrite {
            if !request.always_verify {
                return Ok(false);
            }
            match checksum::validate(destination, &request.checksums) {
                Ok(()) => return Ok(false),
                Err(e) => {
                    warn!(path = %destination.display(), error = %e, "Existing file failed verification, downloading again");
                }
            }
        }

        debug!(path = %destination.display(), "Removing existing destination");
        fs::remove_file(destination)
            .map_err(|e| DownloadError::io("remove existing file", destination, e))?;
        Ok(true)
    }

    /// Returns `true` when the destination was populated from the cache.
    fn check_cache(
        &self,
        cache: &DownloadCache,
        url: &Url,
        request: &DownloadRequest,
    ) -> DownloadResult<bool> {
        let cached = match cache.get_artifact(url, &request.checksums) {
            Ok(Some(path)) => path,
            Ok(None) => return Ok(false),
            Err(e) if e.is_configuration() => {
                return Err(DownloadError::Configuration(e.to_string()))
            }
            Err(e) => {
                warn!(uri = %url, error = %e, "Download cache lookup failed, fetching instead");
                return Ok(false);
            }
        };

        let destination = &request.destination;
        ensure_parent(request)?;
        let bytes = copy_atomically(&cached, destination)
            .map_err(|e| DownloadError::io("copy cached artifact to", destination, e))?;

        info!(
            uri = %url,
            path = %destination.display(),
            cached = %cached.display(),
            bytes,
            "Served from download cache"
        );
        Ok(true)
    }

    /// Run FETCH and VALIDATE until one attempt succeeds, the budget runs out,
    /// or the server rejects the request.
    ///
    /// Returns the number of attempts made and the size of the accepted file.
    /// Transport and integrity failures end as one [`DownloadError::Exhausted`];
    /// filesystem errors are returned as they are.
    fn fetch_with_retries(
        &self,
        url: &Url,
        request: &DownloadRequest,
        reporter: &ProgressReporter,
    ) -> DownloadResult<(u32, u64)> {
        ensure_parent(request)?;

        let max_attempts = request.max_attempts();
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max_attempts {
            if attempts > 0 {
                let delay = request.retry_policy.delay_for_retry(attempts);
                if !delay.is_zero() {
                    debug!(uri = %url, delay_ms = delay.as_millis() as u64, "Waiting before retry");
                    thread::sleep(delay);
                }
            }
            attempts += 1;
            debug!(uri = %url, attempt = attempts, max_attempts, "Fetching");

            let error = match self.fetch_once(url, request, reporter) {
                Ok(bytes) => return Ok((attempts, bytes)),
                Err(e) => e,
            };
            reporter.error(&error);

            if error.is_retriable() {
                warn!(
                    uri = %url,
                    attempt = attempts,
                    max_attempts,
                    error = %error,
                    "Download attempt failed"
                );
                last_error = Some(error);
                continue;
            }

            if matches!(error, DownloadError::PermanentTransport { .. }) {
                warn!(uri = %url, attempt = attempts, error = %error, "Permanent failure, not retrying");
                last_error = Some(error);
                break;
            }

            return Err(error);
        }

        let last = last_error.unwrap_or_else(|| {
            DownloadError::Configuration("no download attempt was made".to_string())
        });
        Err(DownloadError::Exhausted {
            url: url.to_string(),
            destination: request.destination.clone(),
            attempts,
            last: Box::new(last),
        })
    }

    fn fetch_once(
        &self,
        url: &Url,
        request: &DownloadRequest,
        reporter: &ProgressReporter,
    ) -> DownloadResult<u64> {
        let destination = &request.destination;
        let mut staging = StagingFile::create(destination)
            .map_err(|e| DownloadError::io("create staging file for", destination, e))?;

        let fetch = FetchRequest {
            url,
            headers: &request.headers,
            credentials: request.credentials.as_ref(),
            timeouts: request.timeouts,
        };
        let bytes = self
            .transport
            .fetch(&fetch, &mut staging, reporter)
            .map_err(|e| DownloadError::from_transport(url.as_str(), e))?;

        checksum::validate(staging.path(), &request.checksums)?;

        staging
            .commit()
            .map_err(|e| DownloadError::io("move downloaded file into place at", destination, e))?;
        Ok(bytes)
    }
}

fn ensure_parent(request: &DownloadRequest) -> DownloadResult<()> {
    match request.destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| DownloadError::io("create directory", parent, e)),
        _ => Ok(()),
    }
}

/// Raise `error`, or downgrade it to [`DownloadOutcome::Skipped`] when it is
/// soft and the request does not fail on error.
fn soft_failure(request: &DownloadRequest, error: DownloadError) -> DownloadResult<DownloadOutcome> {
    if request.fail_on_error || !error.is_soft() {
        error!(path = %request.destination.display(), error = %error, "Download failed");
        return Err(error);
    }
    warn!(path = %request.destination.display(), error = %error, "Download failed, continuing without the file");
    Ok(DownloadOutcome::Skipped {
        reason: error.to_string(),
    })
}
