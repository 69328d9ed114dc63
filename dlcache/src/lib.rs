//! dlcache - fetch remote artifacts once and serve them from a shared cache
//!
//! A [`Downloader`] places one remote artifact at a destination path. It
//! serializes concurrent work on the same destination, consults a shared
//! on-disk [`DownloadCache`], fetches through a [`Transport`] with retries,
//! and accepts the file only once it matches the caller's checksums.
//!
//! ```ignore
//! use std::sync::Arc;
//! use dlcache::{ChecksumAlgorithm, DownloadCache, DownloadRequest, Downloader, ReqwestTransport};
//!
//! let cache = Arc::new(DownloadCache::new("/var/cache/dlcache"));
//! let downloader = Downloader::new(Arc::new(ReqwestTransport::new())).with_cache(cache);
//!
//! let request = DownloadRequest::new("https://example.com/lib-1.0.jar", "out/lib-1.0.jar")
//!     .with_checksum(ChecksumAlgorithm::Sha256, "…");
//! let outcome = downloader.download(&request)?;
//! ```

pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod policy;
pub mod progress;
pub mod request;
pub mod staging;
pub mod transport;

pub use cache::{CacheEntry, CacheError, DownloadCache};
pub use checksum::{ChecksumAlgorithm, ChecksumError, ChecksumSet};
pub use config::{ConfigError, ConfigFile};
pub use error::{DownloadError, DownloadResult};
pub use lock::{TargetLock, TargetLockRegistry};
pub use orchestrator::{DownloadOutcome, Downloader};
pub use policy::RetryPolicy;
pub use progress::{ProgressEvent, ProgressListener, ProgressReporter};
pub use request::DownloadRequest;
pub use transport::{Credentials, FetchRequest, ReqwestTransport, Timeouts, Transport, TransportError};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
