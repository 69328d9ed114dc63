//! Shared setup for commands that touch the library.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dlcache::config::ConfigFile;
use dlcache::logging::{init_logging, LoggingConfig, WorkerGuard};
use dlcache::{DownloadCache, Downloader, ReqwestTransport};
use tracing::{debug, info};

use crate::error::CliError;
use crate::ui::ProgressDisplay;

/// Options accepted by every subcommand.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub verbose: bool,
    pub cache_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Loaded configuration plus the logging guard for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    config_path: Option<PathBuf>,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Load the configuration file, apply global overrides, start logging.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let config_path = match &options.config {
            Some(path) => Some(path.clone()),
            None => ConfigFile::default_path().ok(),
        };
        let mut config = match &config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::default(),
        };
        if let Some(dir) = &options.cache_dir {
            config.cache.directory = dir.clone();
        }

        let log_guard = init_logging(&LoggingConfig {
            verbose: options.verbose,
            file: config.logging.file.clone(),
        })?;

        Ok(Self {
            config,
            config_path,
            _log_guard: log_guard,
        })
    }

    /// Effective configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Where the configuration was read from, when a location is known.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn log_startup(&self, command: &str) {
        info!(version = dlcache::VERSION, command, "dlcache starting");
        debug!(
            config = ?self.config_path,
            cache_dir = %self.config.cache.directory.display(),
            "Effective configuration"
        );
    }

    /// Download cache at the configured directory.
    pub fn cache(&self) -> DownloadCache {
        DownloadCache::new(&self.config.cache.directory)
    }

    /// Downloader over HTTP with the shared cache and a progress display.
    pub fn downloader(&self, progress: Arc<ProgressDisplay>) -> Downloader {
        Downloader::new(Arc::new(ReqwestTransport::new()))
            .with_cache(Arc::new(self.cache()))
            .with_listener(progress)
    }
}
