//! Process-wide configuration file.
//!
//! Settings live in an INI file at `<config dir>/dlcache/config.ini`:
//!
//! ```ini
//! [cache]
//! directory = ~/.cache/dlcache
//!
//! [download]
//! retries = 3
//! connect_timeout_secs = 30
//! read_timeout_secs = 300
//! lock_timeout_secs = 300
//! fail_on_error = true
//!
//! [logging]
//! file = ~/.local/state/dlcache/dlcache.log
//! ```
//!
//! A missing file or key falls back to the default. A value that does not
//! parse is an error naming the section and key.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::request::{DEFAULT_LOCK_TIMEOUT_SECS, DEFAULT_RETRIES};
use crate::transport::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS};

/// Directory name used under the platform config and cache directories.
const APP_DIR: &str = "dlcache";

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.ini";

const SECTION_CACHE: &str = "cache";
const SECTION_DOWNLOAD: &str = "download";
const SECTION_LOGGING: &str = "logging";

/// Errors raised while reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but is not valid INI.
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// The file could not be written.
    #[error("failed to write config file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A key holds a value of the wrong type.
    #[error("invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    /// The platform has no configuration directory.
    #[error("could not determine the configuration directory")]
    NoConfigDir,
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Base directory of the download cache.
    pub directory: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_dir(),
        }
    }
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub retries: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub lock_timeout: Duration,
    pub fail_on_error: bool,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            fail_on_error: true,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Optional log file in addition to stderr.
    pub file: Option<PathBuf>,
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub cache: CacheSettings,
    pub download: DownloadSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Default location of the configuration file.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`, or return defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_ini(&ini)
    }

    /// Write to `path`, creating its directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_failed = |e| ConfigError::Write {
            path: path.to_path_buf(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        self.to_ini().write_to_file(path).map_err(write_failed)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = value(ini, SECTION_CACHE, "directory") {
            config.cache.directory = expand_tilde(dir);
        }

        let download = &mut config.download;
        if let Some(v) = value(ini, SECTION_DOWNLOAD, "retries") {
            download.retries = parse(SECTION_DOWNLOAD, "retries", v)?;
        }
        if let Some(v) = value(ini, SECTION_DOWNLOAD, "connect_timeout_secs") {
            download.connect_timeout =
                Duration::from_secs(parse(SECTION_DOWNLOAD, "connect_timeout_secs", v)?);
        }
        if let Some(v) = value(ini, SECTION_DOWNLOAD, "read_timeout_secs") {
            download.read_timeout =
                Duration::from_secs(parse(SECTION_DOWNLOAD, "read_timeout_secs", v)?);
        }
        if let Some(v) = value(ini, SECTION_DOWNLOAD, "lock_timeout_secs") {
            download.lock_timeout =
                Duration::from_secs(parse(SECTION_DOWNLOAD, "lock_timeout_secs", v)?);
        }
        if let Some(v) = value(ini, SECTION_DOWNLOAD, "fail_on_error") {
            download.fail_on_error = parse_bool(SECTION_DOWNLOAD, "fail_on_error", v)?;
        }

        config.logging.file = value(ini, SECTION_LOGGING, "file").map(expand_tilde);

        Ok(config)
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some(SECTION_CACHE))
            .set("directory", self.cache.directory.to_string_lossy());
        ini.with_section(Some(SECTION_DOWNLOAD))
            .set("retries", self.download.retries.to_string())
            .set(
                "connect_timeout_secs",
                self.download.connect_timeout.as_secs().to_string(),
            )
            .set(
                "read_timeout_secs",
                self.download.read_timeout.as_secs().to_string(),
            )
            .set(
                "lock_timeout_secs",
                self.download.lock_timeout.as_secs().to_string(),
            )
            .set("fail_on_error", self.download.fail_on_error.to_string());
        if let Some(file) = &self.logging.file {
            ini.with_section(Some(SECTION_LOGGING))
                .set("file", file.to_string_lossy());
        }
        ini
    }
}

/// Default cache directory: `<platform cache dir>/dlcache`.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Expand a leading `~` to the home directory.
pub fn expand_tilde(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

fn value<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse<T: std::str::FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value)),
    }
}
