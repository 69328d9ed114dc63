//! Cache key normalization and cache file naming.
//!
//! Two spellings of the same resource must land on the same cache entry, so
//! every URI is canonicalized before it is used as a key:
//!
//! - leading out-of-band annotations such as `[Authorization: ...]` or
//!   `[mirror=eu] ` are stripped from the raw text;
//! - the URL parser lowercases the host and drops ports that equal the
//!   scheme's default (`https://host:443/a` becomes `https://host/a`);
//! - fragments are removed since they never reach the server.
//!
//! User-info is preserved: `https://alice@host/a` and `https://host/a` may
//! legitimately serve different content.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;
use url::Url;

/// Number of hex characters of the URI hash appended to cache file names.
const URI_HASH_LEN: usize = 32;

/// File name used when a URI has no usable last path segment.
const FALLBACK_FILE_NAME: &str = "download";

/// A URI that could not be parsed after annotation stripping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid URI '{uri}': {reason}")]
pub struct InvalidUri {
    pub uri: String,
    pub reason: String,
}

fn annotation_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // One or more bracketed annotations, each optionally followed by whitespace.
    PATTERN.get_or_init(|| Regex::new(r"^\s*(?:\[[^\]]*\]\s*)+").expect("valid annotation regex"))
}

/// Canonicalize a raw URI string for use as a cache key.
pub fn normalize_uri(raw: &str) -> Result<Url, InvalidUri> {
    let stripped = annotation_prefix().replace(raw, "");
    let trimmed = stripped.trim();

    let mut url = Url::parse(trimmed).map_err(|e| InvalidUri {
        uri: raw.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(InvalidUri {
            uri: raw.to_string(),
            reason: "URI has no authority or path".to_string(),
        });
    }

    // The parser already elides known default ports; this covers schemes it
    // does not know about but where an explicit default still shows up.
    if url.port().is_some() && url.port() == default_port(url.scheme()) {
        let _ = url.set_port(None);
    }
    url.set_fragment(None);

    Ok(url)
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        "ftp" => Some(21),
        _ => None,
    }
}

/// The cache key string for an already-normalized URI.
pub fn cache_key(url: &Url) -> &str {
    url.as_str()
}

/// Last non-empty path segment of the URI, sanitized for use as a file name.
pub fn original_file_name(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .unwrap_or("");

    let sanitized: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        FALLBACK_FILE_NAME.to_string()
    } else {
        sanitized
    }
}

/// Deterministic cache file name: `<originalFileName>_<hashOfSourceURI>`.
///
/// The hash depends only on the normalized URI, never on content, so it is
/// stable across runs and processes.
pub fn cached_file_name(url: &Url) -> String {
    let digest = hex::encode(Sha256::digest(cache_key(url).as_bytes()));
    format!("{}_{}", original_file_name(url), &digest[..URI_HASH_LEN])
}
