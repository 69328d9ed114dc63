//! Transport capability used by the orchestrator to fetch bytes.
//!
//! The orchestrator only sees the [`Transport`] trait: fetch one URL into a
//! writer, or fail with a classified [`TransportError`]. Proxy negotiation,
//! TLS, and redirects are the implementation's business. [`ReqwestTransport`]
//! is the production implementation; tests substitute scripted stubs.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::progress::ProgressReporter;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default read timeout for the whole response (5 minutes).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Buffer size for streaming response bodies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Failure reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection or stream failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// The connect or read timeout elapsed.
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// The server answered with a non-success status.
    #[error("server responded with {status_line}")]
    Protocol { status: u16, status_line: String },

    /// The request could not be built (bad header, client setup failure).
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl TransportError {
    /// I/O failures, timeouts, and 5xx responses are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::Timeout { .. } => true,
            Self::Protocol { status, .. } => *status >= 500,
            Self::Client(_) => false,
        }
    }

    /// HTTP status code, for protocol failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Connect and read timeouts for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }
}

/// Everything a transport needs to issue one request.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a Url,
    pub headers: &'a [(String, String)],
    pub credentials: Option<&'a Credentials>,
    pub timeouts: Timeouts,
}

/// Capability to fetch a URL into a byte sink.
pub trait Transport: Send + Sync {
    /// Stream the body of `request.url` into `sink`.
    ///
    /// Returns the number of bytes written.
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        sink: &mut dyn Write,
        progress: &ProgressReporter,
    ) -> Result<u64, TransportError>;
}

/// HTTP(S) transport backed by a blocking reqwest client.
///
/// Clients are built lazily and reused per connect timeout.
#[derive(Debug, Default)]
pub struct ReqwestTransport {
    clients: Mutex<HashMap<Duration, Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self, connect_timeout: Duration) -> Result<Client, TransportError> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(&connect_timeout) {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("dlcache/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Client(format!("failed to create HTTP client: {}", e)))?;
        clients.insert(connect_timeout, client.clone());
        Ok(client)
    }
}

impl Transport for ReqwestTransport {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        sink: &mut dyn Write,
        progress: &ProgressReporter,
    ) -> Result<u64, TransportError> {
        let client = self.client(request.timeouts.connect)?;
        let read_timeout_secs = request.timeouts.read.as_secs();

        let mut builder = client
            .get(request.url.as_str())
            .timeout(request.timeouts.read);
        for (name, value) in request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(credentials) = request.credentials {
            builder = builder.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        let mut response = builder
            .send()
            .map_err(|e| classify_reqwest_error(e, read_timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Protocol {
                status: status.as_u16(),
                status_line: format!(
                    "{} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("")
                )
                .trim_end()
                .to_string(),
            });
        }

        let total = response.content_length();
        debug!(url = %request.url, status = status.as_u16(), ?total, "Receiving response body");
        progress.initiate(total);

        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut downloaded = 0u64;
        loop {
            let bytes_read = match response.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout {
                        timeout_secs: read_timeout_secs,
                    })
                }
                Err(e) => return Err(TransportError::Io(format!("read error: {}", e))),
            };
            if bytes_read == 0 {
                break;
            }

            sink.write_all(&buffer[..bytes_read])
                .map_err(|e| TransportError::Io(format!("write error: {}", e)))?;
            downloaded += bytes_read as u64;
            progress.update(downloaded, total);
        }

        sink.flush()
            .map_err(|e| TransportError::Io(format!("write error: {}", e)))?;
        Ok(downloaded)
    }
}

fn classify_reqwest_error(error: reqwest::Error, timeout_secs: u64) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout { timeout_secs }
    } else if error.is_builder() {
        TransportError::Client(error.to_string())
    } else if let Some(status) = error.status() {
        TransportError::Protocol {
            status: status.as_u16(),
            status_line: status.to_string(),
        }
    } else {
        TransportError::Io(error.to_string())
    }
}
