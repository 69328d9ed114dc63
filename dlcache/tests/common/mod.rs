//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use dlcache::{
    DownloadRequest, FetchRequest, ProgressReporter, RetryPolicy, Transport, TransportError,
};

pub const HELLO: &[u8] = b"hello world";
pub const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
pub const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

/// One scripted transport response.
#[derive(Debug, Clone)]
pub enum Step {
    Body(Vec<u8>),
    Fail(TransportError),
}

impl Step {
    pub fn body(bytes: &[u8]) -> Self {
        Self::Body(bytes.to_vec())
    }

    pub fn status(status: u16) -> Self {
        Self::Fail(TransportError::Protocol {
            status,
            status_line: format!("{} scripted", status),
        })
    }

    pub fn io(message: &str) -> Self {
        Self::Fail(TransportError::Io(message.to_string()))
    }
}

/// Transport that replays a script; the last step repeats forever.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    last: Step,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Self::with_delay(steps, Duration::ZERO)
    }

    /// Sleep for `delay` in the middle of writing each body.
    pub fn with_delay(steps: Vec<Step>, delay: Duration) -> Arc<Self> {
        let mut steps: VecDeque<Step> = steps.into();
        let last = steps.back().cloned().unwrap_or_else(|| Step::io("empty script"));
        if steps.len() == 1 {
            steps.clear();
        }
        Arc::new(Self {
            steps: Mutex::new(steps),
            last,
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    /// Always answer with `body`.
    pub fn serving(body: &[u8]) -> Arc<Self> {
        Self::new(vec![Step::body(body)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of fetches observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    fn next_step(&self) -> Step {
        self.steps.lock().pop_front().unwrap_or_else(|| self.last.clone())
    }
}

impl Transport for ScriptedTransport {
    fn fetch(
        &self,
        request: &FetchRequest<'_>,
        sink: &mut dyn Write,
        progress: &ProgressReporter,
    ) -> Result<u64, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(request.url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match self.next_step() {
            Step::Body(body) => {
                progress.initiate(Some(body.len() as u64));
                let (head, tail) = body.split_at(body.len() / 2);
                write_chunk(sink, head)
                    .and_then(|_| {
                        thread::sleep(self.delay);
                        write_chunk(sink, tail)
                    })
                    .map(|_| {
                        progress.update(body.len() as u64, Some(body.len() as u64));
                        body.len() as u64
                    })
            }
            Step::Fail(error) => Err(error),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn write_chunk(sink: &mut dyn Write, chunk: &[u8]) -> Result<(), TransportError> {
    sink.write_all(chunk)
        .and_then(|_| sink.flush())
        .map_err(|e| TransportError::Io(e.to_string()))
}

/// Request with no backoff so retry tests run instantly.
pub fn request(uri: &str, destination: impl Into<std::path::PathBuf>) -> DownloadRequest {
    DownloadRequest::new(uri, destination).with_retry_policy(RetryPolicy::None)
}
