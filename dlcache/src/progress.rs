//! Fire-and-forget progress events for a single download.
//!
//! Listeners observe a fetch as it happens but have no way to influence it:
//! the callback returns nothing and the orchestrator never inspects listener
//! state.

use std::fmt;
use std::sync::Arc;

/// A progress notification for one source URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A fetch attempt has started; `total` is the announced length, if any.
    Initiate { uri: String, total: Option<u64> },
    /// Bytes received so far in the current attempt.
    Update {
        uri: String,
        downloaded: u64,
        total: Option<u64>,
    },
    /// The artifact is in place at its destination.
    Complete { uri: String, bytes: u64 },
    /// The current attempt failed.
    Error { uri: String, message: String },
}

impl ProgressEvent {
    /// The URI this event refers to.
    pub fn uri(&self) -> &str {
        match self {
            Self::Initiate { uri, .. }
            | Self::Update { uri, .. }
            | Self::Complete { uri, .. }
            | Self::Error { uri, .. } => uri,
        }
    }
}

/// Receiver of progress events.
pub trait ProgressListener: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Emits events for one URI to an optional listener.
#[derive(Clone)]
pub struct ProgressReporter {
    uri: String,
    listener: Option<Arc<dyn ProgressListener>>,
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("uri", &self.uri)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(uri: impl Into<String>, listener: Option<Arc<dyn ProgressListener>>) -> Self {
        Self {
            uri: uri.into(),
            listener,
        }
    }

    /// A reporter that drops every event.
    pub fn silent(uri: impl Into<String>) -> Self {
        Self::new(uri, None)
    }

    pub fn initiate(&self, total: Option<u64>) {
        self.emit(|uri| ProgressEvent::Initiate { uri, total });
    }

    pub fn update(&self, downloaded: u64, total: Option<u64>) {
        self.emit(|uri| ProgressEvent::Update {
            uri,
            downloaded,
            total,
        });
    }

    pub fn complete(&self, bytes: u64) {
        self.emit(|uri| ProgressEvent::Complete { uri, bytes });
    }

    pub fn error(&self, message: impl fmt::Display) {
        self.emit(|uri| ProgressEvent::Error {
            uri,
            message: message.to_string(),
        });
    }

    fn emit(&self, build: impl FnOnce(String) -> ProgressEvent) {
        if let Some(listener) = &self.listener {
            listener.on_event(&build(self.uri.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_events_reach_listener_in_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let listener: Arc<dyn ProgressListener> =
            Arc::new(move |event: &ProgressEvent| sink.lock().push(event.clone()));

        let reporter = ProgressReporter::new("https://h/a", Some(listener));
        reporter.initiate(Some(10));
        reporter.update(5, Some(10));
        reporter.complete(10);
        reporter.error("boom");

        let events = events.lock();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            ProgressEvent::Initiate {
                uri: "https://h/a".to_string(),
                total: Some(10)
            }
        );
        assert!(matches!(events[1], ProgressEvent::Update { downloaded: 5, .. }));
        assert!(matches!(events[2], ProgressEvent::Complete { bytes: 10, .. }));
        assert!(matches!(&events[3], ProgressEvent::Error { message, .. } if message == "boom"));
        assert!(events.iter().all(|e| e.uri() == "https://h/a"));
    }

    #[test]
    fn test_silent_reporter() {
        let reporter = ProgressReporter::silent("https://h/a");
        reporter.initiate(None);
        reporter.complete(0);
    }
}
