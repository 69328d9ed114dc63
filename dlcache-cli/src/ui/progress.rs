//! Download progress rendering.
//!
//! Interactive terminals get one indicatif bar per URI; anything else gets a
//! plain line when a download starts and when it ends.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use console::{style, Term};
use dlcache::{ProgressEvent, ProgressListener};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "  {spinner:.cyan} {prefix}  {bar:24.cyan/dim} {bytes}/{total_bytes} {bytes_per_sec:.dim}  {elapsed:.dim}";
const SPINNER_TEMPLATE: &str = "  {spinner:.cyan} {prefix}  {bytes} {bytes_per_sec:.dim}  {elapsed:.dim}";

/// Renders [`ProgressEvent`]s on stderr.
pub struct ProgressDisplay {
    multi: Option<MultiProgress>,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressDisplay {
    /// Bars when stderr is a terminal, plain lines otherwise.
    pub fn new() -> Self {
        Self::with_fancy_output(Term::stderr().is_term())
    }

    fn with_fancy_output(fancy: bool) -> Self {
        let multi = fancy.then(|| MultiProgress::with_draw_target(ProgressDrawTarget::stderr()));
        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
        }
    }

    fn start(&self, uri: &str, total: Option<u64>) {
        let Some(multi) = &self.multi else {
            eprintln!("Downloading {}", uri);
            return;
        };

        let bar = match total {
            Some(len) => ProgressBar::new(len).with_style(bar_style(BAR_TEMPLATE)),
            None => ProgressBar::new_spinner().with_style(bar_style(SPINNER_TEMPLATE)),
        };
        let bar = multi.add(bar);
        bar.set_prefix(display_name(uri).to_string());
        bar.enable_steady_tick(Duration::from_millis(120));

        // A retry re-initiates the same URI; the old bar is replaced.
        if let Some(old) = self.bars().insert(uri.to_string(), bar) {
            old.finish_and_clear();
        }
    }

    fn advance(&self, uri: &str, downloaded: u64, total: Option<u64>) {
        if let Some(bar) = self.bars().get(uri) {
            if let Some(len) = total {
                bar.set_length(len);
            }
            bar.set_position(downloaded);
        }
    }

    fn finish(&self, uri: &str, line: String) {
        match self.bars().remove(uri) {
            Some(bar) => {
                bar.finish_and_clear();
                if let Some(multi) = &self.multi {
                    let _ = multi.println(line);
                }
            }
            None => eprintln!("{}", line),
        }
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressBar>> {
        self.bars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for ProgressDisplay {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Initiate { uri, total } => self.start(uri, *total),
            ProgressEvent::Update {
                uri,
                downloaded,
                total,
            } => self.advance(uri, *downloaded, *total),
            ProgressEvent::Complete { uri, bytes } => self.finish(
                uri,
                format!(
                    "  {} {} ({})",
                    style("✓").green(),
                    display_name(uri),
                    indicatif::HumanBytes(*bytes)
                ),
            ),
            ProgressEvent::Error { uri, message } => self.finish(
                uri,
                format!("  {} {}: {}", style("✗").red(), display_name(uri), message),
            ),
        }
    }
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .progress_chars("━╸─")
}

/// Last path segment of a URI, or the whole URI when it has none.
fn display_name(uri: &str) -> &str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    match path.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => uri,
    }
}
