//! Comment log watching.
//!
//! Tails the per-day comment log written by an external comment viewer,
//! parses each appended line and yields comments whose id has not been
//! seen in the current session.

pub mod dedup;
pub mod event;
pub mod tail;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use dedup::SeenIds;
pub use event::{parse_bytes, parse_line, CommentEvent, CommentId, ParseError, UNKNOWN_SENDER};
pub use tail::{resolve_log_file_for, resolve_today_log_file, LogTail};

/// Default delay between polls when the log has nothing new.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Errors that end a watch session.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Log folder does not exist: {}", .0.display())]
    FolderNotFound(PathBuf),

    #[error("Failed to create log file '{}': {source}", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open log file '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read log file: {0}")]
    Read(#[source] std::io::Error),
}

/// Items produced by the polling loop.
#[derive(Debug)]
pub enum WatchItem {
    /// A comment seen for the first time in this session
    Comment(CommentEvent),
    /// A line that could not be parsed; the loop keeps going
    Malformed { line: String, error: ParseError },
}

/// Counters reported when a watch loop finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub accepted: usize,
    pub duplicates: usize,
    pub malformed: usize,
}

/// Polling loop over one log file for one session.
#[derive(Debug)]
pub struct LogWatcher {
    tail: LogTail,
    seen: SeenIds,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl LogWatcher {
    /// Create a watcher with an empty seen-set.
    pub fn new(tail: LogTail, running: Arc<AtomicBool>) -> Self {
        Self {
            tail,
            seen: SeenIds::new(),
            running,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run until the running flag is cleared.
    ///
    /// The flag is checked before every poll and again after a line is read,
    /// so no line read after a stop request is yielded. End-of-file and parse
    /// errors never end the loop; only a read error on the file does.
    pub async fn run<F>(mut self, mut on_item: F) -> Result<WatchSummary, WatchError>
    where
        F: FnMut(WatchItem),
    {
        let mut summary = WatchSummary::default();
        tracing::info!("👀 Watching log file: {}", self.tail.path().display());

        while self.running.load(Ordering::Acquire) {
            let Some(line) = self.tail.poll_once().await? else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            match parse_bytes(&line) {
                Ok(event) => {
                    if self.seen.accept(&event.id) {
                        summary.accepted += 1;
                        tracing::debug!(id = %event.id, service = %event.service, "📨 Comment accepted");
                        on_item(WatchItem::Comment(event));
                    } else {
                        summary.duplicates += 1;
                        tracing::debug!(id = %event.id, "🔁 Duplicate comment skipped");
                    }
                }
                Err(error) => {
                    summary.malformed += 1;
                    tracing::warn!("⚠️ Malformed log line skipped: {}", error);
                    on_item(WatchItem::Malformed {
                        line: String::from_utf8_lossy(&line).into_owned(),
                        error,
                    });
                }
            }
        }

        tracing::info!(
            accepted = summary.accepted,
            duplicates = summary.duplicates,
            malformed = summary.malformed,
            "🛑 Log watch stopped"
        );
        Ok(summary)
    }
}
