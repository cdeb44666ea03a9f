pub mod config;
pub mod controller;
pub mod error;
pub mod reply;
pub mod speech;
pub mod transcript;
pub mod utils;
pub mod watcher;

// Re-export the main error types for convenience
pub use error::{AivcError, AivcResult};

pub use config::{AppConfig, ConfigManager, LogConfig};
pub use controller::{Controller, SessionState, StartOutcome};
pub use transcript::{EntryKind, Transcript, TranscriptEntry};

// Re-export the pipeline building blocks
pub use reply::{CompletionClient, KeywordGate, ReplyGenerator};
pub use speech::{PlaybackRequest, SpeechBackend, SpeechRouter};
pub use watcher::{CommentEvent, CommentId, LogTail, LogWatcher, SeenIds};
