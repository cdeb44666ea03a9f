//! Comment events parsed from the comment log.
//!
//! Each log line is one JSON object of the form
//! `{"service": "...", "data": {"id": ..., "name": "...", "comment": "..."}}`.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Sender name used when a line carries none.
pub const UNKNOWN_SENDER: &str = "???";

/// Errors produced while parsing a single log line.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The line is not a well-formed JSON object of the expected shape
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// The line is not valid UTF-8
    #[error("Invalid UTF-8 in log line: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// Missing required field in the line
    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    /// The identifier is neither a string nor a number
    #[error("Invalid comment id: {value}")]
    InvalidId { value: String },
}

/// Comment identifier, kept in the representation the log provided.
///
/// The string `"1"` and the number `1` are different identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommentId {
    Text(String),
    Number(String),
}

impl CommentId {
    fn from_value(value: Value) -> Result<Self, ParseError> {
        match value {
            Value::String(s) => Ok(CommentId::Text(s)),
            Value::Number(n) => Ok(CommentId::Number(n.to_string())),
            Value::Null => Err(ParseError::MissingField { field: "data.id" }),
            other => Err(ParseError::InvalidId {
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentId::Text(s) | CommentId::Number(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CommentId {
    fn from(s: &str) -> Self {
        CommentId::Text(s.to_string())
    }
}

impl From<i64> for CommentId {
    fn from(n: i64) -> Self {
        CommentId::Number(n.to_string())
    }
}

/// One parsed comment from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEvent {
    /// Origin platform label
    pub service: String,
    pub id: CommentId,
    pub sender_name: String,
    /// Free text, may be empty
    pub comment_text: String,
}

impl fmt::Display for CommentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.service, self.sender_name, self.comment_text
        )
    }
}

#[derive(Deserialize)]
struct RawLine {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    data: Option<RawData>,
}

#[derive(Deserialize)]
struct RawData {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

/// Parse one raw log line into a [`CommentEvent`].
///
/// Lines without `data.id` are rejected; `name` falls back to
/// [`UNKNOWN_SENDER`] and `comment` to an empty string.
pub fn parse_line(raw: &str) -> Result<CommentEvent, ParseError> {
    let line: RawLine = serde_json::from_str(raw.trim())?;
    let data = line.data.ok_or(ParseError::MissingField { field: "data" })?;
    let id = data
        .id
        .ok_or(ParseError::MissingField { field: "data.id" })
        .and_then(CommentId::from_value)?;

    Ok(CommentEvent {
        service: line.service.unwrap_or_default(),
        id,
        sender_name: data.name.unwrap_or_else(|| UNKNOWN_SENDER.to_string()),
        comment_text: data.comment.unwrap_or_default(),
    })
}

/// Decode one raw log line as UTF-8 and parse it.
pub fn parse_bytes(raw: &[u8]) -> Result<CommentEvent, ParseError> {
    parse_line(std::str::from_utf8(raw)?)
}
