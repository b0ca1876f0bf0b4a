//! Error types for the response pipeline.
//!
//! Every variant is terminal for the request that produced it and is
//! surfaced to the UI as a single status event; none of them abort the
//! process.

use std::path::PathBuf;

use crate::state::ConversationId;

/// Failure to turn free text into a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    /// No date expression was found anywhere in the text.
    #[error("could not find a date in \"{text}\"")]
    NoDateFound { text: String },

    /// No 12-hour or 24-hour time token was found.
    #[error("could not find a time in \"{text}\"")]
    NoTimeFound { text: String },

    /// A date token matched but does not name a real day.
    #[error("could not parse date \"{token}\"")]
    UnparsableDate { token: String },

    /// A time token matched but is out of range.
    #[error("could not parse time \"{token}\"")]
    UnparsableTime { token: String },
}

impl ExtractionError {
    /// The event field that could not be resolved.
    pub fn field(&self) -> &'static str {
        match self {
            Self::NoDateFound { .. } | Self::UnparsableDate { .. } => "date",
            Self::NoTimeFound { .. } | Self::UnparsableTime { .. } => "time",
        }
    }
}

/// Model output rejected before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("empty response received")]
    EmptyResponse,
}

/// Any failure talking to the model API.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No API key in the environment or config file.
    #[error("no API key configured (set CO_API_KEY)")]
    MissingCredential,

    /// Connection, TLS or body read failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status.
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not have the expected shape.
    #[error("could not decode response: {0}")]
    Decode(String),

    /// The stream ended abnormally after it started.
    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// Failure writing an event to the host calendar.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("could not write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("calendar script failed: {0}")]
    Script(String),
}

/// Rejected submission, returned synchronously to the UI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("a response is still in progress for conversation {conversation}")]
    Busy { conversation: ConversationId },

    #[error("background worker is not running")]
    WorkerStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_error_names_missing_field() {
        let err = ExtractionError::NoTimeFound {
            text: "lunch tomorrow".to_string(),
        };
        assert_eq!(err.field(), "time");
        assert_eq!(err.to_string(), "could not find a time in \"lunch tomorrow\"");

        let err = ExtractionError::UnparsableDate {
            token: "2024-02-30".to_string(),
        };
        assert_eq!(err.field(), "date");
    }

    #[test]
    fn test_persistence_error_mentions_path() {
        let err = PersistenceError::Io {
            path: PathBuf::from("/nope/Sync.ics"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("/nope/Sync.ics"));
    }
}
