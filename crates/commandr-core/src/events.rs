//! Events the pipeline hands to the UI.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::ChatRole;

/// Identifies one submitted prompt and everything it produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Handle of the single assistant message a request may produce
    pub fn handle(self) -> MessageHandle {
        MessageHandle(self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Logical message in the UI log that `AppendToMessage` targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum StreamEvent {
    NewMessage {
        handle: MessageHandle,
        role: ChatRole,
        content: String,
    },
    /// Carries the full text so far, not a delta
    AppendToMessage {
        handle: MessageHandle,
        content: String,
    },
    StatusUpdate {
        text: String,
        severity: Severity,
    },
}

impl StreamEvent {
    pub fn status(text: impl Into<String>, severity: Severity) -> Self {
        StreamEvent::StatusUpdate {
            text: text.into(),
            severity,
        }
    }

    pub fn is_status(&self) -> bool {
        matches!(self, StreamEvent::StatusUpdate { .. })
    }
}
