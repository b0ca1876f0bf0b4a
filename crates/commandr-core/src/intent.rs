//! Keyword gate routing a prompt to calendar handling or chat.
//!
//! This is a coarse substring test, not classification: "reschedule my
//! thoughts" counts as calendar intent. Callers that know better can bypass
//! it with `ChatController::submit_as`, and the keyword list is configurable.

pub const CALENDAR_KEYWORDS: [&str; 4] = ["schedule", "meeting", "calendar", "appointment"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Calendar,
    Chat,
}

#[derive(Debug, Clone)]
pub struct IntentGate {
    keywords: Vec<String>,
}

impl Default for IntentGate {
    fn default() -> Self {
        Self::new(CALENDAR_KEYWORDS)
    }
}

impl IntentGate {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn classify(&self, prompt: &str) -> Intent {
        let lower = prompt.to_lowercase();
        if self.keywords.iter().any(|k| lower.contains(k.as_str())) {
            Intent::Calendar
        } else {
            Intent::Chat
        }
    }
}

/// Classify with the default keyword list
pub fn classify(prompt: &str) -> Intent {
    IntentGate::default().classify(prompt)
}
