//! UI-agnostic conversation state
//!
//! Conversations are append-only transcripts. The order of messages is the
//! exact payload sent to the model, so nothing here ever reorders or removes
//! a message. The UI only ever sees owned snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Conversation";

const TITLE_PREVIEW_CHARS: usize = 40;

/// Process-scoped conversation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

/// A chat message in a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    role: ChatRole,
    content: String,
    created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One `{role, content}` pair as sent to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    id: ConversationId,
    title: String,
    created_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
}

impl Conversation {
    fn new(title: Option<String>) -> Self {
        Self {
            id: ConversationId::new(),
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Ordered history in the shape the model API expects
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.messages
            .iter()
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    fn push(&mut self, message: ChatMessage) {
        // First user message names an untitled conversation
        if message.role == ChatRole::User
            && self.title == DEFAULT_TITLE
            && !self.messages.iter().any(|m| m.role == ChatRole::User)
        {
            let preview: String = message.content.chars().take(TITLE_PREVIEW_CHARS).collect();
            let preview = preview.trim();
            if !preview.is_empty() {
                self.title = preview.to_string();
            }
        }
        self.messages.push(message);
    }
}

/// Lightweight listing entry for the conversation sidebar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub message_count: usize,
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: HashMap<ConversationId, Conversation>,
    order: Vec<ConversationId>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation and make it the active one
    pub fn create(&mut self, title: Option<String>) -> ConversationId {
        let conversation = Conversation::new(title);
        let id = conversation.id;
        self.conversations.insert(id, conversation);
        self.order.push(id);
        self.active = Some(id);
        id
    }

    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    /// The active conversation, creating one if there is none yet
    pub fn ensure_active(&mut self) -> ConversationId {
        match self.active {
            Some(id) => id,
            None => self.create(None),
        }
    }

    /// Returns false for an unknown id, leaving the active conversation unchanged
    pub fn switch(&mut self, id: ConversationId) -> bool {
        if self.conversations.contains_key(&id) {
            self.active = Some(id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.conversations.contains_key(&id)
    }

    pub fn get(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.get(&id)
    }

    /// Owned copy for rendering
    pub fn snapshot(&self, id: ConversationId) -> Option<Conversation> {
        self.conversations.get(&id).cloned()
    }

    pub fn turns(&self, id: ConversationId) -> Option<Vec<ChatTurn>> {
        self.conversations.get(&id).map(Conversation::turns)
    }

    /// Conversations in creation order
    pub fn list(&self) -> Vec<ConversationSummary> {
        self.order
            .iter()
            .filter_map(|id| self.conversations.get(id))
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title.clone(),
                message_count: c.messages.len(),
            })
            .collect()
    }

    /// Append a message; returns None if the conversation does not exist
    pub fn append(
        &mut self,
        id: ConversationId,
        role: ChatRole,
        content: impl Into<String>,
    ) -> Option<&ChatMessage> {
        let conversation = self.conversations.get_mut(&id)?;
        conversation.push(ChatMessage::new(role, content));
        conversation.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_active_creates_once() {
        let mut store = ConversationStore::new();
        assert!(store.active().is_none());
        let first = store.ensure_active();
        let second = store.ensure_active();
        assert_eq!(first, second);
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = ConversationStore::new();
        let id = store.create(None);
        store.append(id, ChatRole::User, "hello");
        store.append(id, ChatRole::Assistant, "hi there");
        store.append(id, ChatRole::User, "how are you?");

        let turns = store.turns(id).unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "hi there", "how are you?"]);
        assert_eq!(turns[1].role, ChatRole::Assistant);
    }

    #[test]
    fn test_append_unknown_conversation() {
        let mut store = ConversationStore::new();
        assert!(store.append(ConversationId::new(), ChatRole::User, "x").is_none());
    }

    #[test]
    fn test_switch_rejects_unknown_id() {
        let mut store = ConversationStore::new();
        let a = store.create(None);
        let b = store.create(None);
        assert_eq!(store.active(), Some(b));
        assert!(store.switch(a));
        assert_eq!(store.active(), Some(a));
        assert!(!store.switch(ConversationId::new()));
        assert_eq!(store.active(), Some(a));
    }

    #[test]
    fn test_first_user_message_sets_title() {
        let mut store = ConversationStore::new();
        let id = store.create(None);
        assert_eq!(store.get(id).unwrap().title(), DEFAULT_TITLE);

        store.append(id, ChatRole::User, "What is the capital of France and why is it Paris?");
        store.append(id, ChatRole::User, "Second question");
        let title = store.get(id).unwrap().title().to_string();
        assert_eq!(title, "What is the capital of France and why is");
    }

    #[test]
    fn test_explicit_title_is_kept() {
        let mut store = ConversationStore::new();
        let id = store.create(Some("Planning".to_string()));
        store.append(id, ChatRole::User, "anything");
        assert_eq!(store.get(id).unwrap().title(), "Planning");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut store = ConversationStore::new();
        let id = store.create(None);
        store.append(id, ChatRole::User, "one");
        let snapshot = store.snapshot(id).unwrap();
        store.append(id, ChatRole::Assistant, "two");
        assert_eq!(snapshot.messages().len(), 1);
        assert_eq!(store.get(id).unwrap().messages().len(), 2);
    }
}
