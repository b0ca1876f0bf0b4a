//! UI-side handle on the response pipeline.
//!
//! Every method returns immediately. Work is handed to the background worker
//! and results come back through the [`BridgeReceiver`] returned from
//! [`ChatController::new`].

use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ai::ChatBackend;
use crate::bridge::{self, BridgeReceiver};
use crate::calendar::CalendarSink;
use crate::config::{ChatSettings, OverlapPolicy};
use crate::error::SubmitError;
use crate::events::RequestId;
use crate::intent::{Intent, IntentGate};
use crate::state::{Conversation, ConversationId, ConversationStore, ConversationSummary};
use crate::worker::{self, lock, Clock, Job, Registry, Shared};

pub struct ChatController {
    store: Arc<Mutex<ConversationStore>>,
    registry: Arc<Registry>,
    jobs: mpsc::UnboundedSender<Job>,
    shutdown: CancellationToken,
    settings: ChatSettings,
    gate: IntentGate,
    next_id: AtomicU64,
}

impl ChatController {
    /// Start the background worker. Must be called from inside a tokio
    /// runtime.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        sink: Arc<dyn CalendarSink>,
        settings: ChatSettings,
    ) -> (Self, BridgeReceiver) {
        Self::with_clock(
            backend,
            sink,
            settings,
            Arc::new(|| Local::now().date_naive()),
        )
    }

    /// Same as [`new`](Self::new) with a fixed source for "today"
    pub fn with_clock(
        backend: Arc<dyn ChatBackend>,
        sink: Arc<dyn CalendarSink>,
        mut settings: ChatSettings,
        clock: Clock,
    ) -> (Self, BridgeReceiver) {
        settings.set_temperature(settings.temperature);
        let (bridge_tx, bridge_rx) = bridge::channel();
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let store = Arc::new(Mutex::new(ConversationStore::new()));
        let registry = Arc::new(Registry::default());
        let shutdown = CancellationToken::new();

        let shared = Arc::new(Shared {
            store: store.clone(),
            registry: registry.clone(),
            backend,
            sink,
            bridge: bridge_tx,
            clock,
        });
        worker::spawn(shared, jobs_rx, shutdown.clone());

        let controller = Self {
            store,
            registry,
            jobs: jobs_tx,
            shutdown,
            gate: IntentGate::new(&settings.keywords),
            settings,
            next_id: AtomicU64::new(1),
        };
        (controller, bridge_rx)
    }

    /// Queue a prompt for the active conversation, creating one if needed
    pub fn submit(&self, prompt: &str) -> Result<RequestId, SubmitError> {
        self.submit_as(prompt, self.gate.classify(prompt))
    }

    /// Queue a prompt with an explicit route, bypassing the keyword gate
    pub fn submit_as(&self, prompt: &str, intent: Intent) -> Result<RequestId, SubmitError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SubmitError::EmptyPrompt);
        }
        if self.shutdown.is_cancelled() || self.jobs.is_closed() {
            return Err(SubmitError::WorkerStopped);
        }

        let conversation = lock(&self.store).ensure_active();
        if self.settings.overlap_policy == OverlapPolicy::Reject
            && self.registry.is_busy(conversation)
        {
            return Err(SubmitError::Busy { conversation });
        }

        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = self.shutdown.child_token();
        self.registry.register(conversation, id, cancel.clone());

        let job = Job {
            id,
            conversation,
            prompt: prompt.to_string(),
            intent,
            settings: self.settings.clone(),
            cancel,
        };
        if self.jobs.send(job).is_err() {
            self.registry.finish(conversation, id);
            return Err(SubmitError::WorkerStopped);
        }

        tracing::debug!(request = %id, conversation = %conversation, intent = ?intent, "request queued");
        Ok(id)
    }

    /// Start a fresh conversation. Work still pending for the previous one
    /// is abandoned.
    pub fn new_conversation(&self) -> ConversationId {
        let mut store = lock(&self.store);
        if let Some(previous) = store.active() {
            self.registry.cancel(previous);
        }
        store.create(None)
    }

    /// Returns false for an unknown id
    pub fn switch_conversation(&self, id: ConversationId) -> bool {
        let mut store = lock(&self.store);
        if !store.contains(id) {
            return false;
        }
        if let Some(previous) = store.active().filter(|previous| *previous != id) {
            self.registry.cancel(previous);
        }
        store.switch(id)
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        lock(&self.store).active()
    }

    pub fn conversations(&self) -> Vec<ConversationSummary> {
        lock(&self.store).list()
    }

    pub fn snapshot(&self, id: ConversationId) -> Option<Conversation> {
        lock(&self.store).snapshot(id)
    }

    /// Abandon queued and running requests for a conversation. Their
    /// remaining events are never delivered and nothing more is appended.
    pub fn cancel(&self, conversation: ConversationId) -> usize {
        self.registry.cancel(conversation)
    }

    /// Stop the worker. Later submissions fail with `WorkerStopped`.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("shutting down chat worker");
        }
        self.registry.cancel_all();
        self.shutdown.cancel();
    }

    /// Applies to requests submitted after the call
    pub fn set_temperature(&mut self, temperature: f32) {
        self.settings.set_temperature(temperature);
    }

    pub fn set_streaming(&mut self, streaming: bool) {
        self.settings.streaming = streaming;
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn is_busy(&self, conversation: ConversationId) -> bool {
        self.registry.is_busy(conversation)
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ChatRequest, DeltaStream};
    use crate::calendar::CalendarEventCandidate;
    use crate::error::{PersistenceError, TransportError};
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl ChatBackend for Unreachable {
        async fn complete(&self, _: &ChatRequest) -> Result<String, TransportError> {
            Err(TransportError::MissingCredential)
        }

        async fn stream(&self, _: &ChatRequest) -> Result<DeltaStream, TransportError> {
            Err(TransportError::MissingCredential)
        }
    }

    impl CalendarSink for Unreachable {
        fn persist(&self, _: &CalendarEventCandidate) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    fn controller() -> (ChatController, BridgeReceiver) {
        ChatController::new(
            Arc::new(Unreachable),
            Arc::new(Unreachable),
            ChatSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let (controller, _rx) = controller();
        assert_eq!(controller.submit("   "), Err(SubmitError::EmptyPrompt));
        assert!(controller.active_conversation().is_none());
    }

    #[tokio::test]
    async fn test_submit_creates_conversation() {
        let (controller, _rx) = controller();
        let id = controller.submit("hello").unwrap();
        assert_eq!(id, RequestId(1));
        let active = controller.active_conversation().unwrap();
        assert_eq!(controller.conversations().len(), 1);
        assert_eq!(controller.conversations()[0].id, active);
    }

    #[tokio::test]
    async fn test_switch_to_unknown_is_rejected() {
        let (controller, _rx) = controller();
        let first = controller.new_conversation();
        assert!(!controller.switch_conversation(ConversationId::new()));
        assert_eq!(controller.active_conversation(), Some(first));

        let second = controller.new_conversation();
        assert_eq!(controller.active_conversation(), Some(second));
        assert!(controller.switch_conversation(first));
        assert_eq!(controller.active_conversation(), Some(first));
    }

    #[tokio::test]
    async fn test_settings_setters() {
        let (mut controller, _rx) = controller();
        controller.set_temperature(1.7);
        assert_eq!(controller.settings().temperature, 1.0);
        controller.set_streaming(false);
        assert!(!controller.settings().streaming);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let (controller, _rx) = controller();
        controller.shutdown();
        assert_eq!(controller.submit("hello"), Err(SubmitError::WorkerStopped));
    }
}
