//! Background side of the controller.
//!
//! A single dispatcher task receives jobs in submission order and hands each
//! one to the lane of its conversation. A lane runs its jobs one at a time,
//! so replies in one conversation never interleave while different
//! conversations proceed independently.

use chrono::NaiveDate;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ai::{ChatBackend, ChatRequest};
use crate::bridge::{BridgeSender, Envelope};
use crate::calendar::CalendarSink;
use crate::config::ChatSettings;
use crate::error::{PersistenceError, TransportError, ValidationError};
use crate::events::{RequestId, Severity, StreamEvent};
use crate::extract::extract_with_reference;
use crate::intent::Intent;
use crate::state::{ChatRole, ChatTurn, ConversationId, ConversationStore};
use crate::validate::{error_indicator, validate};

/// Source of "today" for relative dates
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub(crate) const NO_CONTENT: &str = "No content was produced";
pub(crate) const RESPONSE_COMPLETED: &str = "Response completed";
pub(crate) const MEETING_SCHEDULED: &str = "Meeting scheduled";

/// Lifecycle of one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Sending,
    Streaming,
    Complete,
    Validating,
    Done,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Done | RequestState::Failed)
    }

    pub fn can_transition_to(self, next: RequestState) -> bool {
        use RequestState::*;
        match (self, next) {
            (Idle, Sending)
            | (Sending, Streaming)
            | (Sending, Complete)
            | (Streaming, Validating)
            | (Complete, Validating)
            | (Validating, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Requests that are queued or running, per conversation
#[derive(Debug, Default)]
pub(crate) struct Registry {
    live: Mutex<HashMap<ConversationId, Vec<(RequestId, CancellationToken)>>>,
}

impl Registry {
    pub fn register(&self, conversation: ConversationId, id: RequestId, cancel: CancellationToken) {
        lock(&self.live).entry(conversation).or_default().push((id, cancel));
    }

    pub fn finish(&self, conversation: ConversationId, id: RequestId) {
        let mut live = lock(&self.live);
        if let Some(requests) = live.get_mut(&conversation) {
            requests.retain(|(request, _)| *request != id);
            if requests.is_empty() {
                live.remove(&conversation);
            }
        }
    }

    pub fn is_busy(&self, conversation: ConversationId) -> bool {
        lock(&self.live).contains_key(&conversation)
    }

    /// Cancel everything outstanding for a conversation; returns how many
    pub fn cancel(&self, conversation: ConversationId) -> usize {
        let requests = lock(&self.live).remove(&conversation).unwrap_or_default();
        for (id, cancel) in &requests {
            tracing::debug!(request = %id, conversation = %conversation, "request cancelled");
            cancel.cancel();
        }
        requests.len()
    }

    pub fn cancel_all(&self) {
        for (_, requests) in lock(&self.live).drain() {
            for (_, cancel) in requests {
                cancel.cancel();
            }
        }
    }
}

pub(crate) struct Job {
    pub id: RequestId,
    pub conversation: ConversationId,
    pub prompt: String,
    pub intent: Intent,
    pub settings: ChatSettings,
    pub cancel: CancellationToken,
}

pub(crate) struct Shared {
    pub store: Arc<Mutex<ConversationStore>>,
    pub registry: Arc<Registry>,
    pub backend: Arc<dyn ChatBackend>,
    pub sink: Arc<dyn CalendarSink>,
    pub bridge: BridgeSender,
    pub clock: Clock,
}

pub(crate) fn spawn(
    shared: Arc<Shared>,
    jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(dispatch(shared, jobs, shutdown))
}

async fn dispatch(
    shared: Arc<Shared>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    shutdown: CancellationToken,
) {
    let mut lanes: HashMap<ConversationId, mpsc::UnboundedSender<Job>> = HashMap::new();

    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let conversation = job.conversation;
        let job = match lanes.get(&conversation) {
            Some(lane) => match lane.send(job) {
                Ok(()) => continue,
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_lane(shared.clone(), rx));
        if tx.send(job).is_ok() {
            lanes.insert(conversation, tx);
        }
    }

    tracing::debug!("dispatcher stopped");
}

async fn run_lane(shared: Arc<Shared>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = jobs.recv().await {
        let (conversation, id) = (job.conversation, job.id);
        if job.cancel.is_cancelled() {
            // The prompt was already shown; keep it in the transcript
            tracing::debug!(request = %id, "skipping cancelled request");
            record_prompt(&shared, &job);
        } else {
            run_job(&shared, &job).await;
        }
        shared.registry.finish(conversation, id);
    }
}

struct Tracker {
    id: RequestId,
    state: RequestState,
}

impl Tracker {
    fn new(id: RequestId) -> Self {
        Self {
            id,
            state: RequestState::Idle,
        }
    }

    fn advance(&mut self, next: RequestState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(request = %self.id, from = ?self.state, to = ?next, "illegal state transition");
            return false;
        }
        tracing::debug!(request = %self.id, from = ?self.state, to = ?next, "state transition");
        self.state = next;
        true
    }
}

/// Per-request view of the bridge. Goes quiet once the request is cancelled.
struct Emitter<'a> {
    shared: &'a Shared,
    job: &'a Job,
}

impl Emitter<'_> {
    fn emit(&self, event: StreamEvent) -> bool {
        if self.job.cancel.is_cancelled() {
            return false;
        }
        self.shared.bridge.send(Envelope::new(
            self.job.id,
            self.job.conversation,
            event,
            self.job.cancel.clone(),
        ))
    }

    fn status(&self, text: impl Into<String>, severity: Severity) -> bool {
        self.emit(StreamEvent::status(text, severity))
    }
}

/// Store the user's prompt in lane order and return the turns sent with it
fn record_prompt(shared: &Shared, job: &Job) -> Option<Vec<ChatTurn>> {
    let mut store = lock(&shared.store);
    store.append(job.conversation, ChatRole::User, job.prompt.as_str())?;
    store.turns(job.conversation)
}

async fn run_job(shared: &Shared, job: &Job) {
    let mut tracker = Tracker::new(job.id);
    let emitter = Emitter { shared, job };

    tracker.advance(RequestState::Sending);
    let history = match record_prompt(shared, job) {
        Some(history) => history,
        None => {
            tracker.advance(RequestState::Failed);
            emitter.status("Conversation no longer exists", Severity::Error);
            return;
        }
    };
    tracing::info!(
        request = %job.id,
        conversation = %job.conversation,
        intent = ?job.intent,
        turns = history.len(),
        "request started"
    );

    match job.intent {
        Intent::Calendar => run_calendar(shared, job, &mut tracker, &emitter).await,
        Intent::Chat => run_chat(shared, job, history, &mut tracker, &emitter).await,
    }

    if job.cancel.is_cancelled() {
        tracing::info!(request = %job.id, state = ?tracker.state, "request abandoned");
    } else {
        tracing::info!(request = %job.id, state = ?tracker.state, "request finished");
    }
}

async fn run_chat(
    shared: &Shared,
    job: &Job,
    history: Vec<ChatTurn>,
    tracker: &mut Tracker,
    emitter: &Emitter<'_>,
) {
    let request = ChatRequest {
        model: job.settings.model.clone(),
        messages: history,
        temperature: job.settings.temperature.clamp(0.0, 1.0),
        stream: job.settings.streaming,
    };

    let result = if request.stream {
        stream_reply(shared, job, &request, tracker, emitter).await
    } else {
        complete_reply(shared, job, &request, tracker).await
    };

    let raw = match result {
        Reply::Text(raw) => raw,
        Reply::Cancelled => return,
        Reply::Empty => {
            tracker.advance(RequestState::Failed);
            emitter.status(NO_CONTENT, Severity::Warning);
            return;
        }
        Reply::Failed(e) => {
            tracker.advance(RequestState::Failed);
            tracing::error!(request = %job.id, "transport failure: {}", e);
            emitter.status(e.to_string(), Severity::Error);
            return;
        }
    };

    tracker.advance(RequestState::Validating);
    let text = match validate(&raw) {
        Ok(text) => text,
        Err(ValidationError::EmptyResponse) => {
            tracker.advance(RequestState::Failed);
            emitter.status(ValidationError::EmptyResponse.to_string(), Severity::Warning);
            return;
        }
    };

    if job.cancel.is_cancelled() {
        return;
    }
    lock(&shared.store).append(job.conversation, ChatRole::Assistant, text.as_str());
    tracker.advance(RequestState::Done);

    // The bubble ends up showing exactly what was stored
    if !request.stream {
        emitter.emit(StreamEvent::NewMessage {
            handle: job.id.handle(),
            role: ChatRole::Assistant,
            content: text.clone(),
        });
    } else if text != raw {
        emitter.emit(StreamEvent::AppendToMessage {
            handle: job.id.handle(),
            content: text.clone(),
        });
    }

    let status = match error_indicator(&text) {
        Some(indicator) => format!("{} (response mentions \"{}\")", RESPONSE_COMPLETED, indicator),
        None => RESPONSE_COMPLETED.to_string(),
    };
    emitter.status(status, Severity::Success);
}

enum Reply {
    Text(String),
    Empty,
    Cancelled,
    Failed(TransportError),
}

async fn stream_reply(
    shared: &Shared,
    job: &Job,
    request: &ChatRequest,
    tracker: &mut Tracker,
    emitter: &Emitter<'_>,
) -> Reply {
    let stream = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => return Reply::Cancelled,
        stream = shared.backend.stream(request) => stream,
    };
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(e) => return Reply::Failed(e),
    };
    tracker.advance(RequestState::Streaming);

    let handle = job.id.handle();
    let mut buffer = String::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => return Reply::Cancelled,
            next = stream.next() => next,
        };
        match next {
            None => break,
            Some(Ok(delta)) if delta.is_empty() => continue,
            Some(Ok(delta)) => {
                let first = buffer.is_empty();
                buffer.push_str(&delta);
                let event = if first {
                    StreamEvent::NewMessage {
                        handle,
                        role: ChatRole::Assistant,
                        content: delta,
                    }
                } else {
                    StreamEvent::AppendToMessage {
                        handle,
                        content: buffer.clone(),
                    }
                };
                emitter.emit(event);
            }
            Some(Err(e)) => return Reply::Failed(e),
        }
    }

    if buffer.is_empty() {
        Reply::Empty
    } else {
        Reply::Text(buffer)
    }
}

async fn complete_reply(
    shared: &Shared,
    job: &Job,
    request: &ChatRequest,
    tracker: &mut Tracker,
) -> Reply {
    let result = tokio::select! {
        biased;
        _ = job.cancel.cancelled() => return Reply::Cancelled,
        result = shared.backend.complete(request) => result,
    };
    match result {
        Ok(text) => {
            tracker.advance(RequestState::Complete);
            Reply::Text(text)
        }
        Err(e) => Reply::Failed(e),
    }
}

async fn run_calendar(shared: &Shared, job: &Job, tracker: &mut Tracker, emitter: &Emitter<'_>) {
    let today = (shared.clock)();
    let event = match extract_with_reference(&job.prompt, today) {
        Ok(event) => event,
        Err(e) => {
            tracker.advance(RequestState::Failed);
            tracing::info!(request = %job.id, field = e.field(), "event extraction failed: {}", e);
            emitter.status(
                format!("I couldn't understand the event details: {}", e),
                Severity::Error,
            );
            return;
        }
    };
    tracker.advance(RequestState::Complete);
    tracker.advance(RequestState::Validating);

    let sink = shared.sink.clone();
    let candidate = event.clone();
    let persisted = tokio::task::spawn_blocking(move || sink.persist(&candidate))
        .await
        .unwrap_or_else(|e| Err(PersistenceError::Script(e.to_string())));

    if let Err(e) = persisted {
        tracker.advance(RequestState::Failed);
        tracing::error!(request = %job.id, "calendar persistence failed: {}", e);
        emitter.status(format!("Failed to create calendar event: {}", e), Severity::Error);
        return;
    }

    if job.cancel.is_cancelled() {
        return;
    }
    let confirmation = event.confirmation();
    lock(&shared.store).append(job.conversation, ChatRole::Assistant, confirmation.as_str());
    tracker.advance(RequestState::Done);
    tracing::info!(request = %job.id, title = event.title(), start = %event.start(), "meeting scheduled");

    emitter.emit(StreamEvent::NewMessage {
        handle: job.id.handle(),
        role: ChatRole::Assistant,
        content: confirmation,
    });
    emitter.status(MEETING_SCHEDULED, Severity::Success);
}
