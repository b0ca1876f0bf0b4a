pub mod ai;
pub mod bridge;
pub mod calendar;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod extract;
pub mod intent;
pub mod state;
pub mod validate;
mod worker;

// Re-export main types for convenience
pub use ai::{ChatBackend, ChatRequest, CohereClient, DeltaStream};
pub use bridge::{BridgeReceiver, BridgeSender, Envelope};
pub use calendar::{AppleScriptSink, CalendarEventCandidate, CalendarSink, IcsFileSink};
pub use config::{ChatSettings, Config, OverlapPolicy, SinkKind};
pub use controller::ChatController;
pub use error::{ExtractionError, PersistenceError, SubmitError, TransportError, ValidationError};
pub use events::{MessageHandle, RequestId, Severity, StreamEvent};
pub use extract::{extract, extract_with_reference};
pub use intent::{Intent, IntentGate};
pub use state::{
    ChatMessage, ChatRole, ChatTurn, Conversation, ConversationId, ConversationStore,
    ConversationSummary,
};
pub use validate::validate;
pub use worker::{Clock, RequestState};
