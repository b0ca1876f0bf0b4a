pub mod cohere;
pub mod sse;

pub use cohere::CohereClient;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;

use crate::error::TransportError;
use crate::state::ChatTurn;

/// Incremental text fragments, in order, ending when the model is done
pub type DeltaStream = BoxStream<'static, Result<String, TransportError>>;

/// Everything the model API needs for one reply
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub temperature: f32,
    pub stream: bool,
}

/// The hosted chat API, behind a seam so the pipeline can run against a
/// scripted backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Single-shot reply
    async fn complete(&self, request: &ChatRequest) -> Result<String, TransportError>;

    /// Streamed reply; errors before the first byte are returned directly,
    /// later ones arrive inside the stream
    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream, TransportError>;
}
