use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::sse::{SseEvent, SseParser};
use super::{ChatBackend, ChatRequest, DeltaStream};
use crate::error::TransportError;

pub const DEFAULT_BASE_URL: &str = "https://api.cohere.com";
pub const DEFAULT_MODEL: &str = "command-r";

#[derive(Serialize)]
struct CohereMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CohereRequest<'a> {
    model: &'a str,
    messages: Vec<CohereMessage<'a>>,
    temperature: f32,
    stream: bool,
}

impl<'a> CohereRequest<'a> {
    fn from_chat(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|turn| CohereMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            temperature: request.temperature,
            stream,
        }
    }
}

#[derive(Deserialize)]
struct CohereContent {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct CohereResponseMessage {
    #[serde(default)]
    content: Vec<CohereContent>,
}

#[derive(Deserialize)]
struct CohereResponse {
    message: CohereResponseMessage,
}

#[derive(Deserialize)]
struct CohereStreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    message: Option<DeltaMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct DeltaMessage {
    #[serde(default)]
    content: Option<DeltaContent>,
}

#[derive(Deserialize)]
struct DeltaContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum StreamItem {
    Delta(String),
    End,
    Skip,
}

#[derive(Clone)]
pub struct CohereClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl CohereClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
    ) -> Result<reqwest::Response, TransportError> {
        if self.api_key.is_empty() {
            return Err(TransportError::MissingCredential);
        }

        let body = CohereRequest::from_chat(request, stream);
        let response = self
            .client
            .post(format!("{}/v2/chat", self.base_url))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for CohereClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, TransportError> {
        let response = self.send(request, false).await?;
        let body = response.text().await?;
        parse_complete(&body)
    }

    async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream, TransportError> {
        let response = self.send(request, true).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::stream! {
            let mut parser = SseParser::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(TransportError::Http(e));
                        return;
                    }
                };
                for event in parser.push(&chunk) {
                    match decode_event(&event) {
                        Ok(StreamItem::Delta(text)) => yield Ok(text),
                        Ok(StreamItem::End) => return,
                        Ok(StreamItem::Skip) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
            if let Some(event) = parser.finish() {
                match decode_event(&event) {
                    Ok(StreamItem::Delta(text)) => yield Ok(text),
                    Ok(_) => {}
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn parse_complete(body: &str) -> Result<String, TransportError> {
    let response: CohereResponse =
        serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(response
        .message
        .content
        .into_iter()
        .map(|c| c.text)
        .collect::<Vec<_>>()
        .join(""))
}

fn decode_event(event: &SseEvent) -> Result<StreamItem, TransportError> {
    let data = event.data.trim();
    if data.is_empty() {
        return Ok(StreamItem::Skip);
    }
    if data == "[DONE]" {
        return Ok(StreamItem::End);
    }

    let parsed: CohereStreamEvent =
        serde_json::from_str(data).map_err(|e| TransportError::Decode(e.to_string()))?;

    match parsed.kind.as_str() {
        "content-delta" => {
            let text = parsed
                .delta
                .and_then(|d| d.message)
                .and_then(|m| m.content)
                .and_then(|c| c.text)
                .unwrap_or_default();
            Ok(StreamItem::Delta(text))
        }
        "message-end" => {
            let reason = parsed.delta.and_then(|d| d.finish_reason);
            if reason.as_deref() == Some("ERROR") {
                return Err(TransportError::Stream("model reported an error".to_string()));
            }
            Ok(StreamItem::End)
        }
        _ => Ok(StreamItem::Skip),
    }
}
