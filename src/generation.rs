//! Streaming chat-completion clients.
//!
//! [`GenerationClient`] is the seam between the answer path and the model
//! host. [`OpenAiGenerator`] speaks the OpenAI chat-completions protocol
//! with `stream: true`, decoding server-sent events incrementally so answer
//! tokens reach the caller as they are produced. [`MockGenerationClient`]
//! replays a canned answer for offline tests.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::config::AnswerConfig;
use crate::types::RagError;

/// One chat message in OpenAI wire form.
#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// An in-flight answer: an ordered stream of text deltas.
#[derive(Debug)]
pub struct AnswerStream {
    rx: flume::Receiver<Result<String, RagError>>,
}

impl AnswerStream {
    /// Wraps a delta channel; used by clients and tests alike.
    pub fn from_channel(rx: flume::Receiver<Result<String, RagError>>) -> Self {
        Self { rx }
    }

    /// The next text delta, or `None` once the answer is complete.
    pub async fn next(&mut self) -> Option<Result<String, RagError>> {
        self.rx.recv_async().await.ok()
    }

    /// Drains the stream into the full answer text.
    pub async fn collect(mut self) -> Result<String, RagError> {
        let mut answer = String::new();
        while let Some(delta) = self.next().await {
            answer.push_str(&delta?);
        }
        Ok(answer)
    }
}

/// A streaming chat-completion backend.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Starts a streamed completion over `messages`.
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<AnswerStream, RagError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    stream: bool,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ServiceError {
    error: ServiceErrorBody,
}

#[derive(Deserialize)]
struct ServiceErrorBody {
    message: String,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiGenerator {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, config: &AnswerConfig) -> Self {
        Self {
            client,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    /// Points the client at a different OpenAI-compatible host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl GenerationClient for OpenAiGenerator {
    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<AnswerStream, RagError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                temperature: self.temperature,
                stream: true,
                messages: &messages,
            })
            .send()
            .await
            .map_err(|err| RagError::Generation(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ServiceError>().await {
                Ok(body) => body.error.message,
                Err(_) => format!("status {status}"),
            };
            return Err(RagError::Generation(message));
        }

        let (tx, rx) = flume::unbounded();
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer = String::new();
            'outer: while let Some(piece) = body.next().await {
                let piece = match piece {
                    Ok(piece) => piece,
                    Err(err) => {
                        let _ = tx.send(Err(RagError::Generation(err.to_string())));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&piece));
                // SSE events are newline-delimited; hold any trailing
                // partial line in the buffer until more bytes arrive.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let payload = payload.trim();
                    if payload == "[DONE]" {
                        break 'outer;
                    }
                    match serde_json::from_str::<StreamChunk>(payload) {
                        Ok(chunk) => {
                            for choice in chunk.choices {
                                if let Some(content) = choice.delta.content {
                                    if !content.is_empty() && tx.send(Ok(content)).is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "skipping undecodable stream event");
                        }
                    }
                }
            }
        });
        Ok(AnswerStream::from_channel(rx))
    }
}

/// Offline generator that replays a fixed answer in word-sized deltas.
#[derive(Clone, Debug)]
pub struct MockGenerationClient {
    answer: String,
}

impl MockGenerationClient {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
        }
    }
}

#[async_trait]
impl GenerationClient for MockGenerationClient {
    async fn stream_chat(&self, _messages: Vec<ChatMessage>) -> Result<AnswerStream, RagError> {
        let (tx, rx) = flume::unbounded();
        for word in self.answer.split_inclusive(' ') {
            let _ = tx.send(Ok(word.to_string()));
        }
        Ok(AnswerStream::from_channel(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn mock_client_replays_the_answer() {
        let client = MockGenerationClient::new("hello streamed world");
        let stream = client.stream_chat(vec![]).await.unwrap();
        assert_eq!(stream.collect().await.unwrap(), "hello streamed world");
    }

    #[tokio::test]
    async fn sse_deltas_are_decoded_in_order() {
        let server = MockServer::start();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"The price \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"is $50.\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        server.mock(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        });

        let generator = OpenAiGenerator::new(
            reqwest::Client::new(),
            "test-key",
            &AnswerConfig::default(),
        )
        .with_base_url(format!("{}/v1", server.base_url()));
        let stream = generator
            .stream_chat(vec![ChatMessage::user("what is the price?")])
            .await
            .unwrap();
        assert_eq!(stream.collect().await.unwrap(), "The price is $50.");
    }

    #[tokio::test]
    async fn service_errors_surface_before_streaming() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401)
                .json_body(serde_json::json!({"error": {"message": "bad key"}}));
        });

        let generator = OpenAiGenerator::new(
            reqwest::Client::new(),
            "wrong",
            &AnswerConfig::default(),
        )
        .with_base_url(format!("{}/v1", server.base_url()));
        let err = generator.stream_chat(vec![]).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(msg) if msg.contains("bad key")));
    }
}
