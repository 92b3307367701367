//! OpenAI-compatible Chat Completions client.
//!
//! Used for outline generation: one streaming chat completion request,
//! text deltas out. Tool calls, reasoning channels and usage accounting
//! are not part of this API surface.

use std::collections::VecDeque;
use std::pin::Pin;

use anyhow::Result;
use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::providers::shared::{
    ChatMessage, ProviderError, ProviderErrorKind, ProviderResult, ProviderStream, StreamEvent,
    classify_reqwest_error, resolve_api_key, resolve_base_url,
};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Default endpoint when neither env nor config overrides it.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for outline generation.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Sampling temperature for outline generation.
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// OpenAI-compatible chat completions configuration.
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl OpenAIConfig {
    /// Resolves credentials, endpoint and model from config and environment.
    ///
    /// # Errors
    /// Returns an error if no API key is available or a configured base
    /// URL is malformed.
    pub fn from_env(config: &Config) -> Result<Self> {
        let provider = &config.providers.openai;
        let api_key = resolve_api_key(provider.api_key.as_deref(), "OPENAI_API_KEY", "openai")?;
        let base_url = resolve_base_url(
            provider.base_url.as_deref(),
            "OPENAI_BASE_URL",
            DEFAULT_BASE_URL,
            "OpenAI",
        )?;
        let model = provider
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self {
            api_key,
            base_url,
            model,
            temperature: DEFAULT_TEMPERATURE,
        })
    }
}

/// OpenAI-compatible chat completions client.
pub struct OpenAIClient {
    config: OpenAIConfig,
    http: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Opens a streaming chat completion.
    ///
    /// `messages` is the conversation in order; `system` is prepended as
    /// a system message when non-empty.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server responds with
    /// a non-success status.
    pub async fn send_messages_stream(
        &self,
        messages: &[ChatMessage],
        system: Option<&str>,
    ) -> Result<ProviderStream> {
        let request = ChatCompletionRequest::new(&self.config, messages, system);

        let url = format!("{}{}", self.config.base_url, CHAT_COMPLETIONS_PATH);
        let headers = build_headers(&self.config.api_key);

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::http_status(status.as_u16(), &error_body).into());
        }

        let byte_stream = response.bytes_stream();
        Ok(Box::pin(ChatCompletionsSseParser::new(byte_stream)))
    }
}

fn build_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {api_key}"))
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("accept", HeaderValue::from_static("text/event-stream"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    stream: bool,
    temperature: f32,
    messages: Vec<ChatCompletionMessage>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

impl ChatCompletionRequest {
    fn new(config: &OpenAIConfig, messages: &[ChatMessage], system: Option<&str>) -> Self {
        let mut out_messages = Vec::new();

        if let Some(prompt) = system
            && !prompt.trim().is_empty()
        {
            out_messages.push(ChatCompletionMessage {
                role: "system".to_string(),
                content: prompt.to_string(),
            });
        }

        for msg in messages {
            out_messages.push(ChatCompletionMessage {
                role: msg.role.clone(),
                content: msg.content.clone(),
            });
        }

        Self {
            model: config.model.clone(),
            stream: true,
            temperature: config.temperature,
            messages: out_messages,
        }
    }
}

/// Appends a blank line when the upstream byte stream ends.
///
/// Some OpenAI-compatible servers close the connection right after the
/// final `data:` line; the terminator makes the SSE decoder flush it.
struct SseTerminatedStream<S> {
    inner: S,
    emitted_terminator: bool,
}

impl<S> SseTerminatedStream<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            emitted_terminator: false,
        }
    }
}

impl<S, E> Stream for SseTerminatedStream<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
{
    type Item = std::result::Result<bytes::Bytes, E>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        if self.emitted_terminator {
            return Poll::Ready(None);
        }

        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(Some(item)) => Poll::Ready(Some(item)),
            Poll::Ready(None) => {
                self.emitted_terminator = true;
                Poll::Ready(Some(Ok(bytes::Bytes::from_static(b"\n\n"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// SSE parser for OpenAI-compatible chat completions.
struct ChatCompletionsSseParser<S> {
    inner: EventStream<SseTerminatedStream<S>>,
    pending: VecDeque<StreamEvent>,
    finish_reason: Option<String>,
    emitted_done: bool,
}

impl<S> ChatCompletionsSseParser<S> {
    fn new<E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    {
        Self {
            inner: SseTerminatedStream::new(stream).eventsource(),
            pending: VecDeque::new(),
            finish_reason: None,
            emitted_done: false,
        }
    }

    /// Emits the completion event once. Called when a finish reason
    /// arrives, or at stream end (force=true) for servers that close the
    /// connection without sending one.
    fn emit_completion_if_pending(&mut self, force: bool) {
        if self.emitted_done {
            return;
        }

        let reason = match &self.finish_reason {
            Some(r) => r.clone(),
            None if force => "stop".to_string(),
            None => return,
        };

        self.emitted_done = true;
        self.pending.push_back(StreamEvent::Completed {
            finish_reason: Some(map_finish_reason(&reason)),
        });
    }

    fn handle_event_data(&mut self, data: &str) -> ProviderResult<()> {
        let trimmed = data.trim();
        if trimmed.is_empty() || trimmed == "[DONE]" {
            return Ok(());
        }

        let value = serde_json::from_str::<Value>(trimmed).map_err(|err| {
            ProviderError::new(
                ProviderErrorKind::Parse,
                format!("Failed to parse SSE JSON: {err}"),
            )
        })?;
        self.handle_chunk(&value);
        Ok(())
    }

    fn handle_chunk(&mut self, value: &Value) {
        // Errors are terminal - no completion should follow
        if let Some(error) = value.get("error") {
            let error_type = error
                .get("type")
                .and_then(|v| v.as_str())
                .unwrap_or("error")
                .to_string();
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error")
                .to_string();
            self.pending.push_back(StreamEvent::Error {
                error_type,
                message,
            });
            self.emitted_done = true;
            return;
        }

        let Some(choice) = value
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
        else {
            return;
        };

        if let Some(text) = choice
            .get("delta")
            .and_then(|d| d.get("content"))
            .and_then(|v| v.as_str())
            && !text.is_empty()
        {
            self.pending.push_back(StreamEvent::TextDelta {
                text: text.to_string(),
            });
        }

        if let Some(finish_reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
            self.finish_reason = Some(finish_reason.to_string());
            self.emit_completion_if_pending(false);
        }
    }
}

impl<S, E> Stream for ChatCompletionsSseParser<S>
where
    S: Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = ProviderResult<StreamEvent>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use std::task::Poll;

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }

            let inner = Pin::new(&mut self.inner);
            match inner.poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => {
                    if let Err(err) = self.handle_event_data(&event.data) {
                        return Poll::Ready(Some(Err(err)));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(ProviderError::new(
                        ProviderErrorKind::Parse,
                        format!("SSE stream error: {e}"),
                    ))));
                }
                Poll::Ready(None) => {
                    // Stream ended - force the completion if we haven't
                    // seen a finish reason
                    self.emit_completion_if_pending(true);
                    if let Some(event) = self.pending.pop_front() {
                        return Poll::Ready(Some(Ok(event)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn map_finish_reason(reason: &str) -> String {
    match reason {
        "length" => "max_tokens".to_string(),
        "content_filter" => "error".to_string(),
        other => other.to_string(),
    }
}
