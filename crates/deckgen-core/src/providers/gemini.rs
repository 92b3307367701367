//! Gemini streaming client.
//!
//! Used for deck generation: a single-turn `streamGenerateContent` call
//! per slide (or per deck), text deltas out. Gemini may stream text
//! either incrementally or cumulatively depending on endpoint; the
//! parser computes rolling deltas so callers always see increments.

use std::collections::VecDeque;
use std::pin::Pin;

use anyhow::Result;
use eventsource_stream::{EventStream, Eventsource};
use futures_util::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::config::Config;
use crate::providers::shared::{
    ProviderError, ProviderErrorKind, ProviderResult, ProviderStream, StreamEvent, USER_AGENT,
    classify_reqwest_error, resolve_api_key, resolve_base_url,
};

/// Default endpoint when neither env nor config overrides it.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for deck generation.
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Gemini API configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl GeminiConfig {
    /// Resolves credentials, endpoint and model from config and environment.
    ///
    /// # Errors
    /// Returns an error if no API key is available or a configured base
    /// URL is malformed.
    pub fn from_env(config: &Config) -> Result<Self> {
        let provider = &config.providers.gemini;
        let api_key = resolve_api_key(
            provider.api_key.as_deref(),
            "GOOGLE_GENERATIVE_AI_API_KEY",
            "gemini",
        )?;
        let base_url = resolve_base_url(
            provider.base_url.as_deref(),
            "GEMINI_BASE_URL",
            DEFAULT_BASE_URL,
            "Gemini",
        )?;
        let model = provider
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(Self {
            api_key,
            base_url,
            model,
        })
    }
}

/// Gemini streaming content client.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Opens a streaming generation for a single user prompt.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server responds with
    /// a non-success status.
    pub async fn send_prompt_stream(&self, prompt: &str) -> Result<ProviderStream> {
        let request = build_generate_request(prompt);
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.model
        );
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
        Ok(Box::pin(GeminiSseParser::new(byte_stream)))
    }
}

fn build_generate_request(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{
                "text": prompt
            }]
        }]
    })
}

fn build_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-goog-api-key",
        HeaderValue::from_str(api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    headers.insert("accept", HeaderValue::from_static("text/event-stream"));
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert("user-agent", HeaderValue::from_static(USER_AGENT));
    headers
}

/// Gemini SSE stream parser.
///
/// Parses Server-Sent Events from Gemini responses and converts them to
/// normalized `StreamEvent`s.
struct GeminiSseParser<S> {
    inner: EventStream<S>,
    pending: VecDeque<StreamEvent>,
    /// Accumulated text for rolling delta calculation
    last_text: String,
    finish_reason: Option<String>,
    emitted_done: bool,
}

impl<S> GeminiSseParser<S> {
    fn new(stream: S) -> Self
    where
        S: Eventsource,
    {
        Self {
            inner: stream.eventsource(),
            pending: VecDeque::new(),
            last_text: String::new(),
            finish_reason: None,
            emitted_done: false,
        }
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
        let payload = value.get("response").unwrap_or(value);

        if let Some(error) = value.get("error").or_else(|| payload.get("error")) {
            let error_type = error
                .get("status")
                .or_else(|| error.get("code"))
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
            return;
        }

        if let Some(candidates) = payload.get("candidates").and_then(|v| v.as_array())
            && let Some(candidate) = candidates.first()
        {
            if let Some(reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
                self.finish_reason = Some(reason.to_string());
            }

            if let Some(content) = candidate.get("content")
                && let Some(parts) = content.get("parts").and_then(|v| v.as_array())
            {
                // Thought parts carry model reasoning, not document text.
                let mut combined_text = String::new();
                for part in parts {
                    let is_thought = part
                        .get("thought")
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false);
                    if !is_thought && let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                        combined_text.push_str(text);
                    }
                }

                if !combined_text.is_empty() {
                    // Cumulative payloads repeat everything seen so far;
                    // incremental ones carry only the new tail.
                    let delta = if combined_text.starts_with(&self.last_text) {
                        combined_text[self.last_text.len()..].to_string()
                    } else {
                        combined_text.clone()
                    };
                    self.last_text = combined_text;
                    if !delta.is_empty() {
                        self.pending.push_back(StreamEvent::TextDelta { text: delta });
                    }
                }
            }
        }

        if let Some(reason) = self.finish_reason.clone()
            && !self.emitted_done
        {
            self.emitted_done = true;
            self.pending.push_back(StreamEvent::Completed {
                finish_reason: Some(map_finish_reason(&reason)),
            });
        }
    }
}

impl<S, E> Stream for GeminiSseParser<S>
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
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Maps Gemini finish reasons to normalized stop reasons.
fn map_finish_reason(reason: &str) -> String {
    match reason {
        "MAX_TOKENS" | "max_tokens" => "max_tokens".to_string(),
        "STOP" | "stop" => "stop".to_string(),
        other => other.to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::{StreamExt, stream};
    use serde_json::json;

    use super::*;

    /// Creates a mock SSE parser for testing.
    fn create_test_parser() -> GeminiSseParser<impl Stream<Item = Result<Bytes, std::io::Error>>> {
        GeminiSseParser::new(stream::empty())
    }

    /// Helper to create a mock byte stream from a string
    fn mock_byte_stream(
        data: &str,
    ) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Unpin {
        let chunks: Vec<_> = data
            .as_bytes()
            .chunks(50) // Simulate chunked delivery
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks)
    }

    #[test]
    fn test_incremental_text_parts_pass_through() {
        let mut parser = create_test_parser();

        parser.handle_chunk(&json!({
            "candidates": [{"content": {"parts": [{"text": "<html>"}]}}]
        }));
        parser.handle_chunk(&json!({
            "candidates": [{"content": {"parts": [{"text": "<head>"}]}}]
        }));

        assert_eq!(
            parser.pending.pop_front().unwrap(),
            StreamEvent::TextDelta {
                text: "<html>".to_string()
            }
        );
        assert_eq!(
            parser.pending.pop_front().unwrap(),
            StreamEvent::TextDelta {
                text: "<head>".to_string()
            }
        );
    }

    #[test]
    fn test_cumulative_text_yields_rolling_delta() {
        let mut parser = create_test_parser();

        parser.handle_chunk(&json!({
            "candidates": [{"content": {"parts": [{"text": "Hello"}]}}]
        }));
        parser.handle_chunk(&json!({
            "candidates": [{"content": {"parts": [{"text": "Hello world"}]}}]
        }));

        parser.pending.pop_front();
        assert_eq!(
            parser.pending.pop_front().unwrap(),
            StreamEvent::TextDelta {
                text: " world".to_string()
            }
        );
    }

    #[test]
    fn test_thought_parts_are_filtered() {
        let mut parser = create_test_parser();

        parser.handle_chunk(&json!({
            "candidates": [{"content": {"parts": [
                {"thought": true, "text": "Planning the layout..."},
                {"text": "<div>"}
            ]}}]
        }));

        assert_eq!(parser.pending.len(), 1);
        assert_eq!(
            parser.pending.pop_front().unwrap(),
            StreamEvent::TextDelta {
                text: "<div>".to_string()
            }
        );
    }

    #[test]
    fn test_finish_reason_emits_completed_once() {
        let mut parser = create_test_parser();

        parser.handle_chunk(&json!({
            "candidates": [{
                "content": {"parts": [{"text": "done"}]},
                "finishReason": "STOP"
            }]
        }));
        parser.handle_chunk(&json!({
            "candidates": [{"finishReason": "STOP"}]
        }));

        let events: Vec<_> = parser.pending.drain(..).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    text: "done".to_string()
                },
                StreamEvent::Completed {
                    finish_reason: Some("stop".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_max_tokens_finish_reason_normalized() {
        let mut parser = create_test_parser();
        parser.handle_chunk(&json!({
            "candidates": [{"finishReason": "MAX_TOKENS"}]
        }));

        assert_eq!(
            parser.pending.pop_front().unwrap(),
            StreamEvent::Completed {
                finish_reason: Some("max_tokens".to_string())
            }
        );
    }

    #[test]
    fn test_error_chunk_emits_error_event() {
        let mut parser = create_test_parser();
        parser.handle_chunk(&json!({
            "error": {"status": "RESOURCE_EXHAUSTED", "message": "Quota exceeded"}
        }));

        assert_eq!(
            parser.pending.pop_front().unwrap(),
            StreamEvent::Error {
                error_type: "RESOURCE_EXHAUSTED".to_string(),
                message: "Quota exceeded".to_string()
            }
        );
    }

    #[test]
    fn test_error_with_numeric_code_falls_back() {
        let mut parser = create_test_parser();
        parser.handle_chunk(&json!({
            "error": {"code": 429, "message": "Too many requests"}
        }));

        assert_eq!(
            parser.pending.pop_front().unwrap(),
            StreamEvent::Error {
                error_type: "error".to_string(),
                message: "Too many requests".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_sse_parser_streams_deck_chunks() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"<!DOCTYPE html><html><head><style>.slide{}</style></head>\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"<body><div class=\\\"slide\\\" id=\\\"slide1\\\">Hi</div></body></html>\"}]},\"finishReason\":\"STOP\"}]}\n\n",
        );
        let mut parser = GeminiSseParser::new(mock_byte_stream(body));

        let mut events = Vec::new();
        while let Some(result) = parser.next().await {
            events.push(result.expect("Expected valid event"));
        }

        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], StreamEvent::TextDelta { text } if text.starts_with("<!DOCTYPE")));
        assert!(matches!(&events[1], StreamEvent::TextDelta { text } if text.contains("slide1")));
        assert_eq!(
            events[2],
            StreamEvent::Completed {
                finish_reason: Some("stop".to_string())
            }
        );
    }
}
