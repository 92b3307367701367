//! Request routing and endpoint handlers.
//!
//! Streaming endpoints validate their inputs and resolve provider
//! credentials first; only then is the event stream opened, so a
//! misconfigured provider surfaces as plain JSON instead of a stream
//! that dies immediately.

use std::sync::Arc;

use anyhow::{Context, Result};
use deckgen_core::core::pipeline::{self, ProgressEventRx, create_event_channel};
use deckgen_core::providers::ChatMessage;
use deckgen_core::providers::gemini::{GeminiClient, GeminiConfig};
use deckgen_core::providers::openai::{OpenAIClient, OpenAIConfig};
use serde::Deserialize;
use serde_json::json;
use tiny_http::{Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use super::ServerState;
use super::sse;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutlineRequest {
    #[serde(default)]
    user_prompt: String,
    #[serde(default)]
    conversation_history: Vec<ChatMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeckRequest {
    #[serde(default)]
    outline: String,
    #[serde(default)]
    user_prompt: String,
}

#[derive(Deserialize)]
struct SaveRequest {
    #[serde(default)]
    html: String,
}

/// Dispatches one request. Respond failures are logged, not propagated;
/// the client is already gone.
pub fn handle(state: &ServerState, request: Request) {
    let method = request.method().clone();
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or(&url).to_string();
    debug!(%method, %url, "request");

    let result = match (&method, path.as_str()) {
        (Method::Post, "/api/generate-outline") => generate_outline(state, request),
        (Method::Post, "/api/generate-ppt") => generate_deck(state, request),
        (Method::Post, "/api/save-ppt") => save_deck(state, request),
        (Method::Get, p) if p.starts_with("/preview/") => {
            let id = p.trim_start_matches("/preview/").to_string();
            preview(state, request, &id)
        }
        _ => respond_json(request, 404, &json!({ "error": "Not found" })),
    };

    if let Err(e) = result {
        warn!(error = %e, %method, %url, "request handler failed");
    }
}

fn generate_outline(state: &ServerState, mut request: Request) -> Result<()> {
    let parsed: OutlineRequest = match read_json(&mut request) {
        Ok(parsed) => parsed,
        Err(e) => {
            return respond_json(
                request,
                500,
                &json!({ "error": "Failed to generate outline", "details": format!("{e:#}") }),
            );
        }
    };

    let client = match OpenAIConfig::from_env(&state.config) {
        Ok(config) => OpenAIClient::new(config),
        Err(e) => return respond_json(request, 500, &json!({ "error": format!("{e:#}") })),
    };

    let (tx, rx) = create_event_channel();
    state.handle.spawn(async move {
        pipeline::run_outline(
            &client,
            &parsed.user_prompt,
            &parsed.conversation_history,
            &tx,
        )
        .await;
    });

    respond_event_stream(state, request, rx)
}

fn generate_deck(state: &ServerState, mut request: Request) -> Result<()> {
    let parsed: DeckRequest = match read_json(&mut request) {
        Ok(parsed) => parsed,
        Err(e) => {
            return respond_json(
                request,
                500,
                &json!({ "error": "Failed to generate PPT", "details": format!("{e:#}") }),
            );
        }
    };

    let client = match GeminiConfig::from_env(&state.config) {
        Ok(config) => Arc::new(GeminiClient::new(config)),
        Err(e) => return respond_json(request, 500, &json!({ "error": format!("{e:#}") })),
    };

    let mode = state.config.generation.mode;
    let (tx, rx) = create_event_channel();
    state.handle.spawn(async move {
        pipeline::run_deck(client, mode, &parsed.user_prompt, &parsed.outline, &tx).await;
    });

    respond_event_stream(state, request, rx)
}

fn save_deck(state: &ServerState, mut request: Request) -> Result<()> {
    let parsed: SaveRequest = match read_json(&mut request) {
        Ok(parsed) => parsed,
        Err(e) => {
            return respond_json(
                request,
                500,
                &json!({ "error": "Failed to save presentation", "details": format!("{e:#}") }),
            );
        }
    };

    if parsed.html.trim().is_empty() {
        return respond_json(request, 400, &json!({ "error": "HTML content is required" }));
    }

    match state.handle.block_on(state.store.save(&parsed.html)) {
        Ok(saved) => respond_json(
            request,
            200,
            &json!({
                "success": true,
                "previewUrl": format!("/preview/{}", saved.id),
                "blobUrl": saved.location,
                "presentationId": saved.id,
            }),
        ),
        Err(e) => respond_json(
            request,
            500,
            &json!({ "error": "Failed to save presentation", "details": format!("{e:#}") }),
        ),
    }
}

fn preview(state: &ServerState, request: Request, id: &str) -> Result<()> {
    if id.is_empty() {
        return respond_json(request, 404, &json!({ "error": "Not found" }));
    }

    match state.handle.block_on(state.store.load(id)) {
        Ok(Some(html)) => {
            let response = Response::from_string(html)
                .with_header(sse::header("Content-Type", "text/html"))
                .with_header(sse::header("Cache-Control", "public, max-age=3600"));
            request.respond(response).context("write preview response")
        }
        Ok(None) => respond_json(
            request,
            404,
            &json!({
                "error": "Presentation not found",
                "id": id,
                "path": state.store.expected_key(id),
            }),
        ),
        Err(e) => respond_json(
            request,
            500,
            &json!({ "error": "Failed to load presentation", "details": format!("{e:#}") }),
        ),
    }
}

/// Reads and deserializes a JSON request body.
fn read_json<T: serde::de::DeserializeOwned>(request: &mut Request) -> Result<T> {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .context("read request body")?;
    serde_json::from_str(&body).context("parse request body")
}

fn respond_json(request: Request, status: u16, body: &serde_json::Value) -> Result<()> {
    let response = Response::from_string(body.to_string())
        .with_status_code(StatusCode(status))
        .with_header(sse::header("Content-Type", "application/json"));
    request.respond(response).context("write response")
}

/// Answers with a chunked `text/event-stream` body fed by the pipeline's
/// event channel. A forwarding task frames events as they arrive; the
/// body ends once the pipeline drops its sender.
fn respond_event_stream(
    state: &ServerState,
    request: Request,
    mut rx: ProgressEventRx,
) -> Result<()> {
    let (frame_tx, frame_rx) = std::sync::mpsc::channel::<Vec<u8>>();
    state.handle.spawn(async move {
        while let Some(event) = rx.recv().await {
            // Receiver dropped means the client disconnected; dropping rx
            // in turn stops the pipeline on its next send.
            if frame_tx.send(sse::frame(&event)).is_err() {
                break;
            }
        }
    });

    let response = Response::new(
        StatusCode(200),
        sse::stream_headers(),
        sse::FrameReader::new(frame_rx),
        None,
        None,
    );
    request.respond(response).context("write event stream")
}
