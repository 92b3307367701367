//! Generation pipeline: drives provider streams and emits progress events.
//!
//! Each `run_*` function owns one request end to end: it opens the
//! provider stream, translates stream events into [`ProgressEvent`]s on
//! the channel, and always closes the sequence with exactly one terminal
//! event (`complete` or `error`). A dropped receiver stops the run early;
//! nothing is emitted after a terminal event.

use std::sync::Arc;

use anyhow::Result;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::GenerationMode;
use crate::core::assemble::{assemble, count_slide_markers};
use crate::core::events::ProgressEvent;
use crate::core::normalize::{clean_chunk, clean_document, normalize_fragment};
use crate::core::outline::{SlideBlock, segment};
use crate::prompts;
use crate::providers::gemini::GeminiClient;
use crate::providers::openai::OpenAIClient;
use crate::providers::{ChatMessage, ProviderError, ProviderStream, StreamEvent};

/// Channel-based event sender for one generation request.
///
/// Unbounded: `chunk` events carry the response payload itself, so every
/// event must reach the consumer in order, without drops.
pub type ProgressEventTx = mpsc::UnboundedSender<ProgressEvent>;

/// Channel-based event receiver for one generation request.
pub type ProgressEventRx = mpsc::UnboundedReceiver<ProgressEvent>;

/// Creates the event channel connecting a pipeline run to its consumer.
pub fn create_event_channel() -> (ProgressEventTx, ProgressEventRx) {
    mpsc::unbounded_channel()
}

/// Returns false when the receiver hung up and the run should stop.
fn send(tx: &ProgressEventTx, event: ProgressEvent) -> bool {
    tx.send(event).is_ok()
}

/// Extracts the user-facing message from a pipeline failure.
///
/// Provider errors already carry a clean one-line message; anything else
/// is rendered with its context chain.
fn error_message(err: &anyhow::Error) -> String {
    if let Some(provider_err) = err.downcast_ref::<ProviderError>() {
        provider_err.to_string()
    } else {
        format!("{err:#}")
    }
}

/// Drives one outline generation request.
///
/// Prior conversation turns are forwarded (`user`/`assistant` roles
/// only), followed by the new user prompt. Assistant text streams back
/// as `chunk` events; the full accumulated outline arrives in the
/// terminal `complete` event.
pub async fn run_outline(
    client: &OpenAIClient,
    user_prompt: &str,
    history: &[ChatMessage],
    tx: &ProgressEventTx,
) {
    let mut messages: Vec<ChatMessage> = history
        .iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .cloned()
        .collect();
    messages.push(ChatMessage::user(user_prompt));

    let stream = match client
        .send_messages_stream(&messages, Some(prompts::OUTLINE_SYSTEM_PROMPT))
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            send(tx, ProgressEvent::error(error_message(&err)));
            return;
        }
    };

    pump_outline(stream, tx).await;
}

/// Consumes an outline stream, emitting `chunk` events and the terminal.
async fn pump_outline(mut stream: ProviderStream, tx: &ProgressEventTx) {
    let mut outline = String::new();

    while let Some(result) = stream.next().await {
        let event = match result {
            Ok(event) => event,
            Err(err) => {
                send(tx, ProgressEvent::error(err.to_string()));
                return;
            }
        };
        match event {
            StreamEvent::TextDelta { text } => {
                outline.push_str(&text);
                if !send(tx, ProgressEvent::Chunk { content: text }) {
                    return;
                }
            }
            StreamEvent::Completed { .. } => {}
            StreamEvent::Error {
                error_type,
                message,
            } => {
                let err = ProviderError::api_error(&error_type, &message);
                send(tx, ProgressEvent::error(err.to_string()));
                return;
            }
        }
    }

    debug!(bytes = outline.len(), "outline stream finished");
    send(tx, ProgressEvent::complete_outline(outline));
}

/// Drives one deck generation request.
///
/// Emits `start` with the segmented slide count, then generates per the
/// configured mode and closes with `complete` carrying the full HTML
/// document, or `error`.
pub async fn run_deck(
    client: Arc<GeminiClient>,
    mode: GenerationMode,
    user_prompt: &str,
    outline: &str,
    tx: &ProgressEventTx,
) {
    let blocks = segment(outline);
    let total = blocks.len();
    debug!(?mode, slides = total, "deck generation started");

    if !send(tx, ProgressEvent::Start { total }) {
        return;
    }

    match mode {
        GenerationMode::Parallel => run_deck_parallel(client, user_prompt, &blocks, tx).await,
        GenerationMode::Streamed => {
            run_deck_streamed(&client, user_prompt, outline, total, tx).await;
        }
    }
}

/// Whole-deck mode: one provider call produces the complete document.
async fn run_deck_streamed(
    client: &GeminiClient,
    user_prompt: &str,
    outline: &str,
    total: usize,
    tx: &ProgressEventTx,
) {
    // Baseline progress so the client renders its tracker before the
    // first token arrives.
    let initial = ProgressEvent::Progress {
        current: 0,
        total,
        slide_number: 0,
    };
    if !send(tx, initial) {
        return;
    }

    let prompt = match prompts::render_deck_prompt(user_prompt, outline) {
        Ok(prompt) => prompt,
        Err(err) => {
            send(tx, ProgressEvent::error(error_message(&err)));
            return;
        }
    };

    let stream = match client.send_prompt_stream(&prompt).await {
        Ok(stream) => stream,
        Err(err) => {
            send(tx, ProgressEvent::error(error_message(&err)));
            return;
        }
    };

    pump_deck_stream(stream, total, tx).await;
}

/// Consumes a whole-deck stream: raw text accumulates server-side while
/// fence-cleaned chunks go to the client, with slide-count progress
/// estimated from the accumulated document.
async fn pump_deck_stream(mut stream: ProviderStream, total: usize, tx: &ProgressEventTx) {
    let mut full_html = String::new();
    let mut slide_count = 0usize;

    while let Some(result) = stream.next().await {
        let event = match result {
            Ok(event) => event,
            Err(err) => {
                send(tx, ProgressEvent::error(err.to_string()));
                return;
            }
        };
        match event {
            StreamEvent::TextDelta { text } => {
                full_html.push_str(&text);

                let content = clean_chunk(&text);
                if !send(tx, ProgressEvent::Chunk { content }) {
                    return;
                }

                // Count slide openings only when this delta could have
                // closed a container; the count is a progress estimate,
                // not a correctness mechanism.
                if text.contains("</div>") {
                    let current = count_slide_markers(&full_html);
                    if current > slide_count {
                        slide_count = current;
                        let progress = ProgressEvent::Progress {
                            current: slide_count,
                            total,
                            slide_number: slide_count,
                        };
                        if !send(tx, progress) {
                            return;
                        }
                    }
                }
            }
            StreamEvent::Completed { .. } => {}
            StreamEvent::Error {
                error_type,
                message,
            } => {
                let err = ProviderError::api_error(&error_type, &message);
                send(tx, ProgressEvent::error(err.to_string()));
                return;
            }
        }
    }

    send(tx, ProgressEvent::complete_html(clean_document(&full_html)));
}

/// Per-slide mode: one provider call per block, fanned out together.
async fn run_deck_parallel(
    client: Arc<GeminiClient>,
    user_prompt: &str,
    blocks: &[SlideBlock],
    tx: &ProgressEventTx,
) {
    let total = blocks.len();
    let mut join_set: JoinSet<(usize, Result<String>)> = JoinSet::new();

    for (i, block) in blocks.iter().enumerate() {
        let prompt = match prompts::render_slide_prompt(user_prompt, &block.content, i + 1, total) {
            Ok(prompt) => prompt,
            Err(err) => {
                join_set.abort_all();
                send(tx, ProgressEvent::error(error_message(&err)));
                return;
            }
        };
        let client = Arc::clone(&client);
        join_set.spawn(async move { (i, generate_slide(&client, &prompt).await) });
    }

    let Some(fragments) = collect_fragments(join_set, total, tx).await else {
        return;
    };

    match assemble(&fragments) {
        Ok(html) => {
            send(tx, ProgressEvent::complete_html(html));
        }
        Err(err) => {
            send(tx, ProgressEvent::error(error_message(&err)));
        }
    }
}

/// Collects fan-out results, emitting one `progress` per completed slide
/// in completion order while keeping fragments in outline order.
///
/// Returns `None` after emitting a terminal `error` (or after receiver
/// hang-up); any still-running slides are aborted.
async fn collect_fragments(
    mut join_set: JoinSet<(usize, Result<String>)>,
    total: usize,
    tx: &ProgressEventTx,
) -> Option<Vec<String>> {
    let mut fragments: Vec<Option<String>> = vec![None; total];
    let mut completed = 0usize;

    while let Some(task_result) = join_set.join_next().await {
        match task_result {
            Ok((idx, Ok(html))) => {
                fragments[idx] = Some(normalize_fragment(&html, idx + 1));
                completed += 1;
                debug!(slide = idx + 1, completed, total, "slide generated");
                let progress = ProgressEvent::Progress {
                    current: completed,
                    total,
                    slide_number: idx + 1,
                };
                if !send(tx, progress) {
                    join_set.abort_all();
                    return None;
                }
            }
            Ok((idx, Err(err))) => {
                warn!(slide = idx + 1, error = %err, "slide generation failed");
                join_set.abort_all();
                send(tx, ProgressEvent::error(error_message(&err)));
                return None;
            }
            Err(err) => {
                join_set.abort_all();
                send(
                    tx,
                    ProgressEvent::error(format!("slide generation task failed: {err}")),
                );
                return None;
            }
        }
    }

    Some(fragments.into_iter().flatten().collect())
}

/// Runs one slide's generation stream to completion and returns its text.
async fn generate_slide(client: &GeminiClient, prompt: &str) -> Result<String> {
    let mut stream = client.send_prompt_stream(prompt).await?;
    let mut text = String::new();

    while let Some(result) = stream.next().await {
        match result? {
            StreamEvent::TextDelta { text: delta } => text.push_str(&delta),
            StreamEvent::Completed { .. } => {}
            StreamEvent::Error {
                error_type,
                message,
            } => {
                return Err(ProviderError::api_error(&error_type, &message).into());
            }
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio::time::{Duration, sleep};

    use super::*;
    use crate::providers::ProviderResult;
    use crate::providers::gemini::GeminiConfig;

    fn event_stream(events: Vec<ProviderResult<StreamEvent>>) -> ProviderStream {
        Box::pin(stream::iter(events))
    }

    fn drain(rx: &mut ProgressEventRx) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn unreachable_client() -> Arc<GeminiClient> {
        Arc::new(GeminiClient::new(GeminiConfig {
            api_key: "test-key".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "gemini-3-pro-preview".to_string(),
        }))
    }

    #[tokio::test]
    async fn test_pump_outline_emits_chunks_then_complete() {
        let stream = event_stream(vec![
            Ok(StreamEvent::TextDelta {
                text: "## Slide 1: A".to_string(),
            }),
            Ok(StreamEvent::TextDelta {
                text: "\n- point".to_string(),
            }),
            Ok(StreamEvent::Completed {
                finish_reason: Some("stop".to_string()),
            }),
        ]);

        let (tx, mut rx) = create_event_channel();
        pump_outline(stream, &tx).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ProgressEvent::Chunk {
                    content: "## Slide 1: A".to_string()
                },
                ProgressEvent::Chunk {
                    content: "\n- point".to_string()
                },
                ProgressEvent::complete_outline("## Slide 1: A\n- point"),
            ]
        );
    }

    #[tokio::test]
    async fn test_pump_outline_provider_error_is_terminal() {
        let stream = event_stream(vec![
            Ok(StreamEvent::TextDelta {
                text: "partial".to_string(),
            }),
            Err(ProviderError::timeout("Request timed out")),
        ]);

        let (tx, mut rx) = create_event_channel();
        pump_outline(stream, &tx).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ProgressEvent::Chunk {
                    content: "partial".to_string()
                },
                ProgressEvent::error("Request timed out"),
            ]
        );
    }

    #[tokio::test]
    async fn test_pump_outline_stream_error_event_is_terminal() {
        // Once the provider reports an error, later deltas are ignored.
        let stream = event_stream(vec![
            Ok(StreamEvent::Error {
                error_type: "server_error".to_string(),
                message: "Internal error".to_string(),
            }),
            Ok(StreamEvent::TextDelta {
                text: "late".to_string(),
            }),
        ]);

        let (tx, mut rx) = create_event_channel();
        pump_outline(stream, &tx).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ProgressEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_pump_deck_stream_progress_and_cleaned_chunks() {
        let stream = event_stream(vec![
            Ok(StreamEvent::TextDelta {
                text: "```html\n<div class=\"slide\" id=\"slide1\">one</div>".to_string(),
            }),
            Ok(StreamEvent::TextDelta {
                text: "<div class=\"slide\" id=\"slide2\">two</div>".to_string(),
            }),
            Ok(StreamEvent::TextDelta {
                text: "```".to_string(),
            }),
            Ok(StreamEvent::Completed {
                finish_reason: Some("stop".to_string()),
            }),
        ]);

        let (tx, mut rx) = create_event_channel();
        pump_deck_stream(stream, 2, &tx).await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                ProgressEvent::Chunk {
                    content: "\n<div class=\"slide\" id=\"slide1\">one</div>".to_string()
                },
                ProgressEvent::Progress {
                    current: 1,
                    total: 2,
                    slide_number: 1
                },
                ProgressEvent::Chunk {
                    content: "<div class=\"slide\" id=\"slide2\">two</div>".to_string()
                },
                ProgressEvent::Progress {
                    current: 2,
                    total: 2,
                    slide_number: 2
                },
                // Fence-only deltas still produce a (empty) chunk record.
                ProgressEvent::Chunk {
                    content: String::new()
                },
                ProgressEvent::complete_html(
                    "<div class=\"slide\" id=\"slide1\">one</div>\
                     <div class=\"slide\" id=\"slide2\">two</div>"
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_pump_deck_stream_progress_never_decreases() {
        // A single delta can open two slides at once; progress jumps to 2
        // and later closings must not re-emit lower counts.
        let stream = event_stream(vec![
            Ok(StreamEvent::TextDelta {
                text: "<div class=\"slide\" id=\"slide1\">a<div class=\"slide\" id=\"slide2\">b</div>"
                    .to_string(),
            }),
            Ok(StreamEvent::TextDelta {
                text: "</div>".to_string(),
            }),
        ]);

        let (tx, mut rx) = create_event_channel();
        pump_deck_stream(stream, 2, &tx).await;

        let currents: Vec<usize> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress { current, .. } => Some(current),
                _ => None,
            })
            .collect();
        assert_eq!(currents, vec![2]);
    }

    #[tokio::test]
    async fn test_collect_fragments_orders_by_index_not_completion() {
        let mut join_set: JoinSet<(usize, Result<String>)> = JoinSet::new();
        for (i, delay_ms) in [30u64, 5, 15].into_iter().enumerate() {
            join_set.spawn(async move {
                sleep(Duration::from_millis(delay_ms)).await;
                let html = format!("<div class=\"slide\" id=\"slide{}\">s{i}</div>", i + 1);
                (i, Ok(html))
            });
        }

        let (tx, mut rx) = create_event_channel();
        let fragments = collect_fragments(join_set, 3, &tx).await.unwrap();

        assert_eq!(
            fragments,
            vec![
                "<div class=\"slide\" id=\"slide1\">s0</div>".to_string(),
                "<div class=\"slide\" id=\"slide2\">s1</div>".to_string(),
                "<div class=\"slide\" id=\"slide3\">s2</div>".to_string(),
            ]
        );

        let progress: Vec<(usize, usize)> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress {
                    current,
                    slide_number,
                    ..
                } => Some((current, slide_number)),
                _ => None,
            })
            .collect();
        // current follows completion order (slide 2 finished first).
        assert_eq!(progress, vec![(1, 2), (2, 3), (3, 1)]);
    }

    #[tokio::test]
    async fn test_collect_fragments_slide_failure_is_terminal() {
        let mut join_set: JoinSet<(usize, Result<String>)> = JoinSet::new();
        join_set.spawn(async move {
            (
                0,
                Err(ProviderError::timeout("Request timed out").into()),
            )
        });
        join_set.spawn(async move {
            sleep(Duration::from_millis(50)).await;
            (1, Ok("<div class=\"slide\" id=\"slide2\">b</div>".to_string()))
        });

        let (tx, mut rx) = create_event_channel();
        let fragments = collect_fragments(join_set, 2, &tx).await;

        assert!(fragments.is_none());
        let events = drain(&mut rx);
        assert_eq!(events, vec![ProgressEvent::error("Request timed out")]);
    }

    #[tokio::test]
    async fn test_run_deck_emits_start_before_any_generation() {
        let (tx, mut rx) = create_event_channel();
        run_deck(
            unreachable_client(),
            GenerationMode::Streamed,
            "demo",
            "## Slide 1: A\n- x\n## Slide 2: B\n- y",
            &tx,
        )
        .await;

        let events = drain(&mut rx);
        assert_eq!(events[0], ProgressEvent::Start { total: 2 });
        assert_eq!(
            events[1],
            ProgressEvent::Progress {
                current: 0,
                total: 2,
                slide_number: 0
            }
        );
        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_run_deck_parallel_failure_is_single_terminal_error() {
        let (tx, mut rx) = create_event_channel();
        run_deck(
            unreachable_client(),
            GenerationMode::Parallel,
            "demo",
            "## Slide 1: A",
            &tx,
        )
        .await;

        let events = drain(&mut rx);
        assert_eq!(events[0], ProgressEvent::Start { total: 1 });
        let terminals = events
            .iter()
            .filter(|event| event.is_terminal())
            .count();
        assert_eq!(terminals, 1);
        assert!(matches!(events.last(), Some(ProgressEvent::Error { .. })));
    }
}
