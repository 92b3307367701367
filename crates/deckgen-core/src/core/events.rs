//! Progress event types for streaming.
//!
//! This module defines the contract for events emitted while a deck or
//! outline is being generated. Events are serialized as JSON and framed
//! as server-sent events by the HTTP layer.

use serde::{Deserialize, Serialize};

/// Events emitted during a generation run.
///
/// Exactly one terminal event (`Complete` or `Error`) ends every run;
/// the channel closes after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Generation has started; carries the planned slide count.
    Start { total: usize },

    /// A slide finished generating.
    ///
    /// `current` is the number of slides done so far, `slide_number` the
    /// one-based index of the slide that just finished. In streamed mode
    /// both are inferred from markup seen in the output stream.
    #[serde(rename_all = "camelCase")]
    Progress {
        current: usize,
        total: usize,
        slide_number: usize,
    },

    /// Incremental text from the model, fences already stripped.
    Chunk { content: String },

    /// Generation finished; carries the final document or outline.
    Complete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outline: Option<String>,
    },

    /// Generation failed; no further events follow.
    Error { error: String },
}

impl ProgressEvent {
    /// Creates a `Complete` event carrying a finished HTML document.
    pub fn complete_html(html: impl Into<String>) -> Self {
        ProgressEvent::Complete {
            html: Some(html.into()),
            outline: None,
        }
    }

    /// Creates a `Complete` event carrying a finished outline.
    pub fn complete_outline(outline: impl Into<String>) -> Self {
        ProgressEvent::Complete {
            html: None,
            outline: Some(outline.into()),
        }
    }

    /// Creates an `Error` event from any displayable error.
    pub fn error(message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            error: message.into(),
        }
    }

    /// Returns true if no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Complete { .. } | ProgressEvent::Error { .. }
        )
    }
}
