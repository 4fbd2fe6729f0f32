//! Canonical stream events and the handle providers return for streaming.
//!
//! Every provider owns the conversion from its wire events (SSE, NDJSON)
//! into this sequence. Ordering guarantees: `Usage` arrives at most once and
//! precedes `Done`; `ToolCallDelta` events for a given id form a contiguous
//! prefix of the eventual `ToolCall`; `Text` and `Reasoning` deltas are
//! emitted on UTF-8 boundaries and never interleave within one token.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::types::{StopReason, TokenUsage};

/// An error carried inside a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamError {
    /// Stable machine-readable code (e.g. `"overloaded"`, `"parse_error"`).
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying the whole request might succeed.
    pub retryable: bool,
}

impl StreamError {
    /// Create a retryable stream error.
    #[must_use]
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable stream error.
    #[must_use]
    pub fn non_retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }
}

/// A canonical streaming event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A chunk of response text.
    Text {
        /// The text delta.
        text: String,
    },
    /// A chunk of reasoning/thinking text.
    Reasoning {
        /// The reasoning delta.
        text: String,
    },
    /// A chunk of a tool call's input JSON.
    ToolCallDelta {
        /// Id of the tool call being assembled.
        id: String,
        /// Tool name, present on the first delta for an id.
        name: Option<String>,
        /// Partial input JSON.
        input_delta: String,
    },
    /// A completed tool call with fully parsed input.
    ToolCall {
        /// Id of the tool call.
        id: String,
        /// Tool name.
        name: String,
        /// Parsed input arguments.
        input: serde_json::Value,
    },
    /// Token usage for the call. Emitted at most once, before `Done`.
    Usage(TokenUsage),
    /// A transport or vendor error; the stream ends after `Done` follows.
    Error(StreamError),
    /// End of stream.
    Done {
        /// Why the model stopped.
        stop_reason: StopReason,
    },
}

/// Explicit accumulation state for one in-flight tool call.
///
/// Providers feed `ToolCallDelta` payloads into this and call
/// [`AccumulatingToolCall::finish`] when the vendor signals the call is
/// complete.
#[derive(Debug, Clone, Default)]
pub struct AccumulatingToolCall {
    /// Tool call id.
    pub id: String,
    /// Tool name, once known.
    pub name: Option<String>,
    /// Concatenated input JSON fragments.
    pub buffer: String,
}

impl AccumulatingToolCall {
    /// Start accumulating a call with the given id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            buffer: String::new(),
        }
    }

    /// Append an input fragment, recording the name if newly learned.
    pub fn push_delta(&mut self, name: Option<&str>, input_delta: &str) {
        if self.name.is_none()
            && let Some(n) = name
        {
            self.name = Some(n.to_string());
        }
        self.buffer.push_str(input_delta);
    }

    /// Consume the accumulator and produce the completed [`StreamEvent::ToolCall`].
    ///
    /// An empty or unparseable buffer yields an empty JSON object so the tool
    /// dispatcher can still schema-validate the call.
    #[must_use]
    pub fn finish(self) -> StreamEvent {
        let input = if self.buffer.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.buffer)
                .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()))
        };
        StreamEvent::ToolCall {
            id: self.id,
            name: self.name.unwrap_or_default(),
            input,
        }
    }
}

/// Handle to an in-flight streaming completion.
pub struct StreamHandle {
    /// The event stream. Pinned and boxed so callers do not depend on the
    /// provider's concrete stream type.
    pub receiver: Pin<Box<dyn Stream<Item = StreamEvent> + Send>>,
}

impl StreamHandle {
    /// Wrap a stream of events.
    #[must_use]
    pub fn new(stream: impl Stream<Item = StreamEvent> + Send + 'static) -> Self {
        Self {
            receiver: Box::pin(stream),
        }
    }
}

impl Stream for StreamHandle {
    type Item = StreamEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.as_mut().poll_next(cx)
    }
}
