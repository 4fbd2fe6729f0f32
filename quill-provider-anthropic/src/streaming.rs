//! SSE streaming for the Anthropic Messages API.
//!
//! Parses the Server-Sent Events stream and maps vendor events onto the
//! canonical [`StreamEvent`] sequence: `Usage` is emitted at most once and
//! always precedes the final `Done`.
//!
//! Reference: <https://docs.anthropic.com/en/api/messages-streaming>

use std::collections::HashMap;

use futures::{Stream, StreamExt};
use quill_types::{AccumulatingToolCall, StopReason, StreamError, StreamEvent, StreamHandle};
use reqwest::Response;

use crate::transform::parse_usage;

/// Wrap an HTTP response body into a [`StreamHandle`] emitting canonical
/// events.
pub(crate) fn stream_completion(response: Response) -> StreamHandle {
    StreamHandle::new(parse_sse_stream(response.bytes_stream()))
}

/// Parse a raw byte stream into canonical [`StreamEvent`]s.
fn parse_sse_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut state = SseParserState::new();
        let mut bytes_stream = std::pin::pin!(byte_stream);
        let mut line_buf = String::new();

        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(b) => b,
                Err(e) => {
                    yield StreamEvent::Error(StreamError::retryable(
                        "stream_read",
                        format!("stream read error: {e}"),
                    ));
                    yield StreamEvent::Done { stop_reason: StopReason::Error };
                    return;
                }
            };

            let chunk_str = match std::str::from_utf8(&chunk) {
                Ok(s) => s,
                Err(e) => {
                    yield StreamEvent::Error(StreamError::non_retryable(
                        "utf8",
                        format!("UTF-8 decode error: {e}"),
                    ));
                    yield StreamEvent::Done { stop_reason: StopReason::Error };
                    return;
                }
            };

            line_buf.push_str(chunk_str);
            while let Some(newline_pos) = line_buf.find('\n') {
                let line = line_buf[..newline_pos].trim_end_matches('\r').to_string();
                line_buf.drain(..=newline_pos);
                for event in state.process_line(&line) {
                    yield event;
                }
            }
        }

        if !line_buf.trim().is_empty() {
            for event in state.process_line(line_buf.trim()) {
                yield event;
            }
        }
        for event in state.finish() {
            yield event;
        }
    }
}

/// Tracks in-progress streaming state across SSE events.
struct SseParserState {
    /// The current SSE event type (from `event:` lines).
    current_event_type: Option<String>,
    /// The current SSE data (from `data:` lines; may be multi-line).
    current_data: String,
    /// Block index → in-progress tool call.
    tool_calls: HashMap<usize, AccumulatingToolCall>,
    /// Stop reason reported by `message_delta`.
    stop_reason: Option<StopReason>,
    /// Whether the terminal `Done` was already emitted.
    done_emitted: bool,
}

impl SseParserState {
    fn new() -> Self {
        Self {
            current_event_type: None,
            current_data: String::new(),
            tool_calls: HashMap::new(),
            stop_reason: None,
            done_emitted: false,
        }
    }

    /// Process one SSE line and return any events it produces.
    fn process_line(&mut self, line: &str) -> Vec<StreamEvent> {
        if line.is_empty() {
            return self.dispatch_event();
        }
        if let Some(event_type) = line.strip_prefix("event: ") {
            self.current_event_type = Some(event_type.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data: ") {
            if !self.current_data.is_empty() {
                self.current_data.push('\n');
            }
            self.current_data.push_str(data.trim());
        }
        // Comment lines (":" prefix) and anything else are ignored.
        vec![]
    }

    /// Emit the terminal `Done` if the stream ended without `message_stop`.
    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done_emitted {
            return vec![];
        }
        self.done_emitted = true;
        vec![StreamEvent::Done {
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
        }]
    }

    fn dispatch_event(&mut self) -> Vec<StreamEvent> {
        let Some(event_type) = self.current_event_type.take() else {
            self.current_data.clear();
            return vec![];
        };
        let data = std::mem::take(&mut self.current_data);
        if data.is_empty() || data == "[DONE]" {
            return vec![];
        }

        let json: serde_json::Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => {
                return vec![StreamEvent::Error(StreamError::non_retryable(
                    "parse_error",
                    format!("JSON parse error in SSE: {e}"),
                ))];
            }
        };

        match event_type.as_str() {
            "content_block_start" => self.handle_block_start(&json),
            "content_block_delta" => self.handle_block_delta(&json),
            "content_block_stop" => self.handle_block_stop(&json),
            "message_delta" => self.handle_message_delta(&json),
            "message_stop" => self.finish(),
            "message_start" | "ping" => vec![],
            "error" => {
                let message = json["error"]["message"]
                    .as_str()
                    .unwrap_or("unknown streaming error")
                    .to_string();
                let code = json["error"]["type"]
                    .as_str()
                    .unwrap_or("stream_error")
                    .to_string();
                let retryable = code == "overloaded_error";
                self.stop_reason = Some(StopReason::Error);
                let mut events = vec![StreamEvent::Error(StreamError {
                    code,
                    message,
                    retryable,
                })];
                events.extend(self.finish());
                events
            }
            _ => vec![],
        }
    }

    fn handle_block_start(&mut self, json: &serde_json::Value) -> Vec<StreamEvent> {
        let index = json["index"].as_u64().unwrap_or(0) as usize;
        let block = &json["content_block"];
        if block["type"].as_str() == Some("tool_use") {
            let id = block["id"].as_str().unwrap_or_default().to_string();
            let name = block["name"].as_str().unwrap_or_default().to_string();
            let mut acc = AccumulatingToolCall::new(id.clone());
            acc.push_delta(Some(&name), "");
            self.tool_calls.insert(index, acc);
            return vec![StreamEvent::ToolCallDelta {
                id,
                name: Some(name),
                input_delta: String::new(),
            }];
        }
        vec![]
    }

    fn handle_block_delta(&mut self, json: &serde_json::Value) -> Vec<StreamEvent> {
        let index = json["index"].as_u64().unwrap_or(0) as usize;
        let delta = &json["delta"];
        match delta["type"].as_str().unwrap_or_default() {
            "text_delta" => vec![StreamEvent::Text {
                text: delta["text"].as_str().unwrap_or_default().to_string(),
            }],
            "thinking_delta" => vec![StreamEvent::Reasoning {
                text: delta["thinking"].as_str().unwrap_or_default().to_string(),
            }],
            "input_json_delta" => {
                let partial = delta["partial_json"].as_str().unwrap_or_default();
                let id = match self.tool_calls.get_mut(&index) {
                    Some(acc) => {
                        acc.push_delta(None, partial);
                        acc.id.clone()
                    }
                    None => String::new(),
                };
                vec![StreamEvent::ToolCallDelta {
                    id,
                    name: None,
                    input_delta: partial.to_string(),
                }]
            }
            // signature_delta and unknown delta kinds carry nothing canonical.
            _ => vec![],
        }
    }

    fn handle_block_stop(&mut self, json: &serde_json::Value) -> Vec<StreamEvent> {
        let index = json["index"].as_u64().unwrap_or(0) as usize;
        match self.tool_calls.remove(&index) {
            Some(acc) => vec![acc.finish()],
            None => vec![],
        }
    }

    fn handle_message_delta(&mut self, json: &serde_json::Value) -> Vec<StreamEvent> {
        if let Some(reason) = json["delta"]["stop_reason"].as_str() {
            self.stop_reason = Some(match reason {
                "tool_use" => StopReason::ToolUse,
                "max_tokens" => StopReason::MaxTokens,
                "stop_sequence" => StopReason::StopSequence,
                "refusal" => StopReason::ContentFilter,
                _ => StopReason::EndTurn,
            });
        }
        match json.get("usage") {
            Some(usage) => vec![StreamEvent::Usage(parse_usage(usage))],
            None => vec![],
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
