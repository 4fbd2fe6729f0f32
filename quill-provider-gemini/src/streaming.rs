//! SSE streaming for `streamGenerateContent`.
//!
//! Gemini streams `data:` lines, each a complete GenerateContentResponse
//! chunk. Function calls arrive whole within a single chunk, so each one
//! yields a name-carrying `ToolCallDelta` immediately followed by the
//! completed `ToolCall` — a degenerate but valid contiguous prefix.

use futures::{Stream, StreamExt};
use quill_types::{StopReason, StreamError, StreamEvent, StreamHandle};
use reqwest::Response;

use crate::transform::{parse_finish_reason, parse_usage};

/// Wrap an HTTP response body into a [`StreamHandle`] emitting canonical
/// events.
pub(crate) fn stream_completion(response: Response) -> StreamHandle {
    StreamHandle::new(parse_chunk_stream(response.bytes_stream()))
}

fn parse_chunk_stream(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let mut state = ChunkParserState::new();
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

struct ChunkParserState {
    /// Running index for synthesized tool-call ids.
    call_index: usize,
    stop_reason: Option<StopReason>,
    usage_emitted: bool,
    done_emitted: bool,
}

impl ChunkParserState {
    fn new() -> Self {
        Self {
            call_index: 0,
            stop_reason: None,
            usage_emitted: false,
            done_emitted: false,
        }
    }

    fn process_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let Some(data) = line.strip_prefix("data:") else {
            return vec![];
        };
        let data = data.trim();
        if data.is_empty() {
            return vec![];
        }

        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                return vec![StreamEvent::Error(StreamError::non_retryable(
                    "parse_error",
                    format!("JSON parse error in SSE: {e}"),
                ))];
            }
        };

        let mut events = Vec::new();

        if json["usageMetadata"].is_object() && !self.usage_emitted {
            // Gemini repeats usageMetadata on interim chunks; emit only the
            // final one, recognized by the finish reason on the candidate.
            if json["candidates"][0]["finishReason"].is_string() {
                self.usage_emitted = true;
                events.push(StreamEvent::Usage(parse_usage(&json["usageMetadata"])));
            }
        }

        let Some(candidate) = json["candidates"].as_array().and_then(|arr| arr.first()) else {
            return events;
        };

        for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
            if let Some(text) = part["text"].as_str() {
                if part["thought"].as_bool().unwrap_or(false) {
                    events.push(StreamEvent::Reasoning {
                        text: text.to_string(),
                    });
                } else {
                    events.push(StreamEvent::Text {
                        text: text.to_string(),
                    });
                }
            } else if part["functionCall"].is_object() {
                let call = &part["functionCall"];
                let name = call["name"].as_str().unwrap_or_default().to_string();
                let input = call["args"].clone();
                let id = format!("{name}-{}", self.call_index);
                self.call_index += 1;
                events.push(StreamEvent::ToolCallDelta {
                    id: id.clone(),
                    name: Some(name.clone()),
                    input_delta: input.to_string(),
                });
                events.push(StreamEvent::ToolCall { id, name, input });
            }
        }

        if let Some(reason) = candidate["finishReason"].as_str() {
            self.stop_reason = Some(parse_finish_reason(reason));
        }

        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done_emitted {
            return vec![];
        }
        self.done_emitted = true;
        vec![StreamEvent::Done {
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
        }]
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
