//! SSE streaming for Chat Completions.
//!
//! OpenAI streams `data:`-only SSE lines carrying `chat.completion.chunk`
//! objects, terminated by `data: [DONE]`. Tool-call arguments arrive as
//! string fragments indexed by position; they are accumulated and emitted
//! as a completed `ToolCall` when the finish reason arrives.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use quill_types::{AccumulatingToolCall, StopReason, StreamError, StreamEvent, StreamHandle};
use reqwest::Response;

use crate::transform::parse_usage;

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

/// Tracks in-progress streaming state across chunks.
struct ChunkParserState {
    /// Tool-call index → accumulator, ordered so completions are stable.
    tool_calls: BTreeMap<usize, AccumulatingToolCall>,
    /// Stop reason reported by a chunk's finish_reason.
    stop_reason: Option<StopReason>,
    /// Whether usage was already emitted.
    usage_emitted: bool,
    /// Whether the terminal `Done` was already emitted.
    done_emitted: bool,
}

impl ChunkParserState {
    fn new() -> Self {
        Self {
            tool_calls: BTreeMap::new(),
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
        if data == "[DONE]" {
            return self.finish();
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

        // Usage arrives on the final chunk when stream_options request it.
        if json["usage"].is_object() && !self.usage_emitted {
            self.usage_emitted = true;
            events.push(StreamEvent::Usage(parse_usage(&json["usage"])));
        }

        let Some(choice) = json["choices"].as_array().and_then(|arr| arr.first()) else {
            return events;
        };
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str()
            && !text.is_empty()
        {
            events.push(StreamEvent::Text {
                text: text.to_string(),
            });
        }
        if let Some(text) = delta["reasoning_content"].as_str()
            && !text.is_empty()
        {
            events.push(StreamEvent::Reasoning {
                text: text.to_string(),
            });
        }

        if let Some(calls) = delta["tool_calls"].as_array() {
            for call in calls {
                let index = call["index"].as_u64().unwrap_or(0) as usize;
                let id = call["id"].as_str();
                let name = call["function"]["name"].as_str();
                let fragment = call["function"]["arguments"].as_str().unwrap_or_default();

                let acc = self.tool_calls.entry(index).or_insert_with(|| {
                    AccumulatingToolCall::new(id.unwrap_or_default())
                });
                if acc.id.is_empty()
                    && let Some(id) = id
                {
                    acc.id = id.to_string();
                }
                acc.push_delta(name, fragment);
                events.push(StreamEvent::ToolCallDelta {
                    id: acc.id.clone(),
                    name: name.map(str::to_string),
                    input_delta: fragment.to_string(),
                });
            }
        }

        if let Some(reason) = choice["finish_reason"].as_str() {
            self.stop_reason = Some(match reason {
                "length" => StopReason::MaxTokens,
                "tool_calls" | "function_call" => StopReason::ToolUse,
                "content_filter" => StopReason::ContentFilter,
                _ => StopReason::EndTurn,
            });
            // Flush completed tool calls once the model is done emitting.
            for (_, acc) in std::mem::take(&mut self.tool_calls) {
                events.push(acc.finish());
            }
        }

        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done_emitted {
            return vec![];
        }
        self.done_emitted = true;
        let mut events: Vec<StreamEvent> = std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(AccumulatingToolCall::finish)
            .collect();
        events.push(StreamEvent::Done {
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
        });
        events
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(lines: &[&str]) -> Vec<StreamEvent> {
        let mut state = ChunkParserState::new();
        let mut events = Vec::new();
        for line in lines {
            events.extend(state.process_line(line));
        }
        events.extend(state.finish());
        events
    }

    #[test]
    fn content_deltas_become_text() {
        let events = feed(&[
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            "data: [DONE]",
        ]);
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello");
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
    }

    #[test]
    fn reasoning_content_becomes_reasoning() {
        let events = feed(&[
            r#"data: {"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#,
            "data: [DONE]",
        ]);
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::Reasoning { text } if text == "hmm")));
    }

    #[test]
    fn tool_call_fragments_accumulate_and_complete_on_finish() {
        let events = feed(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"q\":"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ]);

        let complete = events
            .iter()
            .find_map(|e| match e {
                StreamEvent::ToolCall { id, name, input } => Some((id, name, input)),
                _ => None,
            })
            .expect("completed tool call");
        assert_eq!(complete.0, "call_1");
        assert_eq!(complete.1, "search");
        assert_eq!(complete.2, &serde_json::json!({"q": "rust"}));

        // Deltas precede the completion.
        let first_complete = events
            .iter()
            .position(|e| matches!(e, StreamEvent::ToolCall { .. }))
            .unwrap();
        let last_delta = events
            .iter()
            .rposition(|e| matches!(e, StreamEvent::ToolCallDelta { .. }))
            .unwrap();
        assert!(last_delta < first_complete);

        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::Done { stop_reason: StopReason::ToolUse })));
    }

    #[test]
    fn parallel_tool_calls_keep_separate_buffers() {
        let events = feed(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"a","function":{"name":"first","arguments":"{}"}},{"index":1,"id":"b","function":{"name":"second","arguments":"{}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ]);
        let completed: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCall { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec!["first", "second"]);
    }

    #[test]
    fn usage_is_emitted_once_and_before_done() {
        let events = feed(&[
            r#"data: {"choices":[{"delta":{"content":"x"},"finish_reason":"stop"}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":5,"completion_tokens":1}}"#,
            "data: [DONE]",
        ]);
        let usage_positions: Vec<usize> = events
            .iter()
            .enumerate()
            .filter_map(|(i, e)| matches!(e, StreamEvent::Usage(_)).then_some(i))
            .collect();
        let done_pos = events
            .iter()
            .position(|e| matches!(e, StreamEvent::Done { .. }))
            .unwrap();
        assert_eq!(usage_positions.len(), 1);
        assert!(usage_positions[0] < done_pos);
    }

    #[test]
    fn done_without_finish_reason_defaults_to_end_turn() {
        let events = feed(&[r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#]);
        assert!(matches!(
            events.last(),
            Some(StreamEvent::Done { stop_reason: StopReason::EndTurn })
        ));
    }

    #[test]
    fn invalid_json_produces_error_event() {
        let events = feed(&["data: {broken", "data: [DONE]"]);
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::Error(err) if err.code == "parse_error")));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let events = feed(&[": keep-alive comment", "", "data: [DONE]"]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Done { .. }));
    }

    #[test]
    fn stream_cut_mid_tool_call_still_flushes_the_accumulator() {
        // No finish_reason and no [DONE]: finish() at end of stream emits
        // the partial call (empty-object input) and Done.
        let events = feed(&[
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"search","arguments":"{\"q\""}}]}}]}"#,
        ]);
        assert!(events
            .iter()
            .any(|e| matches!(e, StreamEvent::ToolCall { input, .. } if input == &serde_json::json!({}))));
        assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
    }
}
