//! Canonical ↔ Anthropic Messages API mapping.

use quill_types::{
    CompletionRequest, CompletionResult, ContentPart, ImageSource, Message, ProviderError, Role,
    StopReason, TokenUsage, ToolInvocation, ToolSpec, TransformConfig, TransformResult,
    TransformWarning, UNSUPPORTED_CONTENT_TYPE, WarningSeverity,
};

/// Most cache breakpoints one request may carry.
const MAX_CACHE_BREAKPOINTS: usize = 4;

/// Transform between the canonical model and the Anthropic Messages API.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicTransform;

impl AnthropicTransform {
    /// Concatenated text of all system messages, for the top-level
    /// `system` field. Anthropic does not accept system messages inline.
    #[must_use]
    pub fn system_text(messages: &[Message]) -> Option<String> {
        let texts: Vec<String> = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(Message::text)
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n\n"))
        }
    }
}

impl quill_types::ProviderTransform for AnthropicTransform {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn transform_messages(
        &self,
        messages: &[Message],
        _cfg: &TransformConfig,
    ) -> TransformResult<serde_json::Value> {
        let mut warnings = Vec::new();
        let arr: Vec<serde_json::Value> = messages
            .iter()
            .filter(|msg| msg.role != Role::System)
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                    Role::System => unreachable!("filtered above"),
                };
                let content: Vec<serde_json::Value> = msg
                    .content
                    .iter()
                    .filter_map(|part| map_content_part(part, &mut warnings))
                    .collect();
                serde_json::json!({ "role": role, "content": content })
            })
            .collect();
        TransformResult::with_warnings(serde_json::Value::Array(arr), warnings)
    }

    fn transform_tools(
        &self,
        tools: &[ToolSpec],
        _cfg: &TransformConfig,
    ) -> TransformResult<serde_json::Value> {
        let arr: Vec<serde_json::Value> = tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.input_schema,
                })
            })
            .collect();
        TransformResult::clean(serde_json::Value::Array(arr))
    }

    fn parse_response(
        &self,
        response: &serde_json::Value,
        _cfg: &TransformConfig,
    ) -> Result<TransformResult<CompletionResult>, ProviderError> {
        let content_arr = response["content"].as_array().ok_or_else(|| {
            ProviderError::InvalidRequest("missing 'content' array in response".into())
        })?;

        let mut warnings = Vec::new();
        let mut content = String::new();
        let mut thinking = String::new();
        let mut tool_calls = Vec::new();

        for block in content_arr {
            match block["type"].as_str().unwrap_or_default() {
                "text" => content.push_str(block["text"].as_str().unwrap_or_default()),
                "thinking" => thinking.push_str(block["thinking"].as_str().unwrap_or_default()),
                "redacted_thinking" => {}
                "tool_use" => {
                    let id = block["id"]
                        .as_str()
                        .ok_or_else(|| {
                            ProviderError::InvalidRequest("tool_use block missing 'id'".into())
                        })?
                        .to_string();
                    let name = block["name"]
                        .as_str()
                        .ok_or_else(|| {
                            ProviderError::InvalidRequest("tool_use block missing 'name'".into())
                        })?
                        .to_string();
                    tool_calls.push(ToolInvocation {
                        id,
                        name,
                        input: block["input"].clone(),
                        thought_signature: None,
                    });
                }
                other => warnings.push(
                    TransformWarning::new(
                        UNSUPPORTED_CONTENT_TYPE,
                        WarningSeverity::Warning,
                        format!("unknown content block type: {other}"),
                    )
                    .with_field("content"),
                ),
            }
        }

        let stop_reason = response["stop_reason"]
            .as_str()
            .map(parse_stop_reason)
            .unwrap_or(StopReason::EndTurn);

        Ok(TransformResult::with_warnings(
            CompletionResult {
                content,
                thinking: (!thinking.is_empty()).then_some(thinking),
                tool_calls,
                stop_reason,
                usage: parse_usage(&response["usage"]),
            },
            warnings,
        ))
    }

    /// Annotate the request body with ephemeral cache markers: the last
    /// system block, the last two substantive conversation blocks, then
    /// tool definitions, capped at four breakpoints total.
    fn apply_caching(
        &self,
        body: &mut serde_json::Value,
        cfg: &TransformConfig,
    ) -> Vec<TransformWarning> {
        if !cfg.enable_caching {
            return Vec::new();
        }
        let marker = serde_json::json!({ "type": "ephemeral" });
        let mut remaining = MAX_CACHE_BREAKPOINTS;

        // System prompt: a plain string becomes a single cached block.
        // get_mut throughout — IndexMut on a missing key would insert null.
        if remaining > 0
            && let Some(system) = body.get_mut("system")
        {
            if system.is_string() {
                let text = std::mem::take(system);
                *system = serde_json::json!([{
                    "type": "text",
                    "text": text,
                    "cache_control": marker.clone(),
                }]);
                remaining -= 1;
            } else if let Some(last) = system.as_array_mut().and_then(|blocks| blocks.last_mut()) {
                last["cache_control"] = marker.clone();
                remaining -= 1;
            }
        }

        // Last two user/assistant messages carrying substantive content.
        if let Some(messages) = body.get_mut("messages").and_then(|m| m.as_array_mut()) {
            let mut marked = 0;
            for msg in messages.iter_mut().rev() {
                if remaining == 0 || marked == 2 {
                    break;
                }
                let Some(blocks) = msg["content"].as_array_mut() else {
                    continue;
                };
                if !blocks.iter().any(is_substantive_block) {
                    continue;
                }
                if let Some(last) = blocks.last_mut() {
                    last["cache_control"] = marker.clone();
                    marked += 1;
                    remaining -= 1;
                }
            }
        }

        // Tool definitions, until the cap runs out.
        if let Some(tools) = body.get_mut("tools").and_then(|t| t.as_array_mut()) {
            for tool in tools.iter_mut() {
                if remaining == 0 {
                    break;
                }
                tool["cache_control"] = marker.clone();
                remaining -= 1;
            }
        }

        Vec::new()
    }
}

/// Whether a block is worth anchoring a cache breakpoint on.
fn is_substantive_block(block: &serde_json::Value) -> bool {
    match block["type"].as_str().unwrap_or_default() {
        "text" => !block["text"].as_str().unwrap_or_default().trim().is_empty(),
        "tool_use" | "tool_result" | "image" => true,
        _ => false,
    }
}

fn map_content_part(
    part: &ContentPart,
    warnings: &mut Vec<TransformWarning>,
) -> Option<serde_json::Value> {
    match part {
        ContentPart::Text { text } => Some(serde_json::json!({ "type": "text", "text": text })),
        ContentPart::Image {
            source, media_type, ..
        } => map_image(source, media_type, warnings),
        ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        })),
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": [{ "type": "text", "text": content.as_text() }],
            "is_error": is_error,
        })),
    }
}

fn map_image(
    source: &ImageSource,
    media_type: &str,
    warnings: &mut Vec<TransformWarning>,
) -> Option<serde_json::Value> {
    match source {
        ImageSource::Base64 { data } => Some(serde_json::json!({
            "type": "image",
            "source": { "type": "base64", "media_type": media_type, "data": data },
        })),
        ImageSource::Url { url } => Some(serde_json::json!({
            "type": "image",
            "source": { "type": "url", "url": url },
        })),
        ImageSource::DataUrl { url } => match source.data_url_parts() {
            Some((embedded_type, payload)) => Some(serde_json::json!({
                "type": "image",
                "source": { "type": "base64", "media_type": embedded_type, "data": payload },
            })),
            None => {
                warnings.push(
                    TransformWarning::new(
                        UNSUPPORTED_CONTENT_TYPE,
                        WarningSeverity::Error,
                        "unparseable data URL dropped",
                    )
                    .with_field("source")
                    .with_values(serde_json::json!(url), serde_json::Value::Null),
                );
                None
            }
        },
    }
}

fn parse_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" => StopReason::EndTurn,
        "max_tokens" => StopReason::MaxTokens,
        "stop_sequence" => StopReason::StopSequence,
        "tool_use" => StopReason::ToolUse,
        "refusal" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

pub(crate) fn parse_usage(usage: &serde_json::Value) -> TokenUsage {
    TokenUsage {
        input_tokens: usage["input_tokens"].as_u64().unwrap_or(0),
        output_tokens: usage["output_tokens"].as_u64().unwrap_or(0),
        cache_read_tokens: usage["cache_read_input_tokens"].as_u64(),
        cache_creation_tokens: usage["cache_creation_input_tokens"].as_u64(),
        reasoning_tokens: None,
    }
}

/// Assemble the full Messages API request body.
///
/// The returned value does **not** include `"stream"` — callers add that
/// key. Warnings from every transform pass are collected together.
pub(crate) fn to_api_request(
    req: &CompletionRequest,
    default_model: &str,
) -> (serde_json::Value, Vec<TransformWarning>) {
    let transform = AnthropicTransform;
    let cfg = TransformConfig {
        model_id: if req.model.is_empty() {
            default_model.to_string()
        } else {
            req.model.clone()
        },
        enable_caching: req.enable_caching,
    };

    let mut warnings = Vec::new();
    let messages = {
        let result =
            quill_types::ProviderTransform::transform_messages(&transform, &req.messages, &cfg);
        warnings.extend(result.warnings);
        result.data
    };

    let mut body = serde_json::json!({
        "model": cfg.model_id,
        "messages": messages,
        "max_tokens": req.max_tokens.unwrap_or(4096),
    });

    if let Some(system) = AnthropicTransform::system_text(&req.messages) {
        body["system"] = serde_json::Value::String(system);
    }
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::Value::from(temp);
    }
    if let Some(top_p) = req.top_p {
        body["top_p"] = serde_json::Value::from(top_p);
    }
    if !req.stop_sequences.is_empty() {
        body["stop_sequences"] = serde_json::json!(req.stop_sequences);
    }
    if !req.tools.is_empty() {
        let result = quill_types::ProviderTransform::transform_tools(&transform, &req.tools, &cfg);
        warnings.extend(result.warnings);
        body["tools"] = result.data;
    }

    warnings.extend(quill_types::ProviderTransform::apply_caching(
        &transform, &mut body, &cfg,
    ));

    // Extra provider-specific fields merge last and may override anything.
    if let Some(serde_json::Value::Object(extra)) = &req.extra
        && let serde_json::Value::Object(body_map) = &mut body
    {
        for (k, v) in extra {
            body_map.insert(k.clone(), v.clone());
        }
    }

    (body, warnings)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::ProviderTransform as _;
    use serde_json::json;

    fn cfg() -> TransformConfig {
        TransformConfig::for_model("claude-sonnet-4-5")
    }

    fn request_with(messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            messages,
            ..Default::default()
        }
    }

    #[test]
    fn system_messages_are_extracted_not_inlined() {
        let messages = vec![Message::system("You are helpful"), Message::user("hi")];
        let result = AnthropicTransform.transform_messages(&messages, &cfg());
        let arr = result.data.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["role"], "user");
        assert_eq!(
            AnthropicTransform::system_text(&messages).as_deref(),
            Some("You are helpful")
        );
    }

    #[test]
    fn tool_round_trip_parts_map() {
        let messages = vec![
            Message::new(
                Role::Assistant,
                vec![ContentPart::ToolUse {
                    id: "tu_1".into(),
                    name: "read_file".into(),
                    input: json!({"path": "foo.txt"}),
                }],
            ),
            Message::new(
                Role::User,
                vec![ContentPart::ToolResult {
                    tool_use_id: "tu_1".into(),
                    content: "contents".into(),
                    is_error: false,
                }],
            ),
        ];
        let result = AnthropicTransform.transform_messages(&messages, &cfg());
        let arr = result.data.as_array().unwrap();
        assert_eq!(arr[0]["content"][0]["type"], "tool_use");
        assert_eq!(arr[0]["content"][0]["id"], "tu_1");
        assert_eq!(arr[1]["content"][0]["type"], "tool_result");
        assert_eq!(arr[1]["content"][0]["tool_use_id"], "tu_1");
        assert_eq!(arr[1]["content"][0]["content"][0]["text"], "contents");
    }

    #[test]
    fn data_url_image_becomes_base64() {
        let messages = vec![Message::new(
            Role::User,
            vec![ContentPart::Image {
                source: ImageSource::DataUrl {
                    url: "data:image/webp;base64,UklGRg==".into(),
                },
                media_type: "image/webp".into(),
                width: None,
                height: None,
            }],
        )];
        let result = AnthropicTransform.transform_messages(&messages, &cfg());
        let source = &result.data[0]["content"][0]["source"];
        assert_eq!(source["type"], "base64");
        assert_eq!(source["media_type"], "image/webp");
        assert_eq!(source["data"], "UklGRg==");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn bad_data_url_is_dropped_with_warning() {
        let messages = vec![Message::new(
            Role::User,
            vec![ContentPart::Image {
                source: ImageSource::DataUrl {
                    url: "data:image/png,not-base64".into(),
                },
                media_type: "image/png".into(),
                width: None,
                height: None,
            }],
        )];
        let result = AnthropicTransform.transform_messages(&messages, &cfg());
        assert!(result.data[0]["content"].as_array().unwrap().is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, UNSUPPORTED_CONTENT_TYPE);
    }

    #[test]
    fn url_image_stays_a_url() {
        let messages = vec![Message::new(
            Role::User,
            vec![ContentPart::Image {
                source: ImageSource::Url {
                    url: "https://example.com/a.png".into(),
                },
                media_type: "image/png".into(),
                width: None,
                height: None,
            }],
        )];
        let result = AnthropicTransform.transform_messages(&messages, &cfg());
        assert_eq!(result.data[0]["content"][0]["source"]["type"], "url");
    }

    #[test]
    fn parse_response_text_and_usage() {
        let body = json!({
            "id": "msg_01",
            "model": "claude-sonnet-4-5",
            "content": [{ "type": "text", "text": "Hello!" }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 10, "output_tokens": 5 }
        });
        let result = AnthropicTransform.parse_response(&body, &cfg()).unwrap();
        assert_eq!(result.data.content, "Hello!");
        assert_eq!(result.data.stop_reason, StopReason::EndTurn);
        assert_eq!(result.data.usage.input_tokens, 10);
        assert!(result.data.tool_calls.is_empty());
    }

    #[test]
    fn parse_response_tool_use_and_thinking() {
        let body = json!({
            "content": [
                { "type": "thinking", "thinking": "let me look", "signature": "s" },
                { "type": "tool_use", "id": "tu_1", "name": "read_file", "input": {"path": "x"} }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 20, "output_tokens": 15 }
        });
        let result = AnthropicTransform.parse_response(&body, &cfg()).unwrap();
        assert_eq!(result.data.stop_reason, StopReason::ToolUse);
        assert_eq!(result.data.thinking.as_deref(), Some("let me look"));
        assert_eq!(result.data.tool_calls.len(), 1);
        assert_eq!(result.data.tool_calls[0].name, "read_file");
    }

    #[test]
    fn parse_response_unknown_block_warns_instead_of_dropping_silently() {
        let body = json!({
            "content": [
                { "type": "text", "text": "ok" },
                { "type": "server_tool_use", "id": "x" }
            ],
            "stop_reason": "end_turn",
            "usage": {}
        });
        let result = AnthropicTransform.parse_response(&body, &cfg()).unwrap();
        assert_eq!(result.data.content, "ok");
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, UNSUPPORTED_CONTENT_TYPE);
    }

    #[test]
    fn parse_response_missing_content_is_an_error() {
        let body = json!({ "stop_reason": "end_turn" });
        assert!(AnthropicTransform.parse_response(&body, &cfg()).is_err());
    }

    #[test]
    fn refusal_maps_to_content_filter() {
        assert_eq!(parse_stop_reason("refusal"), StopReason::ContentFilter);
        assert_eq!(parse_stop_reason("future_reason"), StopReason::EndTurn);
    }

    #[test]
    fn request_defaults_max_tokens() {
        let (body, _) = to_api_request(&request_with(vec![Message::user("hi")]), "claude-test");
        assert_eq!(body["model"], "claude-test");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn caching_disabled_leaves_body_untouched() {
        let mut req = request_with(vec![Message::user("hi")]);
        req.tools = vec![ToolSpec {
            name: "t".into(),
            description: "d".into(),
            input_schema: json!({"type": "object"}),
        }];
        let (body, _) = to_api_request(&req, "m");
        assert!(body["tools"][0].get("cache_control").is_none());
    }

    fn count_breakpoints(value: &serde_json::Value) -> usize {
        match value {
            serde_json::Value::Object(obj) => {
                let own = usize::from(obj.contains_key("cache_control"));
                own + obj.values().map(count_breakpoints).sum::<usize>()
            }
            serde_json::Value::Array(items) => items.iter().map(count_breakpoints).sum(),
            _ => 0,
        }
    }

    #[test]
    fn caching_marks_system_conversation_and_tools() {
        let mut req = request_with(vec![
            Message::system("You are helpful"),
            Message::user("first question"),
            Message::assistant("first answer"),
            Message::user("second question"),
        ]);
        req.enable_caching = true;
        req.tools = vec![ToolSpec {
            name: "read_file".into(),
            description: "reads".into(),
            input_schema: json!({"type": "object"}),
        }];
        let (body, _) = to_api_request(&req, "m");

        // System string was converted into a cached block.
        assert_eq!(body["system"][0]["cache_control"]["type"], "ephemeral");
        // The last two substantive conversation messages are marked.
        let messages = body["messages"].as_array().unwrap();
        assert!(messages[2]["content"][0].get("cache_control").is_some());
        assert!(messages[1]["content"][0].get("cache_control").is_some());
        assert!(messages[0]["content"][0].get("cache_control").is_none());
        // One breakpoint is left for the tool definition.
        assert!(body["tools"][0].get("cache_control").is_some());
        assert_eq!(count_breakpoints(&body), 4);
    }

    #[test]
    fn caching_never_exceeds_four_breakpoints() {
        let mut req = request_with(vec![
            Message::system("sys"),
            Message::user("q1"),
            Message::assistant("a1"),
            Message::user("q2"),
            Message::assistant("a2"),
            Message::user("q3"),
        ]);
        req.enable_caching = true;
        req.tools = (0..5)
            .map(|i| ToolSpec {
                name: format!("tool_{i}"),
                description: "d".into(),
                input_schema: json!({"type": "object"}),
            })
            .collect();
        let (body, _) = to_api_request(&req, "m");
        assert_eq!(count_breakpoints(&body), 4);
    }

    #[test]
    fn extra_fields_merge_and_override() {
        let mut req = request_with(vec![Message::user("hi")]);
        req.extra = Some(json!({"max_tokens": 8192, "metadata": {"user_id": "u1"}}));
        let (body, _) = to_api_request(&req, "m");
        assert_eq!(body["max_tokens"], 8192);
        assert_eq!(body["metadata"]["user_id"], "u1");
    }
}
