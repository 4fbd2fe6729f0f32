//! Canonical ↔ OpenAI Chat Completions mapping.
//!
//! OpenAI's format differs from the canonical model in two ways that drive
//! this module: assistant tool uses become `tool_calls` on the message with
//! JSON-string arguments, and tool results become separate `role: "tool"`
//! messages correlated by `tool_call_id`.

use std::collections::HashMap;

use quill_types::{
    CompletionRequest, CompletionResult, ContentPart, ImageSource, Message, ProviderError, Role,
    SchemaTarget, StopReason, TokenUsage, ToolInvocation, ToolSpec, TransformConfig,
    TransformResult, TransformWarning, UNSUPPORTED_CONTENT_TYPE, WarningSeverity, sanitize_schema,
};

/// Transform between the canonical model and Chat Completions.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiTransform;

impl quill_types::ProviderTransform for OpenAiTransform {
    fn provider_id(&self) -> &str {
        "openai"
    }

    fn transform_messages(
        &self,
        messages: &[Message],
        _cfg: &TransformConfig,
    ) -> TransformResult<serde_json::Value> {
        let mut warnings = Vec::new();

        // Forward pass: tool_use_id → tool name, so tool-role messages can
        // carry the function name for vendors that want it.
        let mut names: HashMap<&str, &str> = HashMap::new();
        for msg in messages {
            for part in &msg.content {
                if let ContentPart::ToolUse { id, name, .. } = part {
                    names.insert(id.as_str(), name.as_str());
                }
            }
        }

        let mut out = Vec::new();
        for msg in messages {
            match msg.role {
                Role::System => out.push(serde_json::json!({
                    "role": "system",
                    "content": msg.text(),
                })),
                Role::Assistant => out.push(map_assistant_message(msg)),
                Role::User => map_user_message(msg, &names, &mut out, &mut warnings),
            }
        }
        TransformResult::with_warnings(serde_json::Value::Array(out), warnings)
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
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": sanitize_schema(&tool.input_schema, SchemaTarget::Standard),
                    },
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
        let choice = response["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .ok_or_else(|| {
                ProviderError::InvalidRequest("missing 'choices' array in response".into())
            })?;

        let message = &choice["message"];
        let content = message["content"].as_str().unwrap_or_default().to_string();
        // DeepSeek-style reasoning rides in reasoning_content.
        let thinking = message["reasoning_content"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                let arguments = call["function"]["arguments"].as_str().unwrap_or("{}");
                let input: serde_json::Value = serde_json::from_str(arguments)
                    .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
                tool_calls.push(ToolInvocation {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    name: call["function"]["name"].as_str().unwrap_or_default().to_string(),
                    input,
                    thought_signature: None,
                });
            }
        }

        let stop_reason = choice["finish_reason"]
            .as_str()
            .map(parse_finish_reason)
            .unwrap_or(StopReason::EndTurn);

        Ok(TransformResult::clean(CompletionResult {
            content,
            thinking,
            tool_calls,
            stop_reason,
            usage: parse_usage(&response["usage"]),
        }))
    }
}

fn map_assistant_message(msg: &Message) -> serde_json::Value {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in &msg.content {
        match part {
            ContentPart::Text { text: t } => text.push_str(t),
            ContentPart::ToolUse { id, name, input } => {
                tool_calls.push(serde_json::json!({
                    "id": id,
                    "type": "function",
                    "function": {
                        "name": name,
                        "arguments": input.to_string(),
                    },
                }));
            }
            // Images and tool results do not occur on assistant messages.
            _ => {}
        }
    }

    let mut obj = serde_json::json!({ "role": "assistant" });
    obj["content"] = if text.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::String(text)
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = serde_json::Value::Array(tool_calls);
    }
    obj
}

fn map_user_message(
    msg: &Message,
    names: &HashMap<&str, &str>,
    out: &mut Vec<serde_json::Value>,
    warnings: &mut Vec<TransformWarning>,
) {
    let mut content_parts = Vec::new();
    let mut tool_results = Vec::new();

    for part in &msg.content {
        match part {
            ContentPart::Text { text } => {
                content_parts.push(serde_json::json!({ "type": "text", "text": text }));
            }
            ContentPart::Image {
                source, media_type, ..
            } => match map_image(source, media_type) {
                Some(value) => content_parts.push(value),
                None => warnings.push(
                    TransformWarning::new(
                        UNSUPPORTED_CONTENT_TYPE,
                        WarningSeverity::Error,
                        "unparseable data URL dropped",
                    )
                    .with_field("source"),
                ),
            },
            ContentPart::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut obj = serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": if *is_error {
                        format!("Error: {}", content.as_text())
                    } else {
                        content.as_text()
                    },
                });
                if let Some(name) = names.get(tool_use_id.as_str()) {
                    obj["name"] = serde_json::Value::String((*name).to_string());
                }
                tool_results.push(obj);
            }
            ContentPart::ToolUse { .. } => warnings.push(
                TransformWarning::new(
                    UNSUPPORTED_CONTENT_TYPE,
                    WarningSeverity::Warning,
                    "tool_use on a user message has no OpenAI representation",
                )
                .with_field("content"),
            ),
        }
    }

    if !content_parts.is_empty() {
        // A single text block collapses to plain string content.
        let content = if content_parts.len() == 1 && content_parts[0]["type"] == "text" {
            content_parts[0]["text"].clone()
        } else {
            serde_json::Value::Array(content_parts)
        };
        out.push(serde_json::json!({ "role": "user", "content": content }));
    }
    out.extend(tool_results);
}

fn map_image(source: &ImageSource, media_type: &str) -> Option<serde_json::Value> {
    let url = match source {
        ImageSource::Url { url } => url.clone(),
        ImageSource::Base64 { data } => format!("data:{media_type};base64,{data}"),
        ImageSource::DataUrl { url } => {
            source.data_url_parts()?;
            url.clone()
        }
    };
    Some(serde_json::json!({
        "type": "image_url",
        "image_url": { "url": url },
    }))
}

fn parse_finish_reason(reason: &str) -> StopReason {
    match reason {
        "stop" => StopReason::EndTurn,
        "length" => StopReason::MaxTokens,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    }
}

pub(crate) fn parse_usage(usage: &serde_json::Value) -> TokenUsage {
    TokenUsage {
        input_tokens: usage["prompt_tokens"].as_u64().unwrap_or(0),
        output_tokens: usage["completion_tokens"].as_u64().unwrap_or(0),
        cache_read_tokens: usage["prompt_tokens_details"]["cached_tokens"].as_u64(),
        cache_creation_tokens: None,
        reasoning_tokens: usage["completion_tokens_details"]["reasoning_tokens"].as_u64(),
    }
}

/// Assemble the full Chat Completions request body.
///
/// The returned value does **not** include `"stream"` — callers add that key.
pub(crate) fn to_api_request(
    req: &CompletionRequest,
    default_model: &str,
) -> (serde_json::Value, Vec<TransformWarning>) {
    let transform = OpenAiTransform;
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
    });
    if let Some(max_tokens) = req.max_tokens {
        body["max_completion_tokens"] = serde_json::Value::from(max_tokens);
    }
    if let Some(temp) = req.temperature {
        body["temperature"] = serde_json::Value::from(temp);
    }
    if let Some(top_p) = req.top_p {
        body["top_p"] = serde_json::Value::from(top_p);
    }
    if !req.stop_sequences.is_empty() {
        body["stop"] = serde_json::json!(req.stop_sequences);
    }
    if !req.tools.is_empty() {
        let result = quill_types::ProviderTransform::transform_tools(&transform, &req.tools, &cfg);
        warnings.extend(result.warnings);
        body["tools"] = result.data;
    }
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
