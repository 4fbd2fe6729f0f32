//! Canonical ↔ Gemini generateContent mapping.
//!
//! Gemini differs from the other vendors in every way that matters here:
//! roles are `user`/`model`, system prompts move to a top-level
//! `systemInstruction`, tool results are correlated by function *name*
//! rather than call id, schemas use an uppercase root type, and thinking
//! models require a thought signature on every function call.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use quill_types::{
    CompletionRequest, CompletionResult, ContentPart, ImageSource, MISSING_THOUGHT_SIGNATURE,
    MISSING_TOOL_NAME, Message, ProviderError, Role, SchemaTarget, StopReason, TokenUsage,
    ToolInvocation, ToolSpec, TransformConfig, TransformResult, TransformWarning,
    UNSUPPORTED_CONTENT_TYPE, WarningSeverity, sanitize_schema,
};

/// Sentinel accepted by Gemini's validator when the real thought signature
/// for a tool call is not available.
pub const SKIP_THOUGHT_SIGNATURE: &str = "skip_thought_signature_validator";

static THINKING_MODEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(models/)?gemini-(2\.[5-9]|[3-9])").expect("thinking-model pattern compiles")
});

/// Whether a model id belongs to the thinking-capable Gemini family
/// (Gemini 2.5 and later).
#[must_use]
pub fn is_thinking_model(model_id: &str) -> bool {
    THINKING_MODEL.is_match(model_id)
}

/// Transform between the canonical model and Gemini generateContent.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiTransform;

impl quill_types::ProviderTransform for GeminiTransform {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    /// Returns an object with `contents` and, when system messages were
    /// present, a `systemInstruction` — Gemini takes system prompts as a
    /// separate top-level field.
    fn transform_messages(
        &self,
        messages: &[Message],
        cfg: &TransformConfig,
    ) -> TransformResult<serde_json::Value> {
        let mut warnings = Vec::new();
        let thinking = is_thinking_model(&cfg.model_id);

        // Forward pass: tool_use_id → name. Gemini correlates function
        // responses by name, so every result needs one.
        let mut names: HashMap<&str, &str> = HashMap::new();
        for msg in messages {
            for part in &msg.content {
                if let ContentPart::ToolUse { id, name, .. } = part {
                    names.insert(id.as_str(), name.as_str());
                }
            }
        }

        let mut system_parts: Vec<serde_json::Value> = Vec::new();
        let mut contents: Vec<serde_json::Value> = Vec::new();

        for msg in messages {
            if msg.role == Role::System {
                let text = msg.text();
                if !text.is_empty() {
                    system_parts.push(serde_json::json!({ "text": text }));
                }
                continue;
            }

            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System => unreachable!("handled above"),
            };
            let parts: Vec<serde_json::Value> = msg
                .content
                .iter()
                .filter_map(|part| map_part(part, &names, thinking, &mut warnings))
                .collect();
            contents.push(serde_json::json!({ "role": role, "parts": parts }));
        }

        let mut data = serde_json::json!({ "contents": contents });
        if !system_parts.is_empty() {
            data["systemInstruction"] = serde_json::json!({ "parts": system_parts });
        }
        TransformResult::with_warnings(data, warnings)
    }

    fn transform_tools(
        &self,
        tools: &[ToolSpec],
        _cfg: &TransformConfig,
    ) -> TransformResult<serde_json::Value> {
        let declarations: Vec<serde_json::Value> = tools
            .iter()
            .map(|tool| {
                let mut parameters = sanitize_schema(&tool.input_schema, SchemaTarget::Gemini);
                if parameters.get("type").is_some() {
                    parameters["type"] = serde_json::Value::String("OBJECT".into());
                }
                serde_json::json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": parameters,
                })
            })
            .collect();
        TransformResult::clean(serde_json::json!([
            { "functionDeclarations": declarations }
        ]))
    }

    fn parse_response(
        &self,
        response: &serde_json::Value,
        _cfg: &TransformConfig,
    ) -> Result<TransformResult<CompletionResult>, ProviderError> {
        let candidate = response["candidates"]
            .as_array()
            .and_then(|arr| arr.first())
            .ok_or_else(|| {
                ProviderError::InvalidRequest("missing 'candidates' array in response".into())
            })?;

        let mut warnings = Vec::new();
        let mut content = String::new();
        let mut thinking = String::new();
        let mut tool_calls = Vec::new();

        for (index, part) in candidate["content"]["parts"]
            .as_array()
            .into_iter()
            .flatten()
            .enumerate()
        {
            if let Some(text) = part["text"].as_str() {
                if part["thought"].as_bool().unwrap_or(false) {
                    thinking.push_str(text);
                } else {
                    content.push_str(text);
                }
            } else if part["functionCall"].is_object() {
                let call = &part["functionCall"];
                let name = call["name"].as_str().unwrap_or_default().to_string();
                tool_calls.push(ToolInvocation {
                    id: format!("{name}-{index}"),
                    name,
                    input: call["args"].clone(),
                    thought_signature: part["thoughtSignature"].as_str().map(str::to_string),
                });
            } else if !part.as_object().is_some_and(serde_json::Map::is_empty) {
                warnings.push(
                    TransformWarning::new(
                        UNSUPPORTED_CONTENT_TYPE,
                        WarningSeverity::Warning,
                        "unrecognized response part",
                    )
                    .with_field("parts"),
                );
            }
        }

        let stop_reason = candidate["finishReason"]
            .as_str()
            .map(parse_finish_reason)
            .unwrap_or(StopReason::EndTurn);

        Ok(TransformResult::with_warnings(
            CompletionResult {
                content,
                thinking: (!thinking.is_empty()).then_some(thinking),
                tool_calls,
                stop_reason,
                usage: parse_usage(&response["usageMetadata"]),
            },
            warnings,
        ))
    }
}

fn map_part(
    part: &ContentPart,
    names: &HashMap<&str, &str>,
    thinking_model: bool,
    warnings: &mut Vec<TransformWarning>,
) -> Option<serde_json::Value> {
    match part {
        ContentPart::Text { text } => Some(serde_json::json!({ "text": text })),
        ContentPart::Image {
            source, media_type, ..
        } => map_image(source, media_type, warnings),
        ContentPart::ToolUse { name, input, .. } => {
            let mut value = serde_json::json!({
                "functionCall": { "name": name, "args": input },
            });
            if thinking_model {
                // The canonical history carries no reasoning segments, so
                // the validator sentinel stands in for the real signature.
                value["thoughtSignature"] =
                    serde_json::Value::String(SKIP_THOUGHT_SIGNATURE.into());
                warnings.push(
                    TransformWarning::new(
                        MISSING_THOUGHT_SIGNATURE,
                        WarningSeverity::Info,
                        format!("no thought signature for tool call '{name}', using sentinel"),
                    )
                    .with_field("thoughtSignature"),
                );
            }
            Some(value)
        }
        ContentPart::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let name = match names.get(tool_use_id.as_str()) {
                Some(name) => (*name).to_string(),
                None => {
                    let fallback = sanitize_function_name(tool_use_id);
                    warnings.push(
                        TransformWarning::new(
                            MISSING_TOOL_NAME,
                            WarningSeverity::Warning,
                            format!("no tool name for result '{tool_use_id}', using sanitized id"),
                        )
                        .with_field("tool_use_id")
                        .with_values(
                            serde_json::json!(tool_use_id),
                            serde_json::json!(fallback),
                        ),
                    );
                    fallback
                }
            };
            let response = match content {
                quill_types::ToolResultContent::Json(value) if value.is_object() => value.clone(),
                other => serde_json::json!({ "result": other.as_text() }),
            };
            let response = if *is_error {
                serde_json::json!({ "error": response })
            } else {
                response
            };
            Some(serde_json::json!({
                "functionResponse": { "name": name, "response": response },
            }))
        }
    }
}

fn map_image(
    source: &ImageSource,
    media_type: &str,
    warnings: &mut Vec<TransformWarning>,
) -> Option<serde_json::Value> {
    match source {
        ImageSource::Base64 { data } => Some(serde_json::json!({
            "inlineData": { "mimeType": media_type, "data": data },
        })),
        ImageSource::Url { url } => Some(serde_json::json!({
            "fileData": { "mimeType": media_type, "fileUri": url },
        })),
        ImageSource::DataUrl { .. } => match source.data_url_parts() {
            Some((embedded_type, payload)) => Some(serde_json::json!({
                "inlineData": { "mimeType": embedded_type, "data": payload },
            })),
            None => {
                warnings.push(
                    TransformWarning::new(
                        UNSUPPORTED_CONTENT_TYPE,
                        WarningSeverity::Error,
                        "unparseable data URL dropped",
                    )
                    .with_field("source"),
                );
                None
            }
        },
    }
}

/// Restrict an id to the characters Gemini accepts in function names.
fn sanitize_function_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            c
        } else {
            '_'
        })
        .collect()
}

pub(crate) fn parse_finish_reason(reason: &str) -> StopReason {
    match reason {
        "STOP" => StopReason::EndTurn,
        "MAX_TOKENS" => StopReason::MaxTokens,
        "SAFETY" | "RECITATION" => StopReason::ContentFilter,
        "TOOL_CODE" => StopReason::ToolUse,
        "MALFORMED_FUNCTION_CALL" => StopReason::Error,
        _ => StopReason::EndTurn,
    }
}

pub(crate) fn parse_usage(usage: &serde_json::Value) -> TokenUsage {
    TokenUsage {
        input_tokens: usage["promptTokenCount"].as_u64().unwrap_or(0),
        output_tokens: usage["candidatesTokenCount"].as_u64().unwrap_or(0),
        cache_read_tokens: usage["cachedContentTokenCount"].as_u64(),
        cache_creation_tokens: None,
        reasoning_tokens: usage["thoughtsTokenCount"].as_u64(),
    }
}

/// Assemble the full generateContent request body.
pub(crate) fn to_api_request(
    req: &CompletionRequest,
    default_model: &str,
) -> (serde_json::Value, Vec<TransformWarning>) {
    let transform = GeminiTransform;
    let cfg = TransformConfig {
        model_id: if req.model.is_empty() {
            default_model.to_string()
        } else {
            req.model.clone()
        },
        enable_caching: req.enable_caching,
    };

    let mut warnings = Vec::new();
    let mut body = {
        let result =
            quill_types::ProviderTransform::transform_messages(&transform, &req.messages, &cfg);
        warnings.extend(result.warnings);
        result.data
    };

    let mut generation_config = serde_json::Map::new();
    if let Some(max_tokens) = req.max_tokens {
        generation_config.insert("maxOutputTokens".into(), max_tokens.into());
    }
    if let Some(temp) = req.temperature {
        generation_config.insert("temperature".into(), temp.into());
    }
    if let Some(top_p) = req.top_p {
        generation_config.insert("topP".into(), top_p.into());
    }
    if !req.stop_sequences.is_empty() {
        generation_config.insert("stopSequences".into(), serde_json::json!(req.stop_sequences));
    }
    if !generation_config.is_empty() {
        body["generationConfig"] = serde_json::Value::Object(generation_config);
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

#[cfg(test)]
mod tests {
    use super::*;
    use quill_types::ProviderTransform as _;
    use serde_json::json;

    fn cfg() -> TransformConfig {
        TransformConfig::for_model("gemini-2.5-flash")
    }

    #[test]
    fn thinking_family_detection() {
        assert!(is_thinking_model("gemini-2.5-flash"));
        assert!(is_thinking_model("gemini-2.5-pro"));
        assert!(is_thinking_model("models/gemini-3-pro"));
        assert!(!is_thinking_model("gemini-2.0-flash"));
        assert!(!is_thinking_model("gemini-1.5-pro"));
        assert!(!is_thinking_model("gpt-4o"));
    }

    #[test]
    fn system_is_extracted_and_roles_map_to_user_model() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("read foo.txt"),
            Message::assistant("sure"),
        ];
        let result = GeminiTransform.transform_messages(&messages, &cfg());
        assert_eq!(
            result.data["systemInstruction"]["parts"][0]["text"],
            "You are helpful"
        );
        let contents = result.data["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
    }

    #[test]
    fn tool_results_are_correlated_by_name() {
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
        let result = GeminiTransform.transform_messages(&messages, &cfg());
        let response = &result.data["contents"][1]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "read_file");
        assert_eq!(response["response"]["result"], "contents");
    }

    #[test]
    fn orphaned_tool_result_degrades_to_sanitized_id_with_warning() {
        let messages = vec![Message::new(
            Role::User,
            vec![ContentPart::ToolResult {
                tool_use_id: "call.1!x".into(),
                content: "late".into(),
                is_error: false,
            }],
        )];
        let result = GeminiTransform.transform_messages(&messages, &cfg());
        let response = &result.data["contents"][0]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "call_1_x");
        assert!(result
            .warnings
            .iter()
            .any(|w| w.code == MISSING_TOOL_NAME));
    }

    #[test]
    fn thinking_model_tool_calls_get_the_sentinel() {
        let messages = vec![Message::new(
            Role::Assistant,
            vec![ContentPart::ToolUse {
                id: "tu_1".into(),
                name: "search".into(),
                input: json!({}),
            }],
        )];
        let result = GeminiTransform.transform_messages(&messages, &cfg());
        let part = &result.data["contents"][0]["parts"][0];
        assert_eq!(part["thoughtSignature"], SKIP_THOUGHT_SIGNATURE);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.code == MISSING_THOUGHT_SIGNATURE));
    }

    #[test]
    fn non_thinking_model_tool_calls_skip_the_signature() {
        let messages = vec![Message::new(
            Role::Assistant,
            vec![ContentPart::ToolUse {
                id: "tu_1".into(),
                name: "search".into(),
                input: json!({}),
            }],
        )];
        let result = GeminiTransform
            .transform_messages(&messages, &TransformConfig::for_model("gemini-2.0-flash"));
        let part = &result.data["contents"][0]["parts"][0];
        assert!(part.get("thoughtSignature").is_none());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn error_tool_results_wrap_the_payload() {
        let messages = vec![
            Message::new(
                Role::Assistant,
                vec![ContentPart::ToolUse {
                    id: "tu_1".into(),
                    name: "shell".into(),
                    input: json!({}),
                }],
            ),
            Message::new(
                Role::User,
                vec![ContentPart::ToolResult {
                    tool_use_id: "tu_1".into(),
                    content: "permission denied".into(),
                    is_error: true,
                }],
            ),
        ];
        let result = GeminiTransform.transform_messages(&messages, &cfg());
        let response = &result.data["contents"][1]["parts"][0]["functionResponse"]["response"];
        assert_eq!(response["error"]["result"], "permission denied");
    }

    #[test]
    fn images_map_to_inline_and_file_data() {
        let messages = vec![Message::new(
            Role::User,
            vec![
                ContentPart::Image {
                    source: ImageSource::Base64 {
                        data: "iVBORw0KGgo=".into(),
                    },
                    media_type: "image/png".into(),
                    width: None,
                    height: None,
                },
                ContentPart::Image {
                    source: ImageSource::Url {
                        url: "https://example.com/b.jpg".into(),
                    },
                    media_type: "image/jpeg".into(),
                    width: None,
                    height: None,
                },
            ],
        )];
        let result = GeminiTransform.transform_messages(&messages, &cfg());
        let parts = result.data["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["fileData"]["fileUri"], "https://example.com/b.jpg");
    }

    #[test]
    fn tool_schema_gets_uppercase_object_root_and_folded_bounds() {
        let tools = vec![ToolSpec {
            name: "read_file".into(),
            description: "reads a file".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "exclusiveMinimum": 0}
                },
                "required": ["path"]
            }),
        }];
        let result = GeminiTransform.transform_tools(&tools, &cfg());
        let declaration = &result.data[0]["functionDeclarations"][0];
        assert_eq!(declaration["name"], "read_file");
        let params = &declaration["parameters"];
        assert_eq!(params["type"], "OBJECT");
        assert!(params["properties"]["path"].get("exclusiveMinimum").is_none());
        assert_eq!(params["properties"]["path"]["minimum"], 0);
        assert_eq!(params["required"][0], "path");
    }

    #[test]
    fn parse_tool_call_response_with_thought_signature() {
        // The S1 shape: a thinking model requesting a file read.
        let body = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": { "name": "read_file", "args": { "path": "foo.txt" } },
                        "thoughtSignature": "X"
                    }]
                },
                "finishReason": "TOOL_CODE"
            }]
        });
        let result = GeminiTransform.parse_response(&body, &cfg()).unwrap();
        assert_eq!(result.data.content, "");
        assert_eq!(result.data.stop_reason, StopReason::ToolUse);
        assert_eq!(result.data.tool_calls.len(), 1);
        let call = &result.data.tool_calls[0];
        assert_eq!(call.name, "read_file");
        assert_eq!(call.input, json!({"path": "foo.txt"}));
        assert_eq!(call.thought_signature.as_deref(), Some("X"));
    }

    #[test]
    fn parse_separates_thought_text_from_content() {
        let body = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "considering...", "thought": true },
                        { "text": "The answer is 4." }
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 8,
                "thoughtsTokenCount": 30
            }
        });
        let result = GeminiTransform.parse_response(&body, &cfg()).unwrap();
        assert_eq!(result.data.content, "The answer is 4.");
        assert_eq!(result.data.thinking.as_deref(), Some("considering..."));
        assert_eq!(result.data.usage.reasoning_tokens, Some(30));
    }

    #[test]
    fn finish_reason_map_matches_the_vendor_table() {
        assert_eq!(parse_finish_reason("STOP"), StopReason::EndTurn);
        assert_eq!(parse_finish_reason("MAX_TOKENS"), StopReason::MaxTokens);
        assert_eq!(parse_finish_reason("SAFETY"), StopReason::ContentFilter);
        assert_eq!(parse_finish_reason("RECITATION"), StopReason::ContentFilter);
        assert_eq!(parse_finish_reason("TOOL_CODE"), StopReason::ToolUse);
        assert_eq!(parse_finish_reason("MALFORMED_FUNCTION_CALL"), StopReason::Error);
        assert_eq!(parse_finish_reason("FUTURE_REASON"), StopReason::EndTurn);
    }

    #[test]
    fn parse_missing_candidates_is_an_error() {
        assert!(GeminiTransform.parse_response(&json!({}), &cfg()).is_err());
    }

    #[test]
    fn request_assembles_generation_config() {
        let req = CompletionRequest {
            messages: vec![Message::user("hi")],
            max_tokens: Some(256),
            temperature: Some(0.2),
            stop_sequences: vec!["END".into()],
            ..Default::default()
        };
        let (body, _) = to_api_request(&req, "gemini-2.5-flash");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(body["generationConfig"]["stopSequences"][0], "END");
        assert!(body["contents"].is_array());
    }
}
