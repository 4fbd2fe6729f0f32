//! The provider facade trait.
//!
//! [`Provider`] uses RPITIT (return-position `impl Trait` in traits) and is
//! intentionally NOT object-safe; clients are held as concrete types or
//! behind generics. The object-safe boundary in this workspace is
//! [`crate::transform::ProviderTransform`].

use std::future::Future;

use crate::error::ProviderError;
use crate::image::{ImageDetail, ImageTokenFamily, message_image_tokens};
use crate::stream::StreamHandle;
use crate::types::{CompletionRequest, CompletionResult, CredentialReport, ModelInfo};

/// Approximate chars-per-token ratio used by the heuristic estimator.
const CHARS_PER_TOKEN: usize = 4;

/// Uniform interface over LLM transports.
///
/// Each vendor client (Anthropic, OpenAI and compatibles, Gemini)
/// implements this. Construction (API key, base URL, timeout, headers)
/// happens on the concrete client builder before any method is usable.
pub trait Provider: Send + Sync {
    /// Send a completion request and wait for the full response.
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResult, ProviderError>> + Send;

    /// Send a completion request and stream canonical events back.
    fn stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<StreamHandle, ProviderError>> + Send;

    /// Count (or estimate) the input tokens for a request.
    ///
    /// The default implementation is the local heuristic
    /// [`estimate_request_tokens`]; vendors with a counting endpoint
    /// override it.
    fn count_tokens(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<u64, ProviderError>> + Send {
        let estimate = estimate_request_tokens(request, ImageTokenFamily::Unknown);
        async move { Ok(estimate) }
    }

    /// List models available through this provider.
    fn list_models(&self) -> impl Future<Output = Result<Vec<ModelInfo>, ProviderError>> + Send;

    /// Check whether the configured credential (or local server) is usable.
    ///
    /// Never fails hard: unreachable servers and bad keys come back as a
    /// failing [`CredentialReport`], not an error.
    fn validate_credential(&self) -> impl Future<Output = CredentialReport> + Send;
}

/// Heuristic token estimate: text at ~4 chars per token plus per-image
/// costs for the given provider family, plus a small per-message overhead.
#[must_use]
pub fn estimate_request_tokens(request: &CompletionRequest, family: ImageTokenFamily) -> u64 {
    let mut total: u64 = 0;
    for msg in &request.messages {
        total += 4; // role and framing overhead
        for part in &msg.content {
            match part {
                crate::types::ContentPart::Text { text } => {
                    total += (text.len() / CHARS_PER_TOKEN) as u64;
                }
                crate::types::ContentPart::ToolUse { input, .. } => {
                    total += (input.to_string().len() / CHARS_PER_TOKEN) as u64;
                }
                crate::types::ContentPart::ToolResult { content, .. } => {
                    total += (content.as_text().len() / CHARS_PER_TOKEN) as u64;
                }
                crate::types::ContentPart::Image { .. } => {}
            }
        }
        total += message_image_tokens(msg, family, ImageDetail::Auto);
    }
    for tool in &request.tools {
        total += (tool.description.len() / CHARS_PER_TOKEN) as u64;
        total += (tool.input_schema.to_string().len() / CHARS_PER_TOKEN) as u64;
    }
    total
}
