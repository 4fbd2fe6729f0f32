//! OpenAI (and compatible) API client struct and builder.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use quill_types::{
    CompletionRequest, CompletionResult, CredentialReport, ImageTokenFamily, ModelCapabilities,
    ModelInfo, Provider, ProviderError, ProviderTransform as _, StreamHandle, TransformConfig,
    estimate_request_tokens,
};

use crate::error::{map_http_status, map_reqwest_error, parse_retry_after};
use crate::streaming::stream_completion;
use crate::transform::{OpenAiTransform, to_api_request};

/// Default model used when none is specified on the request.
const DEFAULT_MODEL: &str = "gpt-4o";

/// Default OpenAI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Timeout for the credential probe.
const CREDENTIAL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Context window assumed for Ollama models when `/api/show` fails.
const OLLAMA_FALLBACK_CONTEXT: u64 = 4096;

/// Client for the OpenAI Chat Completions API and its compatible vendors.
///
/// # Example
///
/// ```no_run
/// use quill_provider_openai::{OpenAi, compat};
///
/// let openai = OpenAi::new("sk-...");
/// let groq = OpenAi::for_vendor(compat::vendor("groq").unwrap(), "gsk-...");
/// ```
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: String,
    vendor_id: String,
    is_local: bool,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl OpenAi {
    /// Create a new client with the given API key and default settings.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            vendor_id: "openai".into(),
            is_local: false,
            headers: HashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the default model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Override the API base URL (compatible vendors, proxies, tests).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Tag this client with a vendor id (used in logs and local probing).
    #[must_use]
    pub fn vendor_id(mut self, id: impl Into<String>) -> Self {
        self.vendor_id = id.into();
        self
    }

    /// Mark the vendor as locally hosted.
    #[must_use]
    pub fn local(mut self, is_local: bool) -> Self {
        self.is_local = is_local;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// Add an extra header to every request.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Base URL with any `/v1` suffix removed, for Ollama's native API.
    fn native_base(&self) -> String {
        self.base_url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .trim_end_matches('/')
            .to_string()
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("content-type", "application/json");
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let (body, warnings) = to_api_request(request, &self.model);
        for warning in &warnings {
            tracing::warn!(
                vendor = %self.vendor_id,
                code = %warning.code,
                message = %warning.message,
                "lossy transform"
            );
        }
        body
    }

    async fn ollama_context_window(&self, model: &str) -> u64 {
        let url = format!("{}/api/show", self.native_base());
        let result = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": model }))
            .timeout(CREDENTIAL_PROBE_TIMEOUT)
            .send()
            .await;
        let Ok(response) = result else {
            return OLLAMA_FALLBACK_CONTEXT;
        };
        let Ok(json) = response.json::<serde_json::Value>().await else {
            return OLLAMA_FALLBACK_CONTEXT;
        };
        // model_info keys are architecture-prefixed, e.g. "llama.context_length".
        json["model_info"]
            .as_object()
            .and_then(|info| {
                info.iter()
                    .find(|(key, _)| key.ends_with(".context_length"))
                    .and_then(|(_, value)| value.as_u64())
            })
            .unwrap_or(OLLAMA_FALLBACK_CONTEXT)
    }

    async fn list_ollama_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let url = format!("{}/api/tags", self.native_base());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let json: serde_json::Value = response.json().await.map_err(map_reqwest_error)?;
        let mut models = Vec::new();
        for model in json["models"].as_array().into_iter().flatten() {
            let Some(name) = model["name"].as_str() else {
                continue;
            };
            models.push(ModelInfo {
                id: name.to_string(),
                display_name: name.to_string(),
                context_window: self.ollama_context_window(name).await,
                max_output_tokens: 4096,
                capabilities: ModelCapabilities {
                    tools: true,
                    vision: false,
                    reasoning: false,
                    streaming: true,
                    prompt_cache: false,
                },
                pricing: None,
            });
        }
        Ok(models)
    }

    async fn list_openai_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let response = self
            .request_get(format!("{}/models", self.base_url))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(&response);
            let text = response.text().await.map_err(map_reqwest_error)?;
            return Err(map_http_status(status, &text, retry_after));
        }
        let json: serde_json::Value = response.json().await.map_err(map_reqwest_error)?;
        let models = json["data"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|model| model["id"].as_str())
            .map(|id| ModelInfo {
                id: id.to_string(),
                display_name: id.to_string(),
                context_window: 128_000,
                max_output_tokens: 16_384,
                capabilities: ModelCapabilities {
                    tools: true,
                    vision: id.contains("4o") || id.contains("vision"),
                    reasoning: id.starts_with('o'),
                    streaming: true,
                    prompt_cache: true,
                },
                pricing: None,
            })
            .collect();
        Ok(models)
    }

    fn request_get(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        builder
    }
}

impl Provider for OpenAi {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResult, ProviderError>> + Send {
        let mut body = self.build_body(&request);
        let model_id = body["model"].as_str().unwrap_or(&self.model).to_string();
        let cfg = TransformConfig::for_model(model_id);
        let http = self.request(self.chat_url());
        let vendor = self.vendor_id.clone();

        async move {
            body["stream"] = serde_json::Value::Bool(false);
            tracing::debug!(vendor = %vendor, model = %body["model"], "sending completion request");

            let response = http.json(&body).send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            if !status.is_success() {
                let retry_after = parse_retry_after(&response);
                let text = response.text().await.map_err(map_reqwest_error)?;
                return Err(map_http_status(status, &text, retry_after));
            }
            let json: serde_json::Value = response.json().await.map_err(map_reqwest_error)?;
            let parsed = OpenAiTransform.parse_response(&json, &cfg)?;
            for warning in &parsed.warnings {
                tracing::warn!(code = %warning.code, message = %warning.message, "lossy parse");
            }
            Ok(parsed.data)
        }
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<StreamHandle, ProviderError>> + Send {
        let mut body = self.build_body(&request);
        let http = self.request(self.chat_url());
        let vendor = self.vendor_id.clone();

        async move {
            body["stream"] = serde_json::Value::Bool(true);
            body["stream_options"] = serde_json::json!({ "include_usage": true });
            tracing::debug!(vendor = %vendor, model = %body["model"], "opening completion stream");

            let response = http.json(&body).send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            if !status.is_success() {
                let retry_after = parse_retry_after(&response);
                let text = response.text().await.map_err(map_reqwest_error)?;
                return Err(map_http_status(status, &text, retry_after));
            }
            Ok(stream_completion(response))
        }
    }

    fn count_tokens(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<u64, ProviderError>> + Send {
        let estimate = estimate_request_tokens(request, ImageTokenFamily::OpenAi);
        async move { Ok(estimate) }
    }

    fn list_models(&self) -> impl Future<Output = Result<Vec<ModelInfo>, ProviderError>> + Send {
        async move {
            if self.vendor_id == "ollama" {
                self.list_ollama_models().await
            } else {
                self.list_openai_models().await
            }
        }
    }

    /// For cloud vendors: a live `GET /models` with the bearer key. For
    /// local hosts: probe the server (`/api/tags` for Ollama, `/models`
    /// for LM Studio style) and map connection failures to a friendly
    /// "server not running" message.
    fn validate_credential(&self) -> impl Future<Output = CredentialReport> + Send {
        let url = if self.vendor_id == "ollama" {
            format!("{}/api/tags", self.native_base())
        } else {
            format!("{}/models", self.base_url)
        };
        let probe = self.request_get(url).timeout(CREDENTIAL_PROBE_TIMEOUT);
        let is_local = self.is_local;
        let vendor = self.vendor_id.clone();
        let display_base = self.base_url.clone();

        async move {
            match probe.send().await {
                Ok(response) if response.status().is_success() => CredentialReport::ok(),
                Ok(response) if response.status().as_u16() == 401 => {
                    CredentialReport::invalid("API key was rejected")
                }
                Ok(response) => {
                    CredentialReport::invalid(format!("unexpected status {}", response.status()))
                }
                Err(e) if is_local && (e.is_connect() || e.is_timeout()) => {
                    CredentialReport::invalid(format!(
                        "{vendor} server not running at {display_base}"
                    ))
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    CredentialReport::invalid(format!("cannot reach {display_base}"))
                }
                Err(e) => CredentialReport::invalid(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat;

    #[test]
    fn builder_defaults() {
        let client = OpenAi::new("sk-test");
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.chat_url(), "https://api.openai.com/v1/chat/completions");
        assert!(!client.is_local);
    }

    #[test]
    fn vendor_constructor_applies_the_table_entry() {
        let groq = compat::vendor("groq").unwrap();
        let client = OpenAi::for_vendor(groq, "gsk-test");
        assert_eq!(client.vendor_id, "groq");
        assert_eq!(client.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(client.model, "llama-3.3-70b-versatile");
    }

    #[test]
    fn native_base_strips_the_version_segment() {
        let ollama = compat::vendor("ollama").unwrap();
        let client = OpenAi::for_vendor(ollama, "");
        assert_eq!(client.native_base(), "http://localhost:11434");
        // Already-bare URLs pass through.
        let bare = OpenAi::new("").base_url("http://localhost:11434");
        assert_eq!(bare.native_base(), "http://localhost:11434");
    }

    #[tokio::test]
    async fn local_vendor_reports_server_not_running() {
        let ollama = compat::vendor("ollama").unwrap();
        let client = OpenAi::for_vendor(ollama, "").base_url("http://127.0.0.1:1/v1");
        let report = client.validate_credential().await;
        assert!(!report.valid);
        let error = report.error.unwrap();
        assert!(error.contains("not running"), "error: {error}");
    }

    #[tokio::test]
    async fn cloud_vendor_reports_unreachable() {
        let client = OpenAi::new("sk-test").base_url("http://127.0.0.1:1/v1");
        let report = client.validate_credential().await;
        assert!(!report.valid);
        assert!(report.error.unwrap().contains("cannot reach"));
    }
}
