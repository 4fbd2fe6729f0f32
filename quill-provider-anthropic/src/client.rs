//! Anthropic API client struct and builder.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rust_decimal::Decimal;

use quill_types::{
    CompletionRequest, CompletionResult, CredentialReport, ModelCapabilities, ModelInfo,
    ModelPricing, Provider, ProviderError, ProviderTransform as _, StreamHandle, TransformConfig,
    estimate_request_tokens,
};

use crate::error::{map_http_status, map_reqwest_error};
use crate::streaming::stream_completion;
use crate::transform::{AnthropicTransform, to_api_request};

/// Default model used when none is specified on the request.
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Default Anthropic API base URL.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value.
const API_VERSION: &str = "2023-06-01";

/// Timeout for the credential probe.
const CREDENTIAL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the Anthropic Messages API.
///
/// # Example
///
/// ```no_run
/// use quill_provider_anthropic::Anthropic;
///
/// let client = Anthropic::new("sk-ant-...")
///     .model("claude-sonnet-4-5")
///     .timeout(std::time::Duration::from_secs(60));
/// ```
pub struct Anthropic {
    api_key: String,
    model: String,
    base_url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl Anthropic {
    /// Create a new client with the given API key and default settings.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
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

    /// Override the API base URL (testing, proxies).
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
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

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let (body, warnings) = to_api_request(request, &self.model);
        for warning in &warnings {
            tracing::warn!(code = %warning.code, message = %warning.message, "lossy transform");
        }
        body
    }
}

impl Provider for Anthropic {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResult, ProviderError>> + Send {
        let mut body = self.build_body(&request);
        let model_id = body["model"].as_str().unwrap_or(&self.model).to_string();
        let cfg = TransformConfig::for_model(model_id);
        let http = self.request(self.messages_url());

        async move {
            body["stream"] = serde_json::Value::Bool(false);
            tracing::debug!(model = %body["model"], "sending completion request to Anthropic");

            let response = http.json(&body).send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            let text = response.text().await.map_err(map_reqwest_error)?;
            if !status.is_success() {
                return Err(map_http_status(status, &text));
            }

            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| ProviderError::InvalidRequest(format!("invalid JSON response: {e}")))?;
            let parsed = AnthropicTransform.parse_response(&json, &cfg)?;
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
        let http = self.request(self.messages_url());

        async move {
            body["stream"] = serde_json::Value::Bool(true);
            tracing::debug!(model = %body["model"], "opening completion stream to Anthropic");

            let response = http.json(&body).send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.map_err(map_reqwest_error)?;
                return Err(map_http_status(status, &text));
            }
            Ok(stream_completion(response))
        }
    }

    /// Count input tokens via `/v1/messages/count_tokens`, falling back to
    /// the local estimate when the endpoint is unreachable.
    fn count_tokens(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<u64, ProviderError>> + Send {
        let (mut body, _) = to_api_request(request, &self.model);
        let http = self.request(format!("{}/v1/messages/count_tokens", self.base_url));
        let fallback =
            estimate_request_tokens(request, quill_types::ImageTokenFamily::Anthropic);

        async move {
            // The counting endpoint rejects max_tokens.
            if let Some(obj) = body.as_object_mut() {
                obj.remove("max_tokens");
            }
            let result = async {
                let response = http.json(&body).send().await.map_err(map_reqwest_error)?;
                let status = response.status();
                let text = response.text().await.map_err(map_reqwest_error)?;
                if !status.is_success() {
                    return Err(map_http_status(status, &text));
                }
                let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    ProviderError::InvalidRequest(format!("invalid JSON response: {e}"))
                })?;
                json["input_tokens"].as_u64().ok_or_else(|| {
                    ProviderError::InvalidRequest("missing 'input_tokens' in response".into())
                })
            }
            .await;

            match result {
                Ok(tokens) => Ok(tokens),
                Err(err) if err.is_retryable() => {
                    tracing::debug!(error = %err, "token counting endpoint unreachable, estimating");
                    Ok(fallback)
                }
                Err(err) => Err(err),
            }
        }
    }

    fn list_models(&self) -> impl Future<Output = Result<Vec<ModelInfo>, ProviderError>> + Send {
        async { Ok(model_catalog()) }
    }

    fn validate_credential(&self) -> impl Future<Output = CredentialReport> + Send {
        let mut warnings = Vec::new();
        if !self.api_key.starts_with("sk-ant-") {
            warnings.push("API key does not look like an Anthropic key (sk-ant-…)".to_string());
        }
        let probe = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .timeout(CREDENTIAL_PROBE_TIMEOUT);

        async move {
            let mut report = match probe.send().await {
                Ok(response) if response.status().is_success() => CredentialReport::ok(),
                Ok(response) if response.status().as_u16() == 401 => {
                    CredentialReport::invalid("API key was rejected")
                }
                Ok(response) => {
                    CredentialReport::invalid(format!("unexpected status {}", response.status()))
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    CredentialReport::invalid("cannot reach api.anthropic.com")
                }
                Err(e) => CredentialReport::invalid(e.to_string()),
            };
            report.warnings = warnings;
            report
        }
    }
}

/// Known Anthropic models with capabilities and pricing.
fn model_catalog() -> Vec<ModelInfo> {
    let price = |cents: i64| Decimal::new(cents, 2);
    let caps = ModelCapabilities {
        tools: true,
        vision: true,
        reasoning: true,
        streaming: true,
        prompt_cache: true,
    };
    vec![
        ModelInfo {
            id: "claude-opus-4-1".into(),
            display_name: "Claude Opus 4.1".into(),
            context_window: 200_000,
            max_output_tokens: 32_000,
            capabilities: caps,
            pricing: Some(ModelPricing {
                input_per_mtok: price(1500),
                output_per_mtok: price(7500),
                cache_read_per_mtok: Some(Decimal::new(150, 2)),
                cache_write_per_mtok: Some(Decimal::new(1875, 2)),
                tiers: vec![],
            }),
        },
        ModelInfo {
            id: "claude-sonnet-4-5".into(),
            display_name: "Claude Sonnet 4.5".into(),
            context_window: 200_000,
            max_output_tokens: 64_000,
            capabilities: caps,
            pricing: Some(ModelPricing {
                input_per_mtok: price(300),
                output_per_mtok: price(1500),
                cache_read_per_mtok: Some(Decimal::new(30, 2)),
                cache_write_per_mtok: Some(Decimal::new(375, 2)),
                tiers: vec![],
            }),
        },
        ModelInfo {
            id: "claude-haiku-4-5".into(),
            display_name: "Claude Haiku 4.5".into(),
            context_window: 200_000,
            max_output_tokens: 64_000,
            capabilities: caps,
            pricing: Some(ModelPricing {
                input_per_mtok: price(100),
                output_per_mtok: price(500),
                cache_read_per_mtok: Some(Decimal::new(10, 2)),
                cache_write_per_mtok: Some(Decimal::new(125, 2)),
                tiers: vec![],
            }),
        },
    ]
}
