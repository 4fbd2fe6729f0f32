//! Gemini API client struct and builder.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use rust_decimal::Decimal;

use quill_types::{
    CompletionRequest, CompletionResult, CredentialReport, ModelCapabilities, ModelInfo,
    ModelPricing, PricingTier, Provider, ProviderError, ProviderTransform as _, StreamHandle,
    TransformConfig, estimate_request_tokens,
};

use crate::error::{map_http_status, map_reqwest_error};
use crate::streaming::stream_completion;
use crate::transform::{GeminiTransform, to_api_request};

/// Default model used when none is specified on the request.
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default Gemini API base URL.
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Timeout for the credential probe.
const CREDENTIAL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the Gemini generateContent API.
///
/// # Example
///
/// ```no_run
/// use quill_provider_gemini::Gemini;
///
/// let client = Gemini::new("AIza...").model("gemini-2.5-pro");
/// ```
pub struct Gemini {
    api_key: String,
    model: String,
    base_url: String,
    headers: HashMap<String, String>,
    client: reqwest::Client,
}

impl Gemini {
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

    fn model_for(&self, request: &CompletionRequest) -> String {
        if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        }
    }

    fn action_url(&self, model: &str, action: &str) -> String {
        format!("{}/models/{model}:{action}", self.base_url)
    }

    fn request(&self, url: String) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json");
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    fn build_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let (body, warnings) = to_api_request(request, &self.model);
        for warning in &warnings {
            tracing::warn!(code = %warning.code, message = %warning.message, "lossy transform");
        }
        body
    }
}

impl Provider for Gemini {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResult, ProviderError>> + Send {
        let model = self.model_for(&request);
        let cfg = TransformConfig::for_model(model.clone());
        let body = self.build_body(&request);
        let http = self.request(self.action_url(&model, "generateContent"));

        async move {
            tracing::debug!(model = %model, "sending completion request to Gemini");
            let response = http.json(&body).send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            let text = response.text().await.map_err(map_reqwest_error)?;
            if !status.is_success() {
                return Err(map_http_status(status, &text));
            }
            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| ProviderError::InvalidRequest(format!("invalid JSON response: {e}")))?;
            let parsed = GeminiTransform.parse_response(&json, &cfg)?;
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
        let model = self.model_for(&request);
        let body = self.build_body(&request);
        let http = self.request(format!(
            "{}?alt=sse",
            self.action_url(&model, "streamGenerateContent")
        ));

        async move {
            tracing::debug!(model = %model, "opening completion stream to Gemini");
            let response = http.json(&body).send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.map_err(map_reqwest_error)?;
                return Err(map_http_status(status, &text));
            }
            Ok(stream_completion(response))
        }
    }

    /// Count tokens via `:countTokens`, falling back to the local estimate
    /// when the endpoint is unreachable.
    fn count_tokens(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<u64, ProviderError>> + Send {
        let model = self.model_for(request);
        let (body, _) = to_api_request(request, &self.model);
        let http = self.request(self.action_url(&model, "countTokens"));
        let fallback = estimate_request_tokens(request, quill_types::ImageTokenFamily::Gemini);

        async move {
            let count_body = serde_json::json!({ "contents": body["contents"] });
            let result = async {
                let response = http
                    .json(&count_body)
                    .send()
                    .await
                    .map_err(map_reqwest_error)?;
                let status = response.status();
                let text = response.text().await.map_err(map_reqwest_error)?;
                if !status.is_success() {
                    return Err(map_http_status(status, &text));
                }
                let json: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
                    ProviderError::InvalidRequest(format!("invalid JSON response: {e}"))
                })?;
                json["totalTokens"].as_u64().ok_or_else(|| {
                    ProviderError::InvalidRequest("missing 'totalTokens' in response".into())
                })
            }
            .await;

            match result {
                Ok(tokens) => Ok(tokens),
                Err(err) if err.is_retryable() => {
                    tracing::debug!(error = %err, "countTokens unreachable, estimating");
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
        let probe = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .timeout(CREDENTIAL_PROBE_TIMEOUT);

        async move {
            match probe.send().await {
                Ok(response) if response.status().is_success() => CredentialReport::ok(),
                Ok(response) if matches!(response.status().as_u16(), 401 | 403) => {
                    CredentialReport::invalid("API key was rejected")
                }
                Ok(response) => {
                    CredentialReport::invalid(format!("unexpected status {}", response.status()))
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    CredentialReport::invalid("cannot reach generativelanguage.googleapis.com")
                }
                Err(e) => CredentialReport::invalid(e.to_string()),
            }
        }
    }
}

/// Known Gemini models with capabilities and pricing.
///
/// Gemini 2.5 Pro carries a long-context surcharge tier above 200k input
/// tokens.
fn model_catalog() -> Vec<ModelInfo> {
    let caps = ModelCapabilities {
        tools: true,
        vision: true,
        reasoning: true,
        streaming: true,
        prompt_cache: true,
    };
    vec![
        ModelInfo {
            id: "gemini-2.5-pro".into(),
            display_name: "Gemini 2.5 Pro".into(),
            context_window: 1_048_576,
            max_output_tokens: 65_536,
            capabilities: caps,
            pricing: Some(ModelPricing {
                input_per_mtok: Decimal::new(125, 2),
                output_per_mtok: Decimal::new(1000, 2),
                cache_read_per_mtok: Some(Decimal::new(31, 2)),
                cache_write_per_mtok: None,
                tiers: vec![PricingTier {
                    threshold_tokens: 200_000,
                    input_per_mtok: Decimal::new(250, 2),
                    output_per_mtok: Decimal::new(1500, 2),
                }],
            }),
        },
        ModelInfo {
            id: "gemini-2.5-flash".into(),
            display_name: "Gemini 2.5 Flash".into(),
            context_window: 1_048_576,
            max_output_tokens: 65_536,
            capabilities: caps,
            pricing: Some(ModelPricing {
                input_per_mtok: Decimal::new(30, 2),
                output_per_mtok: Decimal::new(250, 2),
                cache_read_per_mtok: Some(Decimal::new(7, 2)),
                cache_write_per_mtok: None,
                tiers: vec![],
            }),
        },
        ModelInfo {
            id: "gemini-2.5-flash-lite".into(),
            display_name: "Gemini 2.5 Flash-Lite".into(),
            context_window: 1_048_576,
            max_output_tokens: 65_536,
            capabilities: caps,
            pricing: Some(ModelPricing {
                input_per_mtok: Decimal::new(10, 2),
                output_per_mtok: Decimal::new(40, 2),
                cache_read_per_mtok: Some(Decimal::new(2, 2)),
                cache_write_per_mtok: None,
                tiers: vec![],
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let client = Gemini::new("AIza-test");
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(
            client.action_url("gemini-2.5-flash", "generateContent"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn request_model_overrides_the_default() {
        let client = Gemini::new("k").model("gemini-2.5-pro");
        let req = CompletionRequest {
            model: "gemini-2.5-flash-lite".into(),
            ..Default::default()
        };
        assert_eq!(client.model_for(&req), "gemini-2.5-flash-lite");
        assert_eq!(client.model_for(&CompletionRequest::default()), "gemini-2.5-pro");
    }

    #[test]
    fn pro_model_has_a_long_context_tier() {
        let catalog = model_catalog();
        let pro = catalog.iter().find(|m| m.id == "gemini-2.5-pro").unwrap();
        let tiers = &pro.pricing.as_ref().unwrap().tiers;
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].threshold_tokens, 200_000);
        assert!(tiers[0].input_per_mtok > pro.pricing.as_ref().unwrap().input_per_mtok);
    }

    #[tokio::test]
    async fn unreachable_server_fails_credential_check() {
        let client = Gemini::new("AIza-test").base_url("http://127.0.0.1:1");
        let report = client.validate_credential().await;
        assert!(!report.valid);
    }
}
