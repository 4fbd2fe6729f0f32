//! Internal helpers mapping HTTP/reqwest errors to [`ProviderError`].

use std::time::Duration;

use quill_types::ProviderError;

/// Map an HTTP status code from an OpenAI-compatible API to a
/// [`ProviderError`]. A `retry-after` header value, when the caller has
/// one, rides along on rate limits.
pub(crate) fn map_http_status(
    status: reqwest::StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Authentication(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        400 | 422 => ProviderError::InvalidRequest(body.to_string()),
        429 => ProviderError::RateLimit { retry_after },
        500..=599 => ProviderError::ServiceUnavailable(body.to_string()),
        _ => ProviderError::InvalidRequest(format!("HTTP {status}: {body}")),
    }
}

/// Map a [`reqwest::Error`] to a [`ProviderError`].
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(Duration::from_secs(30))
    } else {
        ProviderError::Network(Box::new(err))
    }
}

/// Parse a `retry-after` header into a duration.
pub(crate) fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
