//! AI provider trait and factory.
//!
//! Defines the `AiProvider` trait both backends implement. [`openai`] talks
//! to the public chat-completions API with a bearer key; [`azure`] talks to
//! an Azure OpenAI deployment, which is addressed by URL instead of by model.

pub mod azure;
pub mod openai;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::{Config, ProviderConfig};
use crate::error::{ChatError, Result};
use azure::AzureOpenAiProvider;
use openai::OpenAiProvider;

/// Default per-request timeout. There is no retry.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A chat-completions backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Short identifier used in logs and errors (e.g., "openai").
    fn name(&self) -> &'static str;

    /// Fully-qualified chat-completions URL.
    fn endpoint(&self) -> String;

    /// Authentication and content-type headers.
    fn headers(&self) -> Result<HeaderMap>;

    /// Fail with a configuration error naming the first missing credential.
    fn validate_config(&self) -> Result<()>;

    /// Adjust the provider-agnostic payload before it goes on the wire.
    fn prepare_payload(&self, payload: Value) -> Value {
        payload
    }

    /// Validate, send `payload`, and return the decoded response body as-is.
    async fn make_request(&self, payload: Value) -> Result<Value>;
}

/// Build the adapter for the provider selected in `config`.
///
/// Unsupported provider ids fail here, before any request is attempted.
pub fn from_config(config: &Config, client: Client) -> Result<Box<dyn AiProvider>> {
    Ok(from_provider_config(&config.provider_config()?, client))
}

pub fn from_provider_config(config: &ProviderConfig, client: Client) -> Box<dyn AiProvider> {
    match config {
        ProviderConfig::OpenAi(settings) => Box::new(OpenAiProvider::new(settings.clone(), client)),
        ProviderConfig::Azure(settings) => {
            Box::new(AzureOpenAiProvider::new(settings.clone(), client))
        }
    }
}

/// Build a header map, rejecting values that cannot be sent (e.g. a key with a newline).
pub(crate) fn header_map(pairs: &[(&'static str, &str)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    for &(name, value) in pairs {
        let value = HeaderValue::from_str(value)
            .map_err(|_| ChatError::config(format!("Invalid value for header {name}")))?;
        headers.insert(HeaderName::from_static(name), value);
    }
    Ok(headers)
}

/// Send `request` with `payload` as its JSON body and decode the response.
///
/// A transport failure or timeout is a [`ChatError::Provider`] without a
/// status and is not retried. Non-success statuses become
/// [`ChatError::Provider`] with `prefix` and the message `extract_error`
/// finds in the body, or "Unknown error".
pub(crate) async fn post_json(
    request: RequestBuilder,
    provider: &'static str,
    prefix: &str,
    payload: &Value,
    timeout: Duration,
    extract_error: fn(&Value) -> Option<String>,
) -> Result<Value> {
    debug!(provider, "Sending chat completion request");

    let response = request
        .timeout(timeout)
        .json(payload)
        .send()
        .await
        .map_err(|e| {
            let message = if e.is_timeout() {
                format!("{prefix}: request timed out after {timeout:?}")
            } else {
                format!("{prefix}: {e}")
            };
            ChatError::provider(provider, None, message)
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| {
        ChatError::provider(provider, Some(status.as_u16()), format!("{prefix}: {e}"))
    })?;

    if !status.is_success() {
        let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::Null);
        error!(provider, status = status.as_u16(), error = %body, "Provider API error");

        let message = extract_error(&parsed).unwrap_or_else(|| "Unknown error".into());
        return Err(ChatError::provider(
            provider,
            Some(status.as_u16()),
            format!("{prefix}: {message}"),
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        ChatError::provider(
            provider,
            Some(status.as_u16()),
            format!("{prefix}: failed to parse response: {e}"),
        )
    })
}
