//! Azure OpenAI provider.
//!
//! Requests go to a named deployment:
//! `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version={version}`.
//! The deployment stands in for the model, so `model` is dropped from the
//! payload. Authentication uses the `api-key` header, with an optional
//! `x-ms-region`.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{header_map, post_json, AiProvider, REQUEST_TIMEOUT};
use crate::config::AzureSettings;
use crate::error::Result;

pub struct AzureOpenAiProvider {
    client: Client,
    settings: AzureSettings,
    timeout: Duration,
}

impl AzureOpenAiProvider {
    pub fn new(settings: AzureSettings, client: Client) -> Self {
        Self {
            client,
            settings,
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Replace the default per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Azure errors carry either `{"error": "..."}` or `{"error": {"message": "..."}}`.
    fn extract_error(body: &Value) -> Option<String> {
        match body.get("error")? {
            Value::String(message) => Some(message.clone()),
            error => error.get("message")?.as_str().map(str::to_string),
        }
    }
}

#[async_trait]
impl AiProvider for AzureOpenAiProvider {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.deployment_name,
            self.settings.api_version
        )
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut pairs = vec![("api-key", self.settings.api_key.as_str())];
        if let Some(region) = self.settings.region.as_deref().filter(|r| !r.is_empty()) {
            pairs.push(("x-ms-region", region));
        }
        header_map(&pairs)
    }

    fn validate_config(&self) -> Result<()> {
        self.settings.validate()
    }

    fn prepare_payload(&self, mut payload: Value) -> Value {
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("model");
        }
        payload
    }

    async fn make_request(&self, payload: Value) -> Result<Value> {
        self.validate_config()?;
        let payload = self.prepare_payload(payload);
        let request = self.client.post(self.endpoint()).headers(self.headers()?);
        post_json(
            request,
            self.name(),
            "Azure OpenAI API Error",
            &payload,
            self.timeout,
            Self::extract_error,
        )
        .await
    }
}
