//! OpenAI provider.
//!
//! Authenticates with a bearer API key and an optional organization header
//! against the public chat-completions endpoint. The endpoint can be
//! overridden for OpenAI-compatible gateways.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{header_map, post_json, AiProvider, REQUEST_TIMEOUT};
use crate::config::OpenAiSettings;
use crate::error::Result;

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiProvider {
    client: Client,
    settings: OpenAiSettings,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(settings: OpenAiSettings, client: Client) -> Self {
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

    /// Send requests to `endpoint` instead of the public API.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.settings.endpoint = Some(endpoint.into());
        self
    }

    /// OpenAI errors look like `{"error": {"message": "..."}}`.
    fn extract_error(body: &Value) -> Option<String> {
        body.get("error")?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn endpoint(&self) -> String {
        self.settings
            .endpoint
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(OPENAI_ENDPOINT)
            .to_string()
    }

    fn headers(&self) -> Result<HeaderMap> {
        let bearer = format!("Bearer {}", self.settings.api_key);
        let mut pairs = vec![("authorization", bearer.as_str())];
        if let Some(org) = self.settings.organization.as_deref().filter(|o| !o.is_empty()) {
            pairs.push(("openai-organization", org));
        }
        header_map(&pairs)
    }

    fn validate_config(&self) -> Result<()> {
        self.settings.validate()
    }

    async fn make_request(&self, payload: Value) -> Result<Value> {
        self.validate_config()?;
        let payload = self.prepare_payload(payload);
        let request = self.client.post(self.endpoint()).headers(self.headers()?);
        post_json(
            request,
            self.name(),
            "OpenAI API Error",
            &payload,
            self.timeout,
            Self::extract_error,
        )
        .await
    }
}
