//! Configuration module for chatagent.
//!
//! Loads typed configuration from `~/.chatagent/config.json`. Credentials
//! left empty in the file fall back to the usual environment variables
//! (`OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`, ...).
//!
//! The file form ([`Config`]) is resolved once into an immutable snapshot:
//! a [`ProviderConfig`] for the adapter and an [`OrchestrationConfig`] for the
//! agent loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::agent::OrchestrationConfig;
use crate::error::{ChatError, Result};
use crate::functions::FunctionCallSetting;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";
pub const DEFAULT_MAX_FUNCTION_ITERATIONS: u32 = 10;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub enabled: bool,
    /// `openai`, `azure` or `azure-openai`.
    pub provider: String,
    pub openai: OpenAiSettings,
    pub azure: AzureSettings,
    pub chat: ChatDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: String::new(),
            openai: OpenAiSettings::default(),
            azure: AzureSettings::default(),
            chat: ChatDefaults::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, then apply environment fallbacks.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let config = if path.exists() {
            Self::read(&path)?
        } else {
            Config::default()
        };
        Ok(config.with_env_fallbacks(|key| std::env::var(key).ok()))
    }

    /// Load configuration from a specific path, without environment fallbacks.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| ChatError::config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// Get the default config directory path.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".chatagent")
    }

    /// Fill empty values from `lookup` (normally the process environment).
    ///
    /// Values present in the file always win.
    pub fn with_env_fallbacks(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        fill(&mut self.provider, get("FILAMENT_AI_CHAT_AGENT_PROVIDER"));
        fill(&mut self.openai.api_key, get("OPENAI_API_KEY"));
        fill_opt(&mut self.openai.organization, get("OPENAI_ORGANIZATION"));
        fill(&mut self.azure.endpoint, get("AZURE_OPENAI_ENDPOINT"));
        fill(&mut self.azure.api_key, get("AZURE_OPENAI_API_KEY"));
        fill_opt(&mut self.azure.region, get("AZURE_OPENAI_REGION"));
        fill(&mut self.azure.deployment_name, get("AZURE_OPENAI_DEPLOYMENT_NAME"));
        fill(&mut self.azure.api_version, get("AZURE_OPENAI_API_VERSION"));
        self
    }

    /// The selected provider; an empty id means `openai`.
    pub fn provider_kind(&self) -> Result<ProviderKind> {
        if self.provider.trim().is_empty() {
            return Ok(ProviderKind::OpenAi);
        }
        self.provider.parse()
    }

    /// Connection parameters for the selected provider.
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        Ok(match self.provider_kind()? {
            ProviderKind::OpenAi => ProviderConfig::OpenAi(self.openai.clone()),
            ProviderKind::Azure => {
                let mut azure = self.azure.clone();
                if azure.api_version.is_empty() {
                    azure.api_version = DEFAULT_AZURE_API_VERSION.into();
                }
                ProviderConfig::Azure(azure)
            }
        })
    }

    /// Settings for the agent loop.
    pub fn orchestration(&self) -> OrchestrationConfig {
        let chat = &self.chat;
        OrchestrationConfig {
            model: chat.model.clone(),
            temperature: chat.temperature,
            max_tokens: chat.max_tokens,
            system_message: Some(chat.system_message.clone()).filter(|s| !s.is_empty()),
            function_call: chat.function_call.clone(),
            max_iterations: chat.max_function_iterations,
        }
    }

    /// Check everything a chat needs, collecting every problem found.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match self.provider_config() {
            Ok(provider) => {
                if let Err(e) = provider.validate() {
                    errors.push(e.to_string());
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        if self.chat.model.is_empty() {
            errors.push("chat.model is empty. Specify a model name.".into());
        }

        if self.chat.max_function_iterations == 0 {
            errors.push("chat.maxFunctionIterations must be at least 1.".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Write the default config template to disk.
    pub fn write_default_template() -> Result<PathBuf> {
        let path = Self::default_path();
        let io_err = |e: std::io::Error| {
            ChatError::config(format!("Failed to write {}: {}", path.display(), e))
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let template = serde_json::json!({
            "provider": "openai",
            "openai": {
                "apiKey": ""
            },
            "azure": {
                "endpoint": "",
                "apiKey": "",
                "deploymentName": "",
                "apiVersion": DEFAULT_AZURE_API_VERSION
            },
            "chat": {
                "model": DEFAULT_MODEL,
                "temperature": 0.7,
                "systemMessage": ""
            }
        });

        let body = serde_json::to_string_pretty(&template)
            .map_err(|e| ChatError::config(e.to_string()))?;
        std::fs::write(&path, body).map_err(io_err)?;
        Ok(path)
    }
}

fn fill(slot: &mut String, value: Option<String>) {
    if slot.is_empty() {
        if let Some(v) = value {
            *slot = v;
        }
    }
}

fn fill_opt(slot: &mut Option<String>, value: Option<String>) {
    if slot.as_deref().map_or(true, str::is_empty) {
        if let Some(v) = value {
            *slot = Some(v);
        }
    }
}

// ── Provider Configuration ──────────────────────────────────────────

/// Supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Azure,
}

pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "azure", "azure-openai"];

impl FromStr for ProviderKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure" | "azure-openai" => Ok(Self::Azure),
            _ => Err(ChatError::config(format!(
                "Unsupported AI provider: {}. Supported providers are: {}",
                s,
                SUPPORTED_PROVIDERS.join(", ")
            ))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::OpenAi => "openai",
            Self::Azure => "azure",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenAiSettings {
    pub api_key: String,
    pub organization: Option<String>,
    /// Overrides the public chat-completions URL (self-hosted gateways).
    pub endpoint: Option<String>,
}

impl OpenAiSettings {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ChatError::config(
                "OpenAI API key is not configured. Please set OPENAI_API_KEY in your \
                 environment or openai.apiKey in config.json",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureSettings {
    pub endpoint: String,
    pub api_key: String,
    pub region: Option<String>,
    pub deployment_name: String,
    pub api_version: String,
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            region: None,
            deployment_name: String::new(),
            api_version: DEFAULT_AZURE_API_VERSION.into(),
        }
    }
}

impl AzureSettings {
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(ChatError::config(
                "Azure OpenAI endpoint is not configured. Please set AZURE_OPENAI_ENDPOINT in \
                 your environment or azure.endpoint in config.json",
            ));
        }
        if self.api_key.is_empty() {
            return Err(ChatError::config(
                "Azure OpenAI API key is not configured. Please set AZURE_OPENAI_API_KEY in \
                 your environment or azure.apiKey in config.json",
            ));
        }
        if self.deployment_name.is_empty() {
            return Err(ChatError::config(
                "Azure OpenAI deployment name is not configured. Please set \
                 AZURE_OPENAI_DEPLOYMENT_NAME in your environment or azure.deploymentName \
                 in config.json",
            ));
        }
        Ok(())
    }
}

/// Resolved connection parameters for one backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    OpenAi(OpenAiSettings),
    Azure(AzureSettings),
}

impl ProviderConfig {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::OpenAi(_) => ProviderKind::OpenAi,
            Self::Azure(_) => ProviderKind::Azure,
        }
    }

    /// Fails on the first missing credential.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::OpenAi(settings) => settings.validate(),
            Self::Azure(settings) => settings.validate(),
        }
    }
}

// ── Chat Configuration ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatDefaults {
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub system_message: String,
    /// `true`/absent lets the model decide, `false` forbids calls, a name forces one.
    pub function_call: Option<FunctionCallSetting>,
    pub max_function_iterations: u32,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            temperature: Some(0.7),
            max_tokens: None,
            system_message: String::new(),
            function_call: None,
            max_function_iterations: DEFAULT_MAX_FUNCTION_ITERATIONS,
        }
    }
}
