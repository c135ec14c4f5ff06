mod catalog;
pub mod dispatch;
mod ollama;
mod openai;

use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::time::Duration;

use crate::types::{ContextTurn, TurnRole};

pub use catalog::ModelCatalog;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Lazy, forward-only sequence of text fragments from a provider
pub type FragmentStream = Pin<Box<dyn Stream<Item = LlmResult<String>> + Send>>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// One role/content turn of an outbound chat request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

impl From<&ContextTurn> for ChatTurn {
    fn from(t: &ContextTurn) -> Self {
        Self::new(t.role, t.content.clone())
    }
}

/// Request for a chat completion
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Ordered conversation turns, oldest first
    pub messages: Vec<ChatTurn>,
    /// Maximum response length in tokens (provider-dependent)
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Nucleus sampling threshold
    pub top_p: Option<f32>,
    /// Timeout for the request (and for each streamed fragment)
    pub timeout: Duration,
    /// Model to use instead of the provider's configured one
    pub model_override: Option<String>,
}

/// Trait that all LLM providers must implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate an answer as a stream of fragments
    async fn stream(&self, request: GenerateRequest) -> LlmResult<FragmentStream>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Split a `provider:model` binding
pub fn split_model_id(model_id: &str) -> LlmResult<(&str, &str)> {
    match model_id.split_once(':') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok((provider, model))
        }
        _ => Err(LlmError::ConfigError(format!(
            "Invalid model ID '{}', expected 'provider:model'",
            model_id
        ))),
    }
}

/// Manager for multiple LLM providers
pub struct LlmManager {
    pub providers: Vec<Box<dyn LlmProvider>>,
}

impl LlmManager {
    /// Create a new LLM manager with the given providers
    pub fn new(providers: Vec<Box<dyn LlmProvider>>) -> Self {
        Self { providers }
    }

    pub fn provider(&self, name: &str) -> Option<&dyn LlmProvider> {
        self.providers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Stream from a specific `provider:model` binding
    pub async fn stream_from_model(
        &self,
        model_id: &str,
        request: GenerateRequest,
    ) -> LlmResult<FragmentStream> {
        let (provider_name, model_name) = split_model_id(model_id)?;

        let provider = self.provider(provider_name).ok_or_else(|| {
            LlmError::ConfigError(format!("Provider '{}' not configured", provider_name))
        })?;

        let request_with_override = GenerateRequest {
            model_override: Some(model_name.to_string()),
            ..request
        };

        provider.stream(request_with_override).await
    }
}

/// Configuration for LLM providers
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI model to use
    pub openai_model: String,
    /// Alternative OpenAI-compatible endpoint
    pub openai_base_url: Option<String>,
    /// NVIDIA NIM API key (OpenAI-compatible endpoint)
    pub nvidia_api_key: Option<String>,
    pub nvidia_base_url: String,
    pub nvidia_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama model to use
    pub ollama_model: String,
    /// Default timeout for LLM requests
    pub default_timeout: Duration,
    /// Default max tokens for responses
    pub default_max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Catalog override, `name=provider:model,name2=provider:model`
    pub catalog: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            openai_base_url: None,
            nvidia_api_key: None,
            nvidia_base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            nvidia_model: "meta/llama-3.1-8b-instruct".to_string(),
            ollama_base_url: Some("http://localhost:11434".to_string()),
            ollama_model: "llama3.2".to_string(),
            default_timeout: Duration::from_secs(30),
            default_max_tokens: 200,
            temperature: 0.7,
            top_p: 1.0,
            catalog: None,
        }
    }
}

/// Read a non-blank, trimmed environment variable
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

impl LlmConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ollama_base_url = match std::env::var("OLLAMA_BASE_URL") {
            Ok(url) => {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => defaults.ollama_base_url.clone(),
        };

        Self {
            openai_api_key: env_string("OPENAI_API_KEY"),
            openai_model: env_string("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            openai_base_url: env_string("OPENAI_BASE_URL"),
            nvidia_api_key: env_string("NVIDIA_API_KEY"),
            nvidia_base_url: env_string("NVIDIA_BASE_URL").unwrap_or(defaults.nvidia_base_url),
            nvidia_model: env_string("NVIDIA_MODEL").unwrap_or(defaults.nvidia_model),
            ollama_base_url,
            ollama_model: env_string("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            default_timeout: env_parse("LLM_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_timeout),
            default_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(defaults.default_max_tokens),
            temperature: env_parse("LLM_TEMPERATURE").unwrap_or(defaults.temperature),
            top_p: env_parse("LLM_TOP_P").unwrap_or(defaults.top_p),
            catalog: env_string("LLM_CATALOG"),
        }
    }

    /// Build an LlmManager with all configured providers
    pub fn build_manager(&self) -> LlmResult<LlmManager> {
        let mut providers: Vec<Box<dyn LlmProvider>> = Vec::new();

        if let Some(api_key) = &self.openai_api_key {
            let provider = match &self.openai_base_url {
                Some(base_url) => OpenAiProvider::with_base_url(
                    "openai",
                    api_key.clone(),
                    base_url.clone(),
                    self.openai_model.clone(),
                ),
                None => OpenAiProvider::new(api_key.clone(), self.openai_model.clone()),
            };
            providers.push(Box::new(provider));
        }

        if let Some(api_key) = &self.nvidia_api_key {
            providers.push(Box::new(OpenAiProvider::with_base_url(
                "nvidia",
                api_key.clone(),
                self.nvidia_base_url.clone(),
                self.nvidia_model.clone(),
            )));
        }

        if let Some(base_url) = &self.ollama_base_url {
            providers.push(Box::new(OllamaProvider::new(
                base_url.clone(),
                self.ollama_model.clone(),
            )));
        }

        if providers.is_empty() {
            return Err(LlmError::ConfigError(
                "No LLM providers configured. Set OPENAI_API_KEY, NVIDIA_API_KEY or OLLAMA_BASE_URL"
                    .to_string(),
            ));
        }

        Ok(LlmManager::new(providers))
    }

    /// Catalog from `LLM_CATALOG`, or one entry per configured provider
    pub fn build_catalog(&self) -> LlmResult<ModelCatalog> {
        if let Some(raw) = &self.catalog {
            return ModelCatalog::parse(raw);
        }

        let mut pairs = Vec::new();
        if self.openai_api_key.is_some() {
            pairs.push(("gpt".to_string(), format!("openai:{}", self.openai_model)));
        }
        if self.nvidia_api_key.is_some() {
            pairs.push(("nim".to_string(), format!("nvidia:{}", self.nvidia_model)));
        }
        if self.ollama_base_url.is_some() {
            pairs.push(("llama".to_string(), format!("ollama:{}", self.ollama_model)));
        }
        Ok(ModelCatalog::from_pairs(pairs))
    }

    /// Sampling parameters for a dispatch over the given turns
    pub fn request(&self, messages: Vec<ChatTurn>) -> GenerateRequest {
        GenerateRequest {
            messages,
            max_tokens: Some(self.default_max_tokens),
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            timeout: self.default_timeout,
            model_override: None,
        }
    }
}
