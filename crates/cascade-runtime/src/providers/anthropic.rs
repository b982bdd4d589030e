//! Anthropic Messages API provider.
//!
//! Requires the `anthropic` feature for network access; without it,
//! [`LlmProvider::complete`] fails with [`ProviderError::NotConfigured`].

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable name for the Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Anthropic Claude provider.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
    #[cfg(feature = "anthropic")]
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a provider with an explicit API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "Anthropic API key",
        ))
    }

    /// Create from `ANTHROPIC_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        ApiCredential::from_env(ANTHROPIC_API_KEY_ENV, "Anthropic API key")
            .map(Self::with_credential)
    }

    /// Create from provider settings (`api_key`, `base_url`), falling back
    /// to `ANTHROPIC_API_KEY` for the key.
    pub fn from_settings(settings: &JsonValue) -> Result<Self, ProviderError> {
        super::factory::check_base_url(settings)?;
        let credential =
            ApiCredential::resolve(settings, ANTHROPIC_API_KEY_ENV, "Anthropic API key")?;
        let provider = Self::with_credential(credential);

        Ok(match settings["base_url"].as_str() {
            Some(url) => provider.with_base_url(url),
            None => provider,
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            #[cfg(feature = "anthropic")]
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "anthropic")]
mod wire {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize)]
    pub(super) struct Request {
        pub model: String,
        pub max_tokens: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub system: Option<String>,
        pub messages: Vec<Message>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub temperature: Option<f32>,
    }

    #[derive(Debug, Serialize)]
    pub(super) struct Message {
        pub role: String,
        pub content: String,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Response {
        pub content: Vec<ContentBlock>,
        pub model: String,
        pub stop_reason: Option<String>,
        pub usage: Usage,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ContentBlock {
        pub text: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Usage {
        pub input_tokens: u32,
        pub output_tokens: u32,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ErrorBody {
        pub error: ErrorDetail,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct ErrorDetail {
        pub message: String,
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    #[cfg(feature = "anthropic")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        use super::{send_error, status_error, TokenUsage};

        // The Messages API takes the system prompt out of band.
        let mut system = None;
        let mut turns = Vec::with_capacity(messages.len());
        for msg in messages {
            if msg.role == "system" {
                system = Some(msg.content);
            } else {
                turns.push(wire::Message {
                    role: msg.role,
                    content: msg.content,
                });
            }
        }

        let request = wire::Request {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system,
            messages: turns,
            temperature: config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(config.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response.headers().get("retry-after").cloned();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<wire::ErrorBody>(&text)
                .map(|body| body.error.message)
                .unwrap_or(text);
            return Err(status_error(status, retry_after.as_ref(), message));
        }

        let body: wire::Response = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let content: String = body
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect();

        Ok(CompletionResponse {
            content,
            usage: TokenUsage {
                prompt_tokens: body.usage.input_tokens,
                completion_tokens: body.usage.output_tokens,
            },
            model: body.model,
            stop_reason: body.stop_reason,
        })
    }

    #[cfg(not(feature = "anthropic"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "Anthropic provider requires the 'anthropic' feature".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

/// Factory for Anthropic providers.
///
/// ```json
/// { "api_key": "sk-ant-...", "base_url": "https://..." }
/// ```
///
/// Both fields are optional; the key falls back to `ANTHROPIC_API_KEY`.
pub struct AnthropicProviderFactory;

impl ProviderFactory for AnthropicProviderFactory {
    fn provider_type(&self) -> &'static str {
        "anthropic"
    }

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(AnthropicProvider::from_settings(settings)?))
    }

    fn validate_settings(&self, settings: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(settings, ANTHROPIC_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "Anthropic API key required: set 'api_key' in provider settings or {ANTHROPIC_API_KEY_ENV}"
            )));
        }
        super::factory::check_base_url(settings)
    }

    fn default_model(&self) -> &'static str {
        DEFAULT_MODEL
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude via the Messages API"
    }
}
