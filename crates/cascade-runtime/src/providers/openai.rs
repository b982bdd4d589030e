//! OpenAI Chat Completions provider.
//!
//! Requires the `openai` feature for network access; without it,
//! [`LlmProvider::complete`] fails with [`ProviderError::NotConfigured`].

use super::{
    factory::ProviderFactory,
    secrets::{ApiCredential, CredentialSource},
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Environment variable name for the OpenAI API key.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI provider. Also works against any Chat Completions compatible
/// endpoint via `base_url`.
pub struct OpenAiProvider {
    credential: ApiCredential,
    base_url: String,
    organization: Option<String>,
    #[cfg(feature = "openai")]
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("organization", &self.organization)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_credential(ApiCredential::new(
            api_key,
            CredentialSource::Programmatic,
            "OpenAI API key",
        ))
    }

    /// Create from `OPENAI_API_KEY`.
    pub fn from_env() -> Result<Self, ProviderError> {
        ApiCredential::from_env(OPENAI_API_KEY_ENV, "OpenAI API key").map(Self::with_credential)
    }

    /// Create from provider settings (`api_key`, `base_url`, `organization`).
    pub fn from_settings(settings: &JsonValue) -> Result<Self, ProviderError> {
        super::factory::check_base_url(settings)?;
        let credential = ApiCredential::resolve(settings, OPENAI_API_KEY_ENV, "OpenAI API key")?;
        let mut provider = Self::with_credential(credential);

        if let Some(url) = settings["base_url"].as_str() {
            provider = provider.with_base_url(url);
        }
        provider.organization = settings["organization"].as_str().map(str::to_string);
        Ok(provider)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn with_credential(credential: ApiCredential) -> Self {
        Self {
            credential,
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            #[cfg(feature = "openai")]
            client: reqwest::Client::new(),
        }
    }
}

#[cfg(feature = "openai")]
mod wire {
    use serde::{Deserialize, Serialize};

    use crate::providers::ChatMessage;

    #[derive(Debug, Serialize)]
    pub(super) struct Request<'a> {
        pub model: &'a str,
        pub messages: &'a [ChatMessage],
        pub max_tokens: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub temperature: Option<f32>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Response {
        pub choices: Vec<Choice>,
        pub model: String,
        #[serde(default)]
        pub usage: Option<Usage>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Choice {
        pub message: Message,
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Message {
        pub content: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub(super) struct Usage {
        pub prompt_tokens: u32,
        pub completion_tokens: u32,
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
impl LlmProvider for OpenAiProvider {
    #[cfg(feature = "openai")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        use super::{send_error, status_error, TokenUsage};

        let request = wire::Request {
            model: &config.model,
            messages: &messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.credential.expose())
            .timeout(config.timeout)
            .json(&request);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder
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

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response contained no choices".into()))?;
        let usage = body.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        });

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            usage,
            model: body.model,
            stop_reason: choice.finish_reason,
        })
    }

    #[cfg(not(feature = "openai"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "OpenAI provider requires the 'openai' feature".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        !self.credential.is_empty()
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for OpenAI providers.
///
/// ```json
/// { "api_key": "sk-...", "base_url": "https://...", "organization": "org-..." }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        Ok(Arc::new(OpenAiProvider::from_settings(settings)?))
    }

    fn validate_settings(&self, settings: &JsonValue) -> Result<(), ProviderError> {
        if !ApiCredential::is_available(settings, OPENAI_API_KEY_ENV) {
            return Err(ProviderError::NotConfigured(format!(
                "OpenAI API key required: set 'api_key' in provider settings or {OPENAI_API_KEY_ENV}"
            )));
        }
        super::factory::check_base_url(settings)
    }

    fn default_model(&self) -> &'static str {
        DEFAULT_MODEL
    }

    fn description(&self) -> &'static str {
        "OpenAI via the Chat Completions API"
    }
}
