//! The configuration a plan step runs under: one provider and one model.

use std::fmt;
use std::sync::Arc;

use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};

/// A provider client paired with the completion settings for one step.
///
/// Cloning is cheap; the client is shared.
#[derive(Clone)]
pub struct ProviderTarget {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
}

impl ProviderTarget {
    pub fn new(provider: Arc<dyn LlmProvider>, completion: CompletionConfig) -> Self {
        Self {
            provider,
            completion,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn completion(&self) -> &CompletionConfig {
        &self.completion
    }

    pub fn model(&self) -> &str {
        &self.completion.model
    }

    /// Send `messages` to this target's provider.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<CompletionResponse, ProviderError> {
        self.provider.complete(messages, &self.completion).await
    }
}

impl fmt::Display for ProviderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider.name(), self.completion.model)
    }
}

impl fmt::Debug for ProviderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTarget")
            .field("provider", &self.provider.name())
            .field("completion", &self.completion)
            .finish()
    }
}
