//! Text generation as a plan operation.

use async_trait::async_trait;
use cascade_core::{Completion, Operation, Plan, RunError};
use std::future::Future;

use crate::prompts;
use crate::providers::{ChatMessage, CompletionResponse, ProviderError};
use crate::target::ProviderTarget;

/// A fixed conversation sent to whichever target the plan is on.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGeneration {
    messages: Vec<ChatMessage>,
}

impl TextGeneration {
    /// A single user prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(prompt)],
        }
    }

    /// Prepend a system prompt.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.retain(|m| m.role != "system");
        self.messages.insert(0, ChatMessage::system(system));
        self
    }

    /// Ask for a dad joke, optionally with a custom user prompt.
    pub fn dad_joke(prompt: Option<&str>) -> Self {
        Self::new(prompt.unwrap_or(prompts::DAD_JOKE_PROMPT)).with_system(prompts::system_prompt())
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

#[async_trait]
impl Operation<ProviderTarget> for TextGeneration {
    type Output = CompletionResponse;
    type Error = ProviderError;

    async fn execute(&self, target: &ProviderTarget) -> Result<CompletionResponse, ProviderError> {
        let response = target.complete(self.messages.clone()).await?;
        tracing::debug!(
            configuration = %target,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Completion received"
        );
        Ok(response)
    }
}

/// Generate one dad joke through `plan`, stopping early if `cancel` resolves.
pub async fn generate_dad_joke<X>(
    plan: &Plan<ProviderTarget, ProviderError>,
    prompt: Option<&str>,
    cancel: X,
) -> Result<Completion<CompletionResponse>, RunError<ProviderError>>
where
    X: Future<Output = ()>,
{
    let completion = plan.execute(TextGeneration::dad_joke(prompt), cancel).await?;

    if let Some(step) = plan.step(completion.step) {
        tracing::info!(
            configuration = %step.configuration(),
            attempts = completion.total_attempts,
            fell_back = completion.fell_back(),
            "Dad joke generated"
        );
    }
    Ok(completion)
}
