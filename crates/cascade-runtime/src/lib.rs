//! # cascade-runtime
//!
//! LLM providers wired into `cascade-core` execution plans.
//!
//! A plan step's configuration is a [`ProviderTarget`] (provider client plus
//! model settings), the operation is a [`TextGeneration`], and provider
//! failures are classified by `impl Classify for ProviderError`:
//!
//! | Failure                                   | Kind                   |
//! |-------------------------------------------|------------------------|
//! | connection error, request timeout         | `transient`            |
//! | non-2xx status, rate limit, bad body      | `provider_unavailable` |
//! | anything else                             | `provider_unavailable` |
//!
//! ## Example
//!
//! ```rust,ignore
//! use cascade_runtime::{generate_dad_joke, PlanConfig, ProviderRegistry};
//!
//! let plan = PlanConfig::default()
//!     .build(&ProviderRegistry::with_defaults(), &serde_json::json!({}))?;
//! let joke = generate_dad_joke(&plan, None, std::future::pending()).await?;
//! println!("{}", joke.value.content);
//! ```

pub mod config;
pub mod generate;
pub mod prompts;
pub mod providers;
pub mod target;

pub use config::{BackoffConfig, ConfigError, PlanConfig, StepConfig};
pub use generate::{generate_dad_joke, TextGeneration};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderRegistry, TokenUsage,
};
pub use target::ProviderTarget;

/// A plan whose steps are provider targets.
pub type ProviderPlan = cascade_core::Plan<ProviderTarget, ProviderError>;
