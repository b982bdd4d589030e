//! Declarative plan configuration from YAML/JSON.
//!
//! ```yaml
//! steps:
//!   - provider: openai
//!     model: gpt-4o
//!     attempts: 3
//!     backoff: { base: 100ms, factor: 1.5 }
//!     retry_on: [transient]
//!   - provider: anthropic
//!     model: claude-sonnet-4-20250514
//!     attempts: 2
//!     retry_on: [provider_unavailable]
//! ```

use cascade_core::schedule::{DEFAULT_BASE_DELAY, DEFAULT_FACTOR, DEFAULT_MAX_DELAY};
use cascade_core::{AdvancePredicate, ErrorKind, Plan, PlanError, RetrySchedule, Step};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::providers::{CompletionConfig, LlmProvider, ProviderError, ProviderRegistry};
use crate::target::ProviderTarget;

/// Errors from loading or building a plan configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read plan file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Plan validation failed: {0}")]
    ValidationError(String),

    #[error("Provider for step {step} unavailable")]
    ProviderError {
        step: usize,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    PlanError(#[from] PlanError),
}

/// An execution plan as written in a config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanConfig {
    pub steps: Vec<StepConfig>,
}

/// One fallback step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepConfig {
    /// Registered provider type, e.g. `openai`
    pub provider: String,

    /// Model name; the provider's default when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Error kinds that keep this step retrying. Anything else falls
    /// through to the next step. An empty list never retries.
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<ErrorKind>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Per-request timeout
    #[serde(default = "default_timeout", with = "duration_str")]
    pub timeout: Duration,
}

/// Exponential backoff between attempts of one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    #[serde(default = "default_base", with = "duration_str")]
    pub base: Duration,

    #[serde(default = "default_factor")]
    pub factor: f32,

    #[serde(default = "default_max_delay", with = "duration_str")]
    pub max_delay: Duration,

    #[serde(default)]
    pub jitter: bool,
}

fn default_attempts() -> u32 {
    1
}

fn default_retry_on() -> Vec<ErrorKind> {
    vec![ErrorKind::Transient]
}

fn default_max_tokens() -> u32 {
    CompletionConfig::default().max_tokens
}

fn default_timeout() -> Duration {
    CompletionConfig::default().timeout
}

fn default_base() -> Duration {
    DEFAULT_BASE_DELAY
}

fn default_factor() -> f32 {
    DEFAULT_FACTOR
}

fn default_max_delay() -> Duration {
    DEFAULT_MAX_DELAY
}

/// Durations as humantime strings (`"100ms"`, `"1m 30s"`).
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            factor: DEFAULT_FACTOR,
            max_delay: DEFAULT_MAX_DELAY,
            jitter: false,
        }
    }
}

impl BackoffConfig {
    pub fn schedule(&self) -> RetrySchedule {
        let schedule =
            RetrySchedule::exponential(self.base, self.factor).with_max_delay(self.max_delay);
        if self.jitter {
            schedule.with_jitter()
        } else {
            schedule
        }
    }
}

impl StepConfig {
    /// A step with defaults for everything but provider, model and attempts.
    pub fn new(provider: impl Into<String>, model: impl Into<String>, attempts: u32) -> Self {
        Self {
            provider: provider.into(),
            model: Some(model.into()),
            attempts,
            backoff: BackoffConfig::default(),
            retry_on: default_retry_on(),
            max_tokens: default_max_tokens(),
            temperature: None,
            timeout: default_timeout(),
        }
    }

    pub fn retry_on(mut self, kinds: impl Into<Vec<ErrorKind>>) -> Self {
        self.retry_on = kinds.into();
        self
    }

    fn predicate(&self) -> AdvancePredicate<ProviderError> {
        if self.retry_on.is_empty() {
            AdvancePredicate::never()
        } else {
            AdvancePredicate::on_kinds(&self.retry_on)
        }
    }

    fn completion(&self, model: String) -> CompletionConfig {
        CompletionConfig {
            model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

impl Default for PlanConfig {
    /// gpt-4o retried on network errors, then Claude retried on outages.
    fn default() -> Self {
        Self {
            steps: vec![
                StepConfig::new("openai", "gpt-4o", 3).retry_on([ErrorKind::Transient]),
                StepConfig::new("anthropic", "claude-sonnet-4-20250514", 2)
                    .retry_on([ErrorKind::ProviderUnavailable]),
            ],
        }
    }
}

impl PlanConfig {
    /// Parse a plan from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PlanConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a plan from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PlanConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a plan file, choosing the format by extension (`.json`, else YAML).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Check structural constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::ValidationError(
                "plan must define at least one step".to_string(),
            ));
        }

        for (index, step) in self.steps.iter().enumerate() {
            if step.provider.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "step {index}: provider is required"
                )));
            }
            if step.attempts == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "step {index}: attempts must be at least 1"
                )));
            }
            if step.model.as_deref().is_some_and(|m| m.trim().is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "step {index}: model must not be empty"
                )));
            }
            step.backoff
                .schedule()
                .validate()
                .map_err(|reason| ConfigError::ValidationError(format!("step {index}: {reason}")))?;
        }

        Ok(())
    }

    /// Build a runnable plan.
    ///
    /// `settings` holds per-provider settings keyed by provider type, e.g.
    /// `{"openai": {"api_key": "..."}}`; missing entries fall back to the
    /// environment. Steps sharing a provider type share one client.
    pub fn build(
        &self,
        registry: &ProviderRegistry,
        settings: &JsonValue,
    ) -> Result<Plan<ProviderTarget, ProviderError>, ConfigError> {
        self.validate()?;

        let mut clients: BTreeMap<&str, Arc<dyn LlmProvider>> = BTreeMap::new();
        let mut steps = Vec::with_capacity(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let provider_type = step.provider.as_str();
            let provider = match clients.get(provider_type) {
                Some(client) => Arc::clone(client),
                None => {
                    let client = registry
                        .create(provider_type, &settings[provider_type])
                        .map_err(|source| ConfigError::ProviderError {
                            step: index,
                            source,
                        })?;
                    clients.insert(provider_type, Arc::clone(&client));
                    client
                }
            };

            let model = match &step.model {
                Some(model) => model.clone(),
                None => registry
                    .default_model(provider_type)
                    .unwrap_or_default()
                    .to_string(),
            };

            let target = ProviderTarget::new(provider, step.completion(model));
            tracing::debug!(
                step = index,
                configuration = %target,
                attempts = step.attempts,
                retry_on = ?step.retry_on,
                "Configured plan step"
            );

            steps.push(
                Step::new(target)
                    .attempts(step.attempts)
                    .schedule(step.backoff.schedule())
                    .retry_while(step.predicate()),
            );
        }

        Ok(Plan::new(steps)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::Classify;

    const PLAN_YAML: &str = r#"
steps:
  - provider: openai
    model: gpt-4o
    attempts: 3
    backoff:
      base: 100ms
      factor: 1.5
    retry_on: [transient]
  - provider: anthropic
    attempts: 2
    timeout: 45s
    retry_on: [provider_unavailable]
"#;

    fn settings() -> JsonValue {
        serde_json::json!({
            "openai": { "api_key": "sk-test-openai" },
            "anthropic": { "api_key": "sk-ant-test" }
        })
    }

    #[test]
    fn test_parse_yaml_plan() {
        let config = PlanConfig::from_yaml(PLAN_YAML).unwrap();

        assert_eq!(config.steps.len(), 2);
        let first = &config.steps[0];
        assert_eq!(first.provider, "openai");
        assert_eq!(first.model.as_deref(), Some("gpt-4o"));
        assert_eq!(first.attempts, 3);
        assert_eq!(first.backoff.base, Duration::from_millis(100));
        assert_eq!(first.backoff.max_delay, DEFAULT_MAX_DELAY);

        let second = &config.steps[1];
        assert!(second.model.is_none());
        assert_eq!(second.timeout, Duration::from_secs(45));
        assert_eq!(second.retry_on, vec![ErrorKind::ProviderUnavailable]);
    }

    #[test]
    fn test_parse_json_plan() {
        let json = r#"{"steps": [{"provider": "openai", "model": "gpt-4o-mini", "retry_on": []}]}"#;
        let config = PlanConfig::from_json(json).unwrap();

        assert_eq!(config.steps[0].attempts, 1);
        assert!(config.steps[0].retry_on.is_empty());
    }

    #[test]
    fn test_default_matches_dad_joke_plan() {
        let config = PlanConfig::default();

        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.steps[0].provider, "openai");
        assert_eq!(config.steps[0].attempts, 3);
        assert_eq!(config.steps[0].retry_on, vec![ErrorKind::Transient]);
        assert_eq!(
            config.steps[1].model.as_deref(),
            Some("claude-sonnet-4-20250514")
        );
        assert_eq!(config.steps[1].attempts, 2);
        assert_eq!(config.steps[1].retry_on, vec![ErrorKind::ProviderUnavailable]);
        assert_eq!(config.steps[1].backoff, BackoffConfig::default());
    }

    #[test]
    fn test_yaml_roundtrip_keeps_humantime_durations() {
        let yaml = serde_yaml::to_string(&PlanConfig::default()).unwrap();
        assert!(yaml.contains("100ms"), "{yaml}");
        assert_eq!(PlanConfig::from_yaml(&yaml).unwrap(), PlanConfig::default());
    }

    #[test]
    fn test_empty_plan_rejected() {
        let err = PlanConfig::from_yaml("steps: []").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let yaml = "steps:\n  - provider: openai\n    attempts: 0\n";
        let err = PlanConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("attempts must be at least 1"));
    }

    #[test]
    fn test_shrinking_backoff_rejected() {
        let yaml = "steps:\n  - provider: openai\n    backoff: { factor: 0.5 }\n";
        assert!(PlanConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_bad_duration_is_a_parse_error() {
        let yaml = "steps:\n  - provider: openai\n    timeout: soon\n";
        assert!(matches!(
            PlanConfig::from_yaml(yaml).unwrap_err(),
            ConfigError::YamlError(_)
        ));
    }

    #[test]
    fn test_build_resolves_targets() {
        let config = PlanConfig::from_yaml(PLAN_YAML).unwrap();
        let plan = config
            .build(&ProviderRegistry::with_defaults(), &settings())
            .unwrap();

        assert_eq!(plan.len(), 2);
        let first = plan.step(0).unwrap();
        assert_eq!(first.configuration().to_string(), "openai/gpt-4o");
        assert_eq!(first.max_attempts(), 3);
        assert!(first
            .predicate()
            .accepts(&ProviderError::HttpError("reset".into())));
        assert!(!first.predicate().accepts(&ProviderError::AuthError));

        let second = plan.step(1).unwrap();
        assert_eq!(
            second.configuration().to_string(),
            "anthropic/claude-sonnet-4-20250514"
        );
        assert_eq!(
            second.configuration().completion().timeout,
            Duration::from_secs(45)
        );
        assert!(second.predicate().accepts(&ProviderError::AuthError));
    }

    #[test]
    fn test_empty_retry_on_never_retries() {
        let step = StepConfig::new("openai", "gpt-4o", 3).retry_on(Vec::new());
        let predicate = step.predicate();
        for error in [
            ProviderError::Timeout(Duration::from_secs(1)),
            ProviderError::AuthError,
        ] {
            assert!(!predicate.accepts(&error), "{:?}", error.kind());
        }
    }

    #[test]
    fn test_build_unknown_provider_names_the_step() {
        let config = PlanConfig {
            steps: vec![
                StepConfig::new("openai", "gpt-4o", 1),
                StepConfig::new("carrier-pigeon", "coo-1", 1),
            ],
        };

        let err = config
            .build(&ProviderRegistry::with_defaults(), &settings())
            .unwrap_err();

        match err {
            ConfigError::ProviderError { step, source } => {
                assert_eq!(step, 1);
                assert!(matches!(source, ProviderError::NotConfigured(_)));
            }
            other => panic!("expected provider error, got {other}"),
        }
    }

    #[test]
    fn test_provider_error_message_not_repeated_by_source() {
        let err = ConfigError::ProviderError {
            step: 0,
            source: ProviderError::AuthError,
        };

        assert_eq!(err.to_string(), "Provider for step 0 unavailable");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Authentication failed");
        assert!(source.source().is_none());
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("plan.yaml");
        fs::write(&yaml_path, PLAN_YAML).unwrap();
        assert_eq!(PlanConfig::from_file(&yaml_path).unwrap().steps.len(), 2);

        let json_path = dir.path().join("plan.json");
        fs::write(&json_path, r#"{"steps": [{"provider": "anthropic"}]}"#).unwrap();
        assert_eq!(PlanConfig::from_file(&json_path).unwrap().steps.len(), 1);
    }
}
