//! API key handling for LLM providers.
//!
//! Keys are wrapped in [`SecretString`] the moment they are read, print as
//! `[REDACTED]`, and are only exposed when building the request header.
//!
//! ```ignore
//! let key = ApiCredential::resolve(&settings, "OPENAI_API_KEY", "OpenAI API key")?;
//! request.bearer_auth(key.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Settings key checked before the environment.
pub const API_KEY_SETTING: &str = "api_key";

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Provider settings passed in by the caller
    Config,
    /// Process environment (including a loaded `.env` file)
    Environment,
    /// Handed to a constructor directly
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A provider API key that never shows up in `Debug` or `Display` output.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Read the key from `env_var`. Unset and empty values are both missing.
    pub fn from_env(env_var: &str, name: &'static str) -> Result<Self, ProviderError> {
        non_empty_env(env_var)
            .map(|v| Self::new(v, CredentialSource::Environment, name))
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "{name} not set: configure the '{env_var}' environment variable"
                ))
            })
    }

    /// Read `api_key` from provider settings, falling back to `env_var`.
    pub fn resolve(
        settings: &JsonValue,
        env_var: &str,
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = setting(settings) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        Self::from_env(env_var, name).map_err(|_| {
            ProviderError::NotConfigured(format!(
                "{name} required: set '{API_KEY_SETTING}' in provider settings or the '{env_var}' environment variable"
            ))
        })
    }

    /// Whether [`resolve`](Self::resolve) would find a key, without loading it.
    pub fn is_available(settings: &JsonValue, env_var: &str) -> bool {
        setting(settings).is_some() || non_empty_env(env_var).is_some()
    }

    /// The raw key. Call only where the request header is set.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn setting(settings: &JsonValue) -> Option<&str> {
    settings[API_KEY_SETTING]
        .as_str()
        .filter(|value| !value.is_empty())
}

fn non_empty_env(env_var: &str) -> Option<String> {
    std::env::var(env_var).ok().filter(|value| !value.is_empty())
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
