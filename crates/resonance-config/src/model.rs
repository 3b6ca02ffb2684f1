use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// External audio model configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// Provider protocol
    #[serde(rename = "type", default)]
    pub provider_type: ModelProviderType,
    /// API key provisioned for the provider
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Model identifier (e.g. `gemini-2.0-flash`)
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum output tokens per call
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Timeout for a single model call
    #[serde(default = "default_request_timeout", deserialize_with = "crate::duration::deserialize")]
    pub request_timeout: Duration,
    /// Retry policy for transient failures
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider_type: ModelProviderType::default(),
            api_key: None,
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            request_timeout: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Supported model providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelProviderType {
    /// Google Generative Language API (Gemini)
    #[default]
    Google,
}

/// Retry policy for a single model invocation
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(default = "default_initial_backoff", deserialize_with = "crate::duration::deserialize")]
    pub initial_backoff: Duration,
    /// Upper bound for the exponential delay
    #[serde(default = "default_max_backoff", deserialize_with = "crate::duration::deserialize")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// Doubles from `initial_backoff` and never exceeds `max_backoff`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }
}

fn default_model() -> String {
    "gemini-2.0-flash".to_owned()
}

#[allow(clippy::missing_const_for_fn)]
fn default_temperature() -> f64 {
    0.1
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_output_tokens() -> u32 {
    16_384
}

#[allow(clippy::missing_const_for_fn)]
fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_attempts() -> u32 {
    3
}

#[allow(clippy::missing_const_for_fn)]
fn default_initial_backoff() -> Duration {
    Duration::from_millis(500)
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_backoff() -> Duration {
    Duration::from_secs(8)
}
