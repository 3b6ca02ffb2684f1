use std::path::Path;

use secrecy::ExposeSecret;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from raw TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing, or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or a limit is out of range
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_model_config()?;
        self.validate_prediction_config()?;
        self.validate_server_config()?;
        self.validate_telemetry_config()?;
        Ok(())
    }

    fn validate_model_config(&self) -> anyhow::Result<()> {
        let has_key = self
            .model
            .api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty());

        if !has_key {
            anyhow::bail!("model.api_key must be set");
        }

        if self.model.model.trim().is_empty() {
            anyhow::bail!("model.model must not be empty");
        }

        if self.model.retry.max_attempts == 0 {
            anyhow::bail!("model.retry.max_attempts must be greater than 0");
        }

        if self.model.retry.initial_backoff > self.model.retry.max_backoff {
            anyhow::bail!("model.retry.initial_backoff must not exceed model.retry.max_backoff");
        }

        Ok(())
    }

    fn validate_prediction_config(&self) -> anyhow::Result<()> {
        let prediction = &self.prediction;

        if prediction.capabilities.is_empty() {
            anyhow::bail!("prediction.capabilities must name at least one capability");
        }

        if prediction.supported_formats.is_empty() {
            anyhow::bail!("prediction.supported_formats must name at least one format");
        }

        if prediction.concurrency == 0 {
            anyhow::bail!("prediction.concurrency must be greater than 0");
        }

        if prediction.batch_timeout.is_zero() {
            anyhow::bail!("prediction.batch_timeout must be greater than 0");
        }

        for (name, score) in [
            ("prediction.default_score", prediction.default_score),
            ("prediction.fallback.score", prediction.fallback.score),
        ] {
            if !(0.0..=1.0).contains(&score) {
                anyhow::bail!("{name} must be between 0.0 and 1.0");
            }
        }

        let fallback = &prediction.fallback;
        for (name, choice) in [
            ("prediction.fallback.language", &fallback.language),
            ("prediction.fallback.emotion", &fallback.emotion),
            ("prediction.fallback.gender", &fallback.gender),
        ] {
            if choice.trim().is_empty() {
                anyhow::bail!("{name} must not be empty");
            }
        }

        Ok(())
    }

    fn validate_server_config(&self) -> anyhow::Result<()> {
        if self.server.health.enabled && !self.server.health.path.starts_with('/') {
            anyhow::bail!("server.health.path must start with '/'");
        }

        Ok(())
    }

    fn validate_telemetry_config(&self) -> anyhow::Result<()> {
        let Some(rate) = self
            .telemetry
            .as_ref()
            .and_then(|t| t.tracing.as_ref())
            .map(|t| t.sampling_rate)
        else {
            return Ok(());
        };

        if !(0.0..=1.0).contains(&rate) {
            anyhow::bail!("telemetry.tracing.sampling_rate must be between 0.0 and 1.0");
        }

        Ok(())
    }
}
