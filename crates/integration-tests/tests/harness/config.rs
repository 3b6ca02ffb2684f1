//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use resonance_config::{Capability, Config, RetryConfig};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder whose model points at `model_base_url`
    ///
    /// Retries back off for milliseconds so failure tests stay fast.
    pub fn new(model_base_url: &str) -> Self {
        let mut config = Config::default();

        config.server.listen_address = Some(SocketAddr::from(([127, 0, 0, 1], 0)));
        config.model.api_key = Some(SecretString::from("test-key"));
        config.model.base_url = Some(model_base_url.parse().expect("valid URL"));
        config.model.request_timeout = Duration::from_secs(5);
        config.model.retry = RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
        };
        config.platform.download_timeout = Duration::from_secs(5);

        Self { config }
    }

    /// Point audio resolution at a platform
    pub fn with_platform(mut self, base_url: &str, api_key: Option<&str>) -> Self {
        self.config.platform.base_url = base_url.parse().expect("valid URL");
        self.config.platform.api_key = api_key.map(SecretString::from);
        self
    }

    /// Directory for downloaded audio
    pub fn with_temp_dir(mut self, dir: &Path) -> Self {
        self.config.platform.temp_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.config.platform.download_timeout = timeout;
        self
    }

    pub fn with_media_root(mut self, dir: &Path) -> Self {
        self.config.platform.media_root = Some(dir.to_path_buf());
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.config.prediction.capabilities = capabilities.to_vec();
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.model.retry.max_attempts = max_attempts;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.prediction.concurrency = concurrency;
        self
    }

    pub fn with_model_version(mut self, version: &str) -> Self {
        self.config.prediction.model_version = Some(version.to_owned());
        self
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.prediction.batch_timeout = timeout;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
