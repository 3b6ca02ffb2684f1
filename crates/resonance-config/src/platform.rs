use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Annotation platform configuration
///
/// Used to resolve platform-internal audio paths and to authenticate
/// against the platform's file-serving endpoint.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformConfig {
    /// Platform base URL (e.g. `http://localhost:8080`)
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// Access token or JWT refresh token
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Platform media directory, when the backend shares a filesystem with it
    #[serde(default)]
    pub media_root: Option<PathBuf>,
    /// Directories searched for relative audio references
    #[serde(default)]
    pub local_roots: Vec<PathBuf>,
    /// Directory for downloaded audio, system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
    /// Timeout for a single audio download
    #[serde(default = "default_download_timeout", deserialize_with = "crate::duration::deserialize")]
    pub download_timeout: Duration,
    /// Timeout for exchanging a refresh token
    #[serde(default = "default_token_timeout", deserialize_with = "crate::duration::deserialize")]
    pub token_refresh_timeout: Duration,
    /// Largest audio file accepted from a download
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            media_root: None,
            local_roots: Vec::new(),
            temp_dir: None,
            download_timeout: default_download_timeout(),
            token_refresh_timeout: default_token_timeout(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

impl PlatformConfig {
    /// Directory where downloaded artifacts are created
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

fn default_base_url() -> Url {
    Url::parse("http://localhost:8080").expect("valid default URL")
}

#[allow(clippy::missing_const_for_fn)]
fn default_download_timeout() -> Duration {
    Duration::from_secs(60)
}

#[allow(clippy::missing_const_for_fn)]
fn default_token_timeout() -> Duration {
    Duration::from_secs(10)
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_download_bytes() -> u64 {
    200 << 20
}
