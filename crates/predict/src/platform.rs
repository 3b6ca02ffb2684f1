use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

/// Tokens with this prefix are JWT refresh tokens
const JWT_PREFIX: &str = "eyJ";

/// Credentials for the annotation platform's file-serving endpoint
pub(crate) struct PlatformAuth {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    refresh_timeout: Duration,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: Option<String>,
}

impl PlatformAuth {
    pub fn new(client: Client, config: &resonance_config::PlatformConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            refresh_timeout: config.token_refresh_timeout,
        }
    }

    /// `Authorization` header value for a platform download
    ///
    /// Refresh tokens are exchanged for an access token on every call and
    /// sent as `Bearer`. If the exchange fails the refresh token itself is
    /// sent. Any other token uses the platform's `Token` scheme.
    pub async fn authorization(&self) -> Option<String> {
        let token = self.api_key.as_ref()?.expose_secret();
        let token = token.trim();

        if token.is_empty() {
            return None;
        }

        if !token.starts_with(JWT_PREFIX) {
            return Some(format!("Token {token}"));
        }

        match self.refresh(token).await {
            Ok(access) => Some(format!("Bearer {access}")),
            Err(e) => {
                tracing::warn!("could not refresh platform token, using it as is: {e}");
                Some(format!("Bearer {token}"))
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<String> {
        let url = format!("{}/api/token/refresh/", self.base_url.as_str().trim_end_matches('/'));

        let response = self
            .client
            .post(url)
            .timeout(self.refresh_timeout)
            .json(&serde_json::json!({ "refresh": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("refresh endpoint returned {status}");
        }

        let body: RefreshResponse = response.json().await?;

        body.access
            .filter(|access| !access.is_empty())
            .ok_or_else(|| anyhow::anyhow!("refresh response has no access token"))
    }
}
