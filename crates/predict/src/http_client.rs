use std::sync::OnceLock;
use std::time::Duration;

use reqwest::Client;

/// Process-wide HTTP client for outbound calls
///
/// Per-request timeouts are set by callers.
pub(crate) fn http_client() -> Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();

    CLIENT
        .get_or_init(|| {
            Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .pool_idle_timeout(Duration::from_secs(90))
                .user_agent(concat!("resonance/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|e| {
                    tracing::warn!("failed to build tuned HTTP client, using defaults: {e}");
                    Client::new()
                })
        })
        .clone()
}
