pub(crate) mod google;

use async_trait::async_trait;
use reqwest::Client;
use resonance_config::{ModelConfig, ModelProviderType};

use crate::audio::AudioPayload;
use crate::error::ModelError;

/// An external model that analyzes audio against a text instruction
#[async_trait]
pub(crate) trait AudioModel: Send + Sync {
    /// Submit audio plus instruction and return the model's raw text
    async fn generate(&self, audio: &AudioPayload, instruction: &str) -> Result<String, ModelError>;

    /// Model identifier, used as the default prediction version
    fn model_id(&self) -> &str;
}

/// Build the configured provider
pub(crate) fn build(client: Client, config: &ModelConfig) -> anyhow::Result<Box<dyn AudioModel>> {
    let provider: Box<dyn AudioModel> = match config.provider_type {
        ModelProviderType::Google => Box::new(google::GoogleProvider::new(client, config)?),
    };

    Ok(provider)
}
