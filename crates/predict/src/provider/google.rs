//! Gemini `generateContent` provider

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use resonance_config::ModelConfig;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::AudioModel;
use crate::audio::AudioPayload;
use crate::error::ModelError;
use crate::protocol::{
    GoogleContent, GoogleErrorResponse, GoogleGenerationConfig, GooglePart, GoogleRequest, GoogleResponse,
    GoogleSafetySetting, HARM_CATEGORIES,
};

/// Default Google Generative Language API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub(crate) struct GoogleProvider {
    client: Client,
    base_url: Url,
    model: String,
    api_key: SecretString,
    temperature: f64,
    max_output_tokens: u32,
    timeout: Duration,
}

impl GoogleProvider {
    pub fn new(client: Client, config: &ModelConfig) -> anyhow::Result<Self> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(DEFAULT_BASE_URL)?,
        };

        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("API key required for model provider"))?;

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            timeout: config.request_timeout,
        })
    }

    fn generate_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/models/{}:generateContent", self.model)
    }

    fn request(&self, audio: &AudioPayload, instruction: &str) -> GoogleRequest {
        GoogleRequest {
            contents: vec![GoogleContent {
                role: Some("user".to_owned()),
                parts: vec![
                    GooglePart::text(instruction),
                    GooglePart::inline(audio.format.mime_type(), audio.data.clone()),
                ],
            }],
            generation_config: Some(GoogleGenerationConfig {
                temperature: Some(self.temperature),
                max_output_tokens: Some(self.max_output_tokens),
                response_mime_type: Some("application/json".to_owned()),
            }),
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| GoogleSafetySetting {
                    category: (*category).to_owned(),
                    threshold: "BLOCK_NONE".to_owned(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl AudioModel for GoogleProvider {
    async fn generate(&self, audio: &AudioPayload, instruction: &str) -> Result<String, ModelError> {
        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .timeout(self.timeout)
            .json(&self.request(audio, instruction))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, reason) = error_details(body);

            tracing::warn!(model = %self.model, %status, reason = reason.as_deref(), "model returned error");

            return Err(classify_status(status, message));
        }

        let wire_response: GoogleResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        if let Some(reason) = wire_response.block_reason() {
            return Err(ModelError::Blocked(reason.to_owned()));
        }

        let text = wire_response.text();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyCandidate);
        }

        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Message and provider status of an error body, the raw body when it is not JSON
fn error_details(body: String) -> (String, Option<String>) {
    match serde_json::from_str::<GoogleErrorResponse>(&body) {
        Ok(response) => (response.error.message, response.error.status),
        Err(_) => (body, None),
    }
}

fn classify_transport(error: &reqwest::Error) -> ModelError {
    if error.is_timeout() {
        ModelError::Timeout
    } else if error.is_connect() {
        ModelError::Unreachable(error.to_string())
    } else {
        ModelError::Network(error.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> ModelError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ModelError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelError::Authentication(message),
        StatusCode::REQUEST_TIMEOUT => ModelError::Timeout,
        status if status.is_server_error() => ModelError::Server {
            status: status.as_u16(),
            message,
        },
        _ => ModelError::InvalidRequest(message),
    }
}
