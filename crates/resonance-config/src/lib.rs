#![allow(clippy::must_use_candidate)]

pub mod cors;
mod duration;
mod env;
pub mod health;
mod loader;
pub mod model;
pub mod platform;
pub mod prediction;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use cors::*;
pub use health::*;
pub use model::*;
pub use platform::*;
pub use prediction::*;
pub use server::*;
pub use telemetry::TelemetryConfig;

/// Top-level Resonance configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Inbound HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// External audio model configuration
    #[serde(default)]
    pub model: ModelConfig,
    /// Annotation platform configuration (file serving and credentials)
    #[serde(default)]
    pub platform: PlatformConfig,
    /// Prediction pipeline configuration
    #[serde(default)]
    pub prediction: PredictionConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
