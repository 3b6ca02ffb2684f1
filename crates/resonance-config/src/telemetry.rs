pub mod exporters;
pub mod metrics;
pub mod tracing;

use std::collections::HashMap;

use serde::Deserialize;

use self::{exporters::ExporterConfig, metrics::MetricsConfig, tracing::TracingConfig};

/// Telemetry configuration
///
/// Logging to stdout is always on. Traces and metrics are exported over
/// OTLP only once an exporter is configured here.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name reported in resource metadata
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Additional resource attributes
    #[serde(default)]
    pub resource_attributes: HashMap<String, String>,
    /// Exporter shared by traces and metrics
    #[serde(default)]
    pub exporter: Option<ExporterConfig>,
    #[serde(default)]
    pub tracing: Option<TracingConfig>,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            resource_attributes: HashMap::new(),
            exporter: None,
            tracing: None,
            metrics: None,
        }
    }
}

impl TelemetryConfig {
    /// Whether any OTLP exporter is configured
    pub fn has_exporter(&self) -> bool {
        self.exporter.is_some()
            || self.tracing.as_ref().is_some_and(|t| t.exporter.is_some())
            || self.metrics.as_ref().is_some_and(|m| m.exporter.is_some())
    }

    /// Exporter used for traces, the shared one unless overridden
    pub fn trace_exporter(&self) -> Option<&ExporterConfig> {
        self.tracing
            .as_ref()
            .and_then(|t| t.exporter.as_ref())
            .or(self.exporter.as_ref())
    }

    /// Exporter used for metrics, the shared one unless overridden
    pub fn metrics_exporter(&self) -> Option<&ExporterConfig> {
        self.metrics
            .as_ref()
            .and_then(|m| m.exporter.as_ref())
            .or(self.exporter.as_ref())
    }
}

fn default_service_name() -> String {
    "resonance".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_exporter_overrides_shared_one() {
        let config: TelemetryConfig = toml::from_str(
            r#"
            [exporter]
            endpoint = "http://collector:4317"

            [tracing.exporter]
            endpoint = "http://traces:4318"
            protocol = "http_proto"
            "#,
        )
        .unwrap();

        assert!(config.has_exporter());
        assert_eq!(config.trace_exporter().unwrap().endpoint.as_str(), "http://traces:4318/");
        assert_eq!(config.metrics_exporter().unwrap().endpoint.as_str(), "http://collector:4317/");
        assert_eq!(config.service_name, "resonance");
    }

    #[test]
    fn no_exporter_by_default() {
        assert!(!TelemetryConfig::default().has_exporter());
    }
}
