//! Metric names and the pipeline's instruments

use std::sync::OnceLock;
use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram};

pub const PREDICT_BATCH_DURATION: &str = "predict.batch.duration";
pub const PREDICT_TASK_COUNT: &str = "predict.task.count";
pub const PREDICT_FALLBACK_COUNT: &str = "predict.fallback.count";
pub const AUDIO_FETCH_DURATION: &str = "audio.fetch.duration";
pub const MODEL_REQUEST_DURATION: &str = "model.request.duration";
pub const MODEL_REQUEST_COUNT: &str = "model.request.count";

/// Record the time elapsed since `start` on a histogram, in seconds
pub fn record_duration(histogram: &Histogram<f64>, start: Instant, attributes: &[KeyValue]) {
    histogram.record(start.elapsed().as_secs_f64(), attributes);
}

/// Instruments shared by every stage of the prediction pipeline
///
/// Backed by the global meter provider, so they are no-ops until
/// [`crate::init`] installs an exporter.
pub struct PipelineMetrics {
    pub batch_duration: Histogram<f64>,
    pub tasks: Counter<u64>,
    pub fallbacks: Counter<u64>,
    pub fetch_duration: Histogram<f64>,
    pub model_duration: Histogram<f64>,
    pub model_requests: Counter<u64>,
}

impl PipelineMetrics {
    /// Process-wide instruments
    pub fn global() -> &'static Self {
        static METRICS: OnceLock<PipelineMetrics> = OnceLock::new();

        METRICS.get_or_init(|| {
            let meter = global::meter("resonance");

            Self {
                batch_duration: meter
                    .f64_histogram(PREDICT_BATCH_DURATION)
                    .with_unit("s")
                    .with_description("Duration of a whole /predict call")
                    .build(),
                tasks: meter
                    .u64_counter(PREDICT_TASK_COUNT)
                    .with_description("Tasks processed, by outcome")
                    .build(),
                fallbacks: meter
                    .u64_counter(PREDICT_FALLBACK_COUNT)
                    .with_description("Fallback analyses produced, by reason")
                    .build(),
                fetch_duration: meter
                    .f64_histogram(AUDIO_FETCH_DURATION)
                    .with_unit("s")
                    .with_description("Time spent resolving audio references")
                    .build(),
                model_duration: meter
                    .f64_histogram(MODEL_REQUEST_DURATION)
                    .with_unit("s")
                    .with_description("Duration of a single model call")
                    .build(),
                model_requests: meter
                    .u64_counter(MODEL_REQUEST_COUNT)
                    .with_description("Model calls, by capability and outcome")
                    .build(),
            }
        })
    }
}
