use std::time::Instant;

use futures::{StreamExt, TryStreamExt};
use resonance_config::{Capability, Config, PredictionConfig, RetryConfig};
use resonance_core::HttpError;
use resonance_telemetry::KeyValue;
use resonance_telemetry::metrics::{PipelineMetrics, record_duration};
use serde_json::Value;
use tracing::Instrument;

use crate::assemble::Assembler;
use crate::audio::{AudioPayload, AudioResolver};
use crate::capability::{AnalysisPlan, Window};
use crate::error::{ModelError, PredictError, Result, TaskRef, ValidationError};
use crate::http_client::http_client;
use crate::invoker::{Invoker, Outcome};
use crate::labels::choice;
use crate::normalize::{NormalizedAnalysis, parse_reply};
use crate::provider::{self, AudioModel};
use crate::types::{
    InfoResponse, PredictRequest, PredictResponse, PredictionResult, SegmentRequest, SegmentResponse, SetupResponse,
};
use crate::validate::{self, Task};

/// Capabilities a segment request can ask for
const SEGMENT_CAPABILITIES: [Capability; 4] = [
    Capability::Transcription,
    Capability::Language,
    Capability::Gender,
    Capability::Emotion,
];

/// Runs the prediction pipeline for batches and single segments
pub struct Predictor {
    resolver: AudioResolver,
    model: Box<dyn AudioModel>,
    retry: RetryConfig,
    prediction: PredictionConfig,
    model_version: String,
}

impl Predictor {
    /// Predict every task of a batch, in input order
    pub(crate) async fn predict(&self, request: PredictRequest) -> Result<PredictResponse> {
        let tasks = validate::batch(request.tasks)?;
        let plan = self.plan();
        let limit = self.prediction.batch_timeout;
        let start = Instant::now();

        tracing::info!(tasks = tasks.len(), "prediction batch received");

        let work = futures::stream::iter(tasks.into_iter().enumerate())
            .map(|(position, raw)| self.run_task(&plan, position, raw))
            .buffered(self.prediction.concurrency.max(1))
            .try_collect::<Vec<_>>();

        let outcome = tokio::time::timeout(limit, work)
            .await
            .map_err(|_| PredictError::Timeout(limit))
            .and_then(|results| results);

        let label = match &outcome {
            Ok(_) => "success",
            Err(e) => e.error_type(),
        };
        record_duration(
            &PipelineMetrics::global().batch_duration,
            start,
            &[KeyValue::new("outcome", label.to_owned())],
        );

        let results = outcome?;
        tracing::info!(
            results = results.len(),
            elapsed_s = start.elapsed().as_secs_f64(),
            "prediction batch done"
        );

        Ok(PredictResponse { results })
    }

    /// Transcribe part of one recording
    pub(crate) async fn transcribe_segment(&self, request: SegmentRequest) -> Result<SegmentResponse> {
        let window = segment_window(&request)?;

        let capabilities: Vec<Capability> = SEGMENT_CAPABILITIES
            .into_iter()
            .filter(|capability| self.prediction.capabilities.contains(capability))
            .collect();
        let plan = AnalysisPlan::new(&capabilities, false, None).with_window(window);

        let span = tracing::info_span!(
            "segment",
            task_id = request.task_id,
            project_id = request.project_id,
            start = window.start,
            end = window.end
        );

        async {
            let artifact = self.resolver.resolve(&request.audio_url).await?;
            let loaded = artifact.load(&self.prediction.supported_formats).await?;
            drop(artifact);

            let analysis = match loaded {
                Ok(audio) => self
                    .analyze(&plan, &audio)
                    .await
                    .map_err(PredictError::UpstreamUnreachable)?,
                Err(unsupported) => {
                    tracing::warn!(reason = %unsupported, "segment audio cannot be analyzed");
                    self.fallback_analysis(&plan, "unsupported_audio")
                }
            };

            let first = analysis.segments.first();
            let transcription = analysis
                .segments
                .iter()
                .map(|segment| segment.text.as_str())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            let fallback = &self.prediction.fallback;

            Ok::<_, PredictError>(SegmentResponse {
                transcription,
                language: choice(first.and_then(|s| s.language).or(analysis.language), &fallback.language),
                gender: choice(first.and_then(|s| s.gender).or(analysis.gender), &fallback.gender),
                emotion: choice(first.and_then(|s| s.emotion).or(analysis.emotion), &fallback.emotion),
                confidence: analysis.score(self.prediction.default_score, self.prediction.fallback.score),
            })
        }
        .instrument(span)
        .await
    }

    pub(crate) fn setup(&self) -> SetupResponse {
        SetupResponse {
            model_version: self.model_version.clone(),
            status: "ready",
            capabilities: self.prediction.capabilities.clone(),
            supported_formats: self.prediction.supported_formats.clone(),
        }
    }

    pub(crate) fn info(&self) -> InfoResponse {
        InfoResponse {
            model_class: "ResonanceAudioBackend",
            status: "UP",
            version: env!("CARGO_PKG_VERSION"),
            model_version: self.model_version.clone(),
            capabilities: self.prediction.capabilities.clone(),
        }
    }

    fn plan(&self) -> AnalysisPlan {
        AnalysisPlan::new(
            &self.prediction.capabilities,
            self.prediction.per_region_attributes,
            self.prediction.summary_language.clone(),
        )
    }

    fn assembler<'a>(&'a self, plan: &'a AnalysisPlan) -> Assembler<'a> {
        Assembler {
            fields: &self.prediction.fields,
            plan,
            model_version: &self.model_version,
            default_score: self.prediction.default_score,
            fallback: &self.prediction.fallback,
        }
    }

    /// One task through validation, audio, model and assembly
    ///
    /// Only an unreachable model endpoint fails the batch; every other
    /// problem becomes this task's result.
    async fn run_task(&self, plan: &AnalysisPlan, position: usize, raw: Value) -> Result<PredictionResult> {
        let metrics = PipelineMetrics::global();

        let task = match validate::task(position, &raw) {
            Ok(task) => task,
            Err(error) => {
                tracing::warn!(position, error = %error, "invalid task");
                metrics.tasks.add(1, &[KeyValue::new("outcome", "invalid")]);
                return Ok(self.error_result(&error));
            }
        };

        let span = tracing::info_span!("task", task_id = task.id, position);
        let result = self.process(plan, &task).instrument(span).await;

        let outcome = match &result {
            Ok(prediction) if prediction.error.is_some() => "audio_error",
            Ok(_) => "success",
            Err(_) => "unreachable",
        };
        metrics.tasks.add(1, &[KeyValue::new("outcome", outcome)]);

        result
    }

    async fn process(&self, plan: &AnalysisPlan, task: &Task) -> Result<PredictionResult> {
        let start = Instant::now();
        let resolved = self.resolver.resolve(&task.audio_ref).await;

        let label = if resolved.is_ok() { "success" } else { "error" };
        record_duration(
            &PipelineMetrics::global().fetch_duration,
            start,
            &[KeyValue::new("outcome", label)],
        );

        let artifact = match resolved {
            Ok(artifact) => artifact,
            Err(error) => {
                tracing::warn!(error = %error, "audio unavailable, using fallback");
                return Ok(self.fallback_result(plan, task.id, &error));
            }
        };

        tracing::debug!(path = %artifact.path().display(), owned = artifact.is_owned(), "audio resolved");

        let loaded = match artifact.load(&self.prediction.supported_formats).await {
            Ok(loaded) => loaded,
            Err(error) => {
                tracing::warn!(error = %error, "audio unreadable, using fallback");
                return Ok(self.fallback_result(plan, task.id, &error));
            }
        };

        // the payload holds the bytes; the file is no longer needed
        drop(artifact);

        let analysis = match loaded {
            Ok(audio) => {
                tracing::debug!(format = audio.format.extension(), bytes = audio.size, "analyzing audio");
                self.analyze(plan, &audio)
                    .await
                    .map_err(PredictError::UpstreamUnreachable)?
            }
            Err(unsupported) => {
                tracing::warn!(reason = %unsupported, "audio cannot be analyzed, using fallback");
                self.fallback_analysis(plan, "unsupported_audio")
            }
        };

        Ok(self.assembler(plan).assemble(task.id, &analysis))
    }

    /// Run every planned call and merge the replies
    ///
    /// Returns the error when no attempt of a call reached the model.
    async fn analyze(&self, plan: &AnalysisPlan, audio: &AudioPayload) -> std::result::Result<NormalizedAnalysis, ModelError> {
        let invoker = Invoker::new(self.model.as_ref(), &self.retry);
        let fallbacks = &PipelineMetrics::global().fallbacks;
        let mut analysis = NormalizedAnalysis::default();

        for call in plan.calls() {
            let instruction = plan.instruction(call);
            let invocation = invoker.invoke(call, audio, &instruction).await;

            let attempts = invocation.attempts;

            match invocation.outcome {
                Outcome::Succeeded(text) => {
                    if let Err(error) = parse_reply(&text).and_then(|reply| analysis.apply(call, &reply)) {
                        tracing::warn!(capability = call.as_str(), error = %error, "model reply unusable, using fallback");
                        fallbacks.add(1, &[KeyValue::new("reason", "normalization")]);
                        analysis.apply_fallback(call, &self.prediction.fallback);
                    }
                }
                Outcome::FallbackUsed(error) => {
                    tracing::warn!(capability = call.as_str(), attempts, error = %error, "model call failed, using fallback");
                    fallbacks.add(1, &[KeyValue::new("reason", error.kind())]);
                    analysis.apply_fallback(call, &self.prediction.fallback);
                }
                Outcome::Unreachable(error) => return Err(error),
            }
        }

        analysis.finish(plan.diarizes());
        Ok(analysis)
    }

    fn fallback_analysis(&self, plan: &AnalysisPlan, reason: &'static str) -> NormalizedAnalysis {
        PipelineMetrics::global()
            .fallbacks
            .add(1, &[KeyValue::new("reason", reason)]);

        let mut analysis = NormalizedAnalysis::default();
        for call in plan.calls() {
            analysis.apply_fallback(call, &self.prediction.fallback);
        }
        analysis.finish(plan.diarizes());
        analysis
    }

    fn fallback_result(&self, plan: &AnalysisPlan, task_id: i64, error: &impl HttpError) -> PredictionResult {
        let analysis = self.fallback_analysis(plan, "audio_fetch");
        let mut result = self.assembler(plan).assemble(task_id, &analysis);
        result.error = Some(error.error_body());
        result
    }

    fn error_result(&self, error: &ValidationError) -> PredictionResult {
        PredictionResult {
            result: Vec::new(),
            score: 0.0,
            model_version: self.model_version.clone(),
            error: Some(error.error_body()),
        }
    }
}

fn segment_window(request: &SegmentRequest) -> Result<Window> {
    let mut problems = Vec::new();

    if request.audio_url.trim().is_empty() {
        problems.push("`audio_url` must not be empty".to_owned());
    }
    if !request.start_time.is_finite() || request.start_time < 0.0 {
        problems.push("`start_time` must be a non-negative number".to_owned());
    }
    if !request.end_time.is_finite() || request.end_time <= request.start_time {
        problems.push("`end_time` must be greater than `start_time`".to_owned());
    }

    if problems.is_empty() {
        Ok(Window {
            start: request.start_time,
            end: request.end_time,
        })
    } else {
        Err(ValidationError {
            task: request.task_id.map_or(TaskRef::Position(0), TaskRef::Id),
            problems,
        }
        .into())
    }
}

/// Builder for constructing the predictor from configuration
pub(crate) struct PredictorBuilder<'a> {
    config: &'a Config,
}

impl<'a> PredictorBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn build(self) -> anyhow::Result<Predictor> {
        let client = http_client();
        let model = provider::build(client.clone(), &self.config.model)?;

        let model_version = self
            .config
            .prediction
            .model_version
            .clone()
            .unwrap_or_else(|| model.model_id().to_owned());

        tracing::debug!(
            model = model.model_id(),
            %model_version,
            capabilities = ?self.config.prediction.capabilities,
            "predictor initialized"
        );

        Ok(Predictor {
            resolver: AudioResolver::new(client, &self.config.platform),
            model,
            retry: self.config.model.retry.clone(),
            prediction: self.config.prediction.clone(),
            model_version,
        })
    }
}
