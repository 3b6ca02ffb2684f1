use std::time::Instant;

use resonance_config::RetryConfig;
use resonance_telemetry::KeyValue;
use resonance_telemetry::metrics::{PipelineMetrics, record_duration};

use crate::audio::AudioPayload;
use crate::capability::Call;
use crate::error::ModelError;
use crate::provider::AudioModel;

/// How one model invocation ended
#[derive(Debug)]
pub(crate) enum Outcome {
    Succeeded(String),
    /// Refused, non-transient, or out of attempts; the caller substitutes the fallback
    FallbackUsed(ModelError),
    /// No attempt reached the endpoint
    Unreachable(ModelError),
}

#[derive(Debug)]
pub(crate) struct Invocation {
    pub outcome: Outcome,
    pub attempts: u32,
}

enum State {
    Attempting { attempt: u32, reached: bool },
    Retrying { attempt: u32, error: ModelError, reached: bool },
    Done(Outcome),
}

/// Calls the model for one capability, retrying transient failures
pub(crate) struct Invoker<'a> {
    model: &'a dyn AudioModel,
    retry: &'a RetryConfig,
}

impl<'a> Invoker<'a> {
    pub fn new(model: &'a dyn AudioModel, retry: &'a RetryConfig) -> Self {
        Self { model, retry }
    }

    pub async fn invoke(&self, call: Call, audio: &AudioPayload, instruction: &str) -> Invocation {
        let metrics = PipelineMetrics::global();
        let max_attempts = self.retry.max_attempts.max(1);

        let mut attempts = 0;
        let mut state = State::Attempting { attempt: 1, reached: false };

        loop {
            state = match state {
                State::Attempting { attempt, reached } => {
                    attempts = attempt;

                    let start = Instant::now();
                    let result = self.model.generate(audio, instruction).await;

                    let label = result.as_ref().map_or_else(ModelError::kind, |_| "success");
                    let attributes = [KeyValue::new("capability", call.as_str()), KeyValue::new("outcome", label)];
                    record_duration(&metrics.model_duration, start, &attributes);
                    metrics.model_requests.add(1, &attributes);

                    match result {
                        Ok(text) => {
                            tracing::debug!(capability = call.as_str(), attempt, "model call succeeded");
                            State::Done(Outcome::Succeeded(text))
                        }
                        Err(error) => {
                            let reached = reached || !error.is_unreachable();

                            if !error.is_transient() {
                                tracing::warn!(
                                    capability = call.as_str(),
                                    attempt,
                                    error = %error,
                                    "model call failed, not retrying"
                                );
                                State::Done(Outcome::FallbackUsed(error))
                            } else if attempt >= max_attempts {
                                tracing::warn!(
                                    capability = call.as_str(),
                                    attempts = attempt,
                                    error = %error,
                                    "model call attempts exhausted"
                                );

                                if reached {
                                    State::Done(Outcome::FallbackUsed(error))
                                } else {
                                    State::Done(Outcome::Unreachable(error))
                                }
                            } else {
                                State::Retrying { attempt, error, reached }
                            }
                        }
                    }
                }
                State::Retrying { attempt, error, reached } => {
                    let delay = self.retry.backoff_after(attempt);

                    tracing::info!(
                        capability = call.as_str(),
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "retrying model call"
                    );

                    tokio::time::sleep(delay).await;
                    State::Attempting {
                        attempt: attempt + 1,
                        reached,
                    }
                }
                State::Done(outcome) => return Invocation { outcome, attempts },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use resonance_config::AudioFormat;

    use super::*;

    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: AtomicU32,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl AudioModel for ScriptedModel {
        async fn generate(&self, _audio: &AudioPayload, _instruction: &str) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ModelError::EmptyCandidate))
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
        }
    }

    fn audio() -> AudioPayload {
        AudioPayload::new(b"ID3", AudioFormat::Mp3)
    }

    #[tokio::test(start_paused = true)]
    async fn third_attempt_is_used_after_two_transient_failures() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::RateLimited),
            Err(ModelError::Server { status: 503, message: "overloaded".into() }),
            Ok("{}".into()),
        ]);
        let retry = retry(3);

        let started = tokio::time::Instant::now();
        let invocation = Invoker::new(&model, &retry).invoke(Call::Summary, &audio(), "x").await;

        assert!(matches!(invocation.outcome, Outcome::Succeeded(ref text) if text == "{}"));
        assert_eq!(invocation.attempts, 3);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        // 100ms then 200ms of backoff
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn non_transient_failure_is_not_retried() {
        let model = ScriptedModel::new(vec![Err(ModelError::Blocked("SAFETY".into())), Ok("{}".into())]);
        let retry = retry(3);

        let invocation = Invoker::new(&model, &retry).invoke(Call::Emotion, &audio(), "x").await;

        assert!(matches!(invocation.outcome, Outcome::FallbackUsed(ModelError::Blocked(_))));
        assert_eq!(invocation.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_transient_failures_fall_back() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Unreachable("refused".into())),
            Err(ModelError::Timeout),
            Err(ModelError::Unreachable("refused".into())),
        ]);
        let retry = retry(3);

        let invocation = Invoker::new(&model, &retry).invoke(Call::Transcript, &audio(), "x").await;

        assert!(matches!(invocation.outcome, Outcome::FallbackUsed(_)));
        assert_eq!(invocation.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn never_reaching_the_endpoint_is_unreachable() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Unreachable("refused".into())),
            Err(ModelError::Unreachable("refused".into())),
        ]);
        let retry = retry(2);

        let invocation = Invoker::new(&model, &retry).invoke(Call::Language, &audio(), "x").await;

        assert!(matches!(invocation.outcome, Outcome::Unreachable(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }
}
