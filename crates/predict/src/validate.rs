use serde_json::Value;

use crate::error::{PredictError, TaskRef, ValidationError};

/// A task that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub audio_ref: String,
}

/// Check the batch as a whole before any task runs
pub(crate) fn batch(tasks: Option<Vec<Value>>) -> Result<Vec<Value>, PredictError> {
    match tasks {
        None => Err(PredictError::InvalidBody("request must contain 'tasks'".to_owned())),
        Some(tasks) if tasks.is_empty() => Err(PredictError::InvalidBody("at least one task required".to_owned())),
        Some(tasks) => Ok(tasks),
    }
}

/// Validate one raw task at `position` in the batch
pub(crate) fn task(position: usize, raw: &Value) -> Result<Task, ValidationError> {
    let mut problems = Vec::new();

    let id = match raw.get("id") {
        None | Some(Value::Null) => {
            problems.push("missing `id`".to_owned());
            None
        }
        Some(value) => {
            let id = value.as_i64();
            if id.is_none() {
                problems.push("`id` must be an integer".to_owned());
            }
            id
        }
    };

    let audio = match raw.get("data").and_then(|data| data.get("audio")) {
        None | Some(Value::Null) => {
            problems.push("missing `data.audio`".to_owned());
            None
        }
        Some(Value::String(audio)) if audio.trim().is_empty() => {
            problems.push("`data.audio` must not be empty".to_owned());
            None
        }
        Some(Value::String(audio)) => Some(audio.trim().to_owned()),
        Some(_) => {
            problems.push("`data.audio` must be a string".to_owned());
            None
        }
    };

    match (id, audio) {
        (Some(id), Some(audio_ref)) => Ok(Task { id, audio_ref }),
        (id, _) => Err(ValidationError {
            task: id.map_or(TaskRef::Position(position), TaskRef::Id),
            problems,
        }),
    }
}
