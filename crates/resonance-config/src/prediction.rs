use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prediction pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictionConfig {
    /// Capabilities requested from the model for every task
    #[serde(default = "Capability::all")]
    pub capabilities: Vec<Capability>,
    /// Version tag attached to every prediction, the model id when unset
    #[serde(default)]
    pub model_version: Option<String>,
    /// Audio formats accepted for analysis
    #[serde(default = "AudioFormat::all")]
    pub supported_formats: Vec<AudioFormat>,
    /// Tasks of one batch processed at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound for a whole `/predict` call
    #[serde(default = "default_batch_timeout", deserialize_with = "crate::duration::deserialize")]
    pub batch_timeout: Duration,
    /// Score used when the model reports no confidence
    #[serde(default = "default_score")]
    pub default_score: f64,
    /// Attach language/gender/emotion choices to each transcript region
    #[serde(default = "default_per_region")]
    pub per_region_attributes: bool,
    /// Language the summary is written in, the spoken language when unset
    #[serde(default)]
    pub summary_language: Option<String>,
    /// Label configuration field names
    #[serde(default)]
    pub fields: FieldNames,
    /// Content used when genuine analysis is impossible
    #[serde(default)]
    pub fallback: FallbackTemplate,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            capabilities: Capability::all(),
            model_version: None,
            supported_formats: AudioFormat::all(),
            concurrency: default_concurrency(),
            batch_timeout: default_batch_timeout(),
            default_score: default_score(),
            per_region_attributes: default_per_region(),
            summary_language: None,
            fields: FieldNames::default(),
            fallback: FallbackTemplate::default(),
        }
    }
}

/// One independently requestable analysis dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Transcription,
    Diarization,
    Language,
    Emotion,
    Gender,
    Summary,
    Entities,
}

impl Capability {
    /// Every capability, in pipeline order
    pub fn all() -> Vec<Self> {
        vec![
            Self::Transcription,
            Self::Diarization,
            Self::Language,
            Self::Emotion,
            Self::Gender,
            Self::Summary,
            Self::Entities,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Diarization => "diarization",
            Self::Language => "language",
            Self::Emotion => "emotion",
            Self::Gender => "gender",
            Self::Summary => "summary",
            Self::Entities => "entities",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio container formats the model accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    M4a,
    Flac,
    Ogg,
    Aac,
}

impl AudioFormat {
    pub fn all() -> Vec<Self> {
        vec![Self::Mp3, Self::Wav, Self::M4a, Self::Flac, Self::Ogg, Self::Aac]
    }

    /// Match a file extension, ignoring case and a leading dot
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp3" | "mpeg" | "mpga" => Some(Self::Mp3),
            "wav" | "wave" => Some(Self::Wav),
            "m4a" | "mp4" => Some(Self::M4a),
            "flac" => Some(Self::Flac),
            "ogg" | "oga" | "opus" => Some(Self::Ogg),
            "aac" => Some(Self::Aac),
            _ => None,
        }
    }

    /// Match a `Content-Type` value, ignoring parameters
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some(Self::Wav),
            "audio/mp4" | "audio/x-m4a" | "audio/m4a" => Some(Self::M4a),
            "audio/flac" | "audio/x-flac" => Some(Self::Flac),
            "audio/ogg" | "application/ogg" => Some(Self::Ogg),
            "audio/aac" | "audio/x-aac" => Some(Self::Aac),
            _ => None,
        }
    }

    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::M4a => "m4a",
            Self::Flac => "flac",
            Self::Ogg => "ogg",
            Self::Aac => "aac",
        }
    }

    /// MIME type sent to the model alongside the audio bytes
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::M4a => "audio/mp4",
            Self::Flac => "audio/flac",
            Self::Ogg => "audio/ogg",
            Self::Aac => "audio/aac",
        }
    }
}

/// `from_name`/`to_name` values of the platform's label configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FieldNames {
    pub speaker: String,
    pub transcription: String,
    pub language: String,
    pub gender: String,
    pub emotion: String,
    pub summary: String,
    pub entities: String,
    /// Name of the audio object every result points at
    pub to_name: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            speaker: "speaker_labels".to_owned(),
            transcription: "transcription".to_owned(),
            language: "language".to_owned(),
            gender: "gender".to_owned(),
            emotion: "emotion".to_owned(),
            summary: "summary".to_owned(),
            entities: "entities".to_owned(),
            to_name: "audio".to_owned(),
        }
    }
}

/// Content of a fallback analysis
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FallbackTemplate {
    /// Summary text stating the audio could not be analyzed
    pub summary: String,
    /// Text of a single placeholder segment, no segments when unset
    pub transcript: Option<String>,
    /// Score reported for fallback predictions
    pub score: f64,
    /// Choice emitted when the language is unknown
    pub language: String,
    /// Choice emitted when the emotion is unknown
    pub emotion: String,
    /// Choice emitted when the gender is unknown
    pub gender: String,
}

impl Default for FallbackTemplate {
    fn default() -> Self {
        Self {
            summary: "The audio content could not be analyzed.".to_owned(),
            transcript: None,
            score: 0.0,
            language: "unknown".to_owned(),
            emotion: "unknown".to_owned(),
            gender: "unknown".to_owned(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_concurrency() -> usize {
    4
}

#[allow(clippy::missing_const_for_fn)]
fn default_batch_timeout() -> Duration {
    Duration::from_secs(600)
}

#[allow(clippy::missing_const_for_fn)]
fn default_score() -> f64 {
    0.95
}

#[allow(clippy::missing_const_for_fn)]
fn default_per_region() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_match_extension_and_mime() {
        assert_eq!(AudioFormat::from_extension(".MP3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_extension("m4a"), Some(AudioFormat::M4a));
        assert_eq!(AudioFormat::from_extension("txt"), None);
        assert_eq!(AudioFormat::from_mime_type("audio/x-wav; charset=binary"), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::from_mime_type("text/html"), None);
    }

    #[test]
    fn fields_can_be_partially_overridden() {
        let config: PredictionConfig = toml::from_str("[fields]\nspeaker = \"speakers\"").unwrap();
        assert_eq!(config.fields.speaker, "speakers");
        assert_eq!(config.fields.transcription, "transcription");
        assert_eq!(config.capabilities, Capability::all());
    }

    #[test]
    fn fallback_choices_default_to_unknown() {
        let config: PredictionConfig = toml::from_str("[fallback]\ngender = \"Unspecified\"").unwrap();
        assert_eq!(config.fallback.language, "unknown");
        assert_eq!(config.fallback.emotion, "unknown");
        assert_eq!(config.fallback.gender, "Unspecified");
        assert!(config.fallback.transcript.is_none());
    }
}
