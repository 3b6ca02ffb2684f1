use std::fmt::Write;

use resonance_config::Capability;

use crate::labels::{Emotion, Language};

/// One model call per task; diarization rides on the transcript call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    Transcript,
    Language,
    Emotion,
    Gender,
    Summary,
    Entities,
}

impl Call {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::Language => "language",
            Self::Emotion => "emotion",
            Self::Gender => "gender",
            Self::Summary => "summary",
            Self::Entities => "entities",
        }
    }
}

/// Time range a segment request is limited to, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Window {
    pub start: f64,
    pub end: f64,
}

/// Model calls and instructions derived from the requested capabilities
#[derive(Debug, Clone)]
pub(crate) struct AnalysisPlan {
    capabilities: Vec<Capability>,
    per_region_attributes: bool,
    summary_language: Option<String>,
    window: Option<Window>,
}

const TRANSCRIPT_SHAPE: &str = r#"{"segments":[{"start":0.0,"end":4.2,"speaker":"Speaker 1","text":"...","language":"English","gender":"Female","emotion":"Neutral","confidence":0.9}]}"#;
const LANGUAGE_SHAPE: &str = r#"{"language":"English","confidence":0.9}"#;
const EMOTION_SHAPE: &str = r#"{"emotion":"neutral","confidence":0.9}"#;
const GENDER_SHAPE: &str = r#"{"gender":"Female","confidence":0.9}"#;
const SUMMARY_SHAPE: &str = r#"{"summary":"..."}"#;
const ENTITIES_SHAPE: &str = r#"{"entities":[{"text":"Tashkent","label":"LOCATION"}]}"#;

impl AnalysisPlan {
    pub fn new(capabilities: &[Capability], per_region_attributes: bool, summary_language: Option<String>) -> Self {
        Self {
            capabilities: capabilities.to_vec(),
            per_region_attributes,
            summary_language,
            window: None,
        }
    }

    /// Restrict the analysis to part of the audio
    #[must_use]
    pub const fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn transcribes(&self) -> bool {
        self.has(Capability::Transcription)
    }

    pub fn diarizes(&self) -> bool {
        self.has(Capability::Diarization)
    }

    pub const fn per_region_attributes(&self) -> bool {
        self.per_region_attributes
    }

    /// Calls to make, in order
    pub fn calls(&self) -> Vec<Call> {
        let mut calls = Vec::new();

        if self.transcribes() || self.diarizes() {
            calls.push(Call::Transcript);
        }

        for (capability, call) in [
            (Capability::Language, Call::Language),
            (Capability::Emotion, Call::Emotion),
            (Capability::Gender, Call::Gender),
            (Capability::Summary, Call::Summary),
            (Capability::Entities, Call::Entities),
        ] {
            if self.has(capability) {
                calls.push(call);
            }
        }

        calls
    }

    /// Instruction sent alongside the audio for `call`
    pub fn instruction(&self, call: Call) -> String {
        let mut text = String::from("You are an expert audio analyst. ");

        match call {
            Call::Transcript => self.transcript_instruction(&mut text),
            Call::Language => {
                let names = join(Language::SUPPORTED.iter().map(|l| l.as_str()));
                let _ = write!(
                    text,
                    "Identify the primary spoken language. Choose one of: {names}, or Other. \
                     For mixed speech choose the language of most words."
                );
            }
            Call::Emotion => {
                let names = join(Emotion::SUPPORTED.iter().map(|e| e.as_str().to_ascii_lowercase()));
                let _ = write!(
                    text,
                    "Classify the dominant emotion of the speech among {{{names}}}, judging pitch, \
                     speaking rate, volume and voice quality."
                );
            }
            Call::Gender => text.push_str(
                "Identify the gender of the main speaker's voice: Male, Female, or Unknown when it is \
                 truly ambiguous or a child's voice.",
            ),
            Call::Summary => {
                let language = self
                    .summary_language
                    .as_deref()
                    .map_or_else(|| "the language that is spoken".to_owned(), str::to_owned);
                let _ = write!(
                    text,
                    "Summarize the recording in 4 to 8 sentences written in {language}: main topics, \
                     what each speaker said, key points and conclusions, tone, and any decisions."
                );
            }
            Call::Entities => text.push_str(
                "List the named entities mentioned: people, organizations, locations, dates and products. \
                 Use the spelling of the spoken language.",
            ),
        }

        if let Some(window) = self.window {
            let _ = write!(
                text,
                " Only consider the audio between {:.1}s and {:.1}s; timestamps stay relative to the \
                 start of the file.",
                window.start, window.end
            );
        }

        let shape = match call {
            Call::Transcript => TRANSCRIPT_SHAPE,
            Call::Language => LANGUAGE_SHAPE,
            Call::Emotion => EMOTION_SHAPE,
            Call::Gender => GENDER_SHAPE,
            Call::Summary => SUMMARY_SHAPE,
            Call::Entities => ENTITIES_SHAPE,
        };

        let _ = write!(text, "\n\nReply with JSON only, no commentary, in this shape:\n{shape}");
        text
    }

    fn transcript_instruction(&self, text: &mut String) {
        if self.transcribes() {
            text.push_str(
                "Transcribe this audio exactly as spoken, in the original language and its correct script, \
                 including hesitations, repetitions and false starts. ",
            );
        } else {
            text.push_str("Find the speaker turns in this audio; segment text may be left empty. ");
        }

        text.push_str(
            "Split the audio into consecutive segments of at most 30 seconds with start and end \
             in seconds at 0.1s precision.",
        );

        if self.diarizes() {
            text.push_str(
                " Identify every distinct speaker and label segments consistently as \"Speaker 1\", \
                 \"Speaker 2\" and so on, starting a new segment at every change of speaker.",
            );
        }

        if self.per_region_attributes {
            let mut attributes = Vec::new();

            if self.has(Capability::Language) {
                attributes.push("language (the language name)");
            }
            if self.has(Capability::Gender) {
                attributes.push("gender (Male, Female or Unknown)");
            }
            if self.has(Capability::Emotion) {
                attributes.push("emotion (the dominant emotion)");
            }

            if !attributes.is_empty() {
                let _ = write!(text, " For each segment also give {}.", attributes.join(", "));
            }
        }

        text.push_str(" Give each segment a confidence between 0 and 1.");
    }
}

fn join<S: AsRef<str>>(items: impl Iterator<Item = S>) -> String {
    items.fold(String::new(), |mut acc, item| {
        if !acc.is_empty() {
            acc.push_str(", ");
        }
        acc.push_str(item.as_ref());
        acc
    })
}
