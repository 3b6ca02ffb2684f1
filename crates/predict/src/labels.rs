//! Closed label sets for language, emotion and gender choices
//!
//! Model replies are matched case-insensitively, with common synonyms and
//! ISO 639 codes. Anything unmatched becomes `Other` (language, emotion);
//! missing values and unmatched genders become `Unknown`.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Russian,
    Uzbek,
    Arabic,
    Turkish,
    Kazakh,
    Tajik,
    Persian,
    German,
    French,
    Spanish,
    Chinese,
    Other,
    Unknown,
}

impl Language {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Russian => "Russian",
            Self::Uzbek => "Uzbek",
            Self::Arabic => "Arabic",
            Self::Turkish => "Turkish",
            Self::Kazakh => "Kazakh",
            Self::Tajik => "Tajik",
            Self::Persian => "Persian",
            Self::German => "German",
            Self::French => "French",
            Self::Spanish => "Spanish",
            Self::Chinese => "Chinese",
            Self::Other => "Other",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        let key = match_key(raw);

        match key.as_str() {
            "" | "unknown" | "none" | "n/a" | "undetermined" | "und" => Self::Unknown,
            "english" | "en" | "eng" => Self::English,
            "russian" | "ru" | "rus" => Self::Russian,
            "uzbek" | "uz" | "uzb" | "ozbek" => Self::Uzbek,
            "arabic" | "ar" | "ara" => Self::Arabic,
            "turkish" | "tr" | "tur" => Self::Turkish,
            "kazakh" | "kk" | "kaz" => Self::Kazakh,
            "tajik" | "tg" | "tgk" => Self::Tajik,
            "persian" | "farsi" | "fa" | "fas" => Self::Persian,
            "german" | "de" | "deu" => Self::German,
            "french" | "fr" | "fra" => Self::French,
            "spanish" | "es" | "spa" => Self::Spanish,
            "chinese" | "mandarin" | "zh" | "zho" => Self::Chinese,
            _ => Self::Other,
        }
    }

    /// Names listed in instructions
    pub const SUPPORTED: [Self; 12] = [
        Self::English,
        Self::Russian,
        Self::Uzbek,
        Self::Arabic,
        Self::Turkish,
        Self::Kazakh,
        Self::Tajik,
        Self::Persian,
        Self::German,
        Self::French,
        Self::Spanish,
        Self::Chinese,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Neutral,
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    Contempt,
    Confusion,
    Disappointment,
    Frustration,
    Other,
    Unknown,
}

impl Emotion {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "Neutral",
            Self::Joy => "Joy",
            Self::Sadness => "Sadness",
            Self::Anger => "Anger",
            Self::Fear => "Fear",
            Self::Surprise => "Surprise",
            Self::Disgust => "Disgust",
            Self::Contempt => "Contempt",
            Self::Confusion => "Confusion",
            Self::Disappointment => "Disappointment",
            Self::Frustration => "Frustration",
            Self::Other => "Other",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match match_key(raw).as_str() {
            "" | "unknown" | "none" | "n/a" => Self::Unknown,
            "neutral" | "calm" => Self::Neutral,
            "joy" | "happy" | "happiness" | "joyful" | "excited" | "excitement" => Self::Joy,
            "sadness" | "sad" => Self::Sadness,
            "anger" | "angry" => Self::Anger,
            "fear" | "fearful" | "afraid" | "scared" => Self::Fear,
            "surprise" | "surprised" => Self::Surprise,
            "disgust" | "disgusted" => Self::Disgust,
            "contempt" | "contemptuous" => Self::Contempt,
            "confusion" | "confused" => Self::Confusion,
            "disappointment" | "disappointed" => Self::Disappointment,
            "frustration" | "frustrated" => Self::Frustration,
            _ => Self::Other,
        }
    }

    pub const SUPPORTED: [Self; 11] = [
        Self::Neutral,
        Self::Joy,
        Self::Sadness,
        Self::Anger,
        Self::Fear,
        Self::Surprise,
        Self::Disgust,
        Self::Contempt,
        Self::Confusion,
        Self::Disappointment,
        Self::Frustration,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Unknown => "Unknown",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match match_key(raw).as_str() {
            "male" | "m" | "man" | "masculine" => Self::Male,
            "female" | "f" | "woman" | "feminine" => Self::Female,
            _ => Self::Unknown,
        }
    }
}

/// A closed label set with an `Unknown` member
pub(crate) trait Label: Copy + PartialEq {
    const UNKNOWN: Self;

    fn name(self) -> &'static str;
}

impl Label for Language {
    const UNKNOWN: Self = Self::Unknown;

    fn name(self) -> &'static str {
        self.as_str()
    }
}

impl Label for Emotion {
    const UNKNOWN: Self = Self::Unknown;

    fn name(self) -> &'static str {
        self.as_str()
    }
}

impl Label for Gender {
    const UNKNOWN: Self = Self::Unknown;

    fn name(self) -> &'static str {
        self.as_str()
    }
}

/// Choice text for a label, `unknown` when it is missing or unknown
pub(crate) fn choice<L: Label>(value: Option<L>, unknown: &str) -> String {
    match value {
        Some(label) if label != L::UNKNOWN => label.name().to_owned(),
        _ => unknown.to_owned(),
    }
}

/// Lowercased key with surrounding punctuation and apostrophes removed
fn match_key(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .chars()
        .filter(|c| !matches!(c, '\'' | '`' | '\u{2019}' | '\u{02BB}'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// First string in a value, looking into arrays (e.g. `languages_detected`)
pub(crate) fn first_str(value: Option<&Value>) -> Option<&str> {
    match value? {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_matches_names_and_codes() {
        assert_eq!(Language::parse("english"), Language::English);
        assert_eq!(Language::parse(" RU "), Language::Russian);
        assert_eq!(Language::parse("O'zbek"), Language::Uzbek);
        assert_eq!(Language::parse("Klingon"), Language::Other);
        assert_eq!(Language::parse(""), Language::Unknown);
    }

    #[test]
    fn emotion_matches_synonyms() {
        assert_eq!(Emotion::parse("Happy"), Emotion::Joy);
        assert_eq!(Emotion::parse("frustrated."), Emotion::Frustration);
        assert_eq!(Emotion::parse("calm"), Emotion::Neutral);
        assert_eq!(Emotion::parse("nostalgic"), Emotion::Other);
        assert_eq!(Emotion::parse("unknown"), Emotion::Unknown);
    }

    #[test]
    fn gender_defaults_to_unknown() {
        assert_eq!(Gender::parse("FEMALE"), Gender::Female);
        assert_eq!(Gender::parse("m"), Gender::Male);
        assert_eq!(Gender::parse("child"), Gender::Unknown);
    }

    #[test]
    fn first_str_reads_arrays() {
        let value = serde_json::json!(["Uzbek", "Russian"]);
        assert_eq!(first_str(Some(&value)), Some("Uzbek"));
        assert_eq!(first_str(Some(&serde_json::json!(3))), None);
    }
}
