//! Turns raw model text into a typed analysis
//!
//! Replies are untrusted: they may be wrapped in code fences or prose,
//! carry trailing commas, or stop mid-value when the output budget runs
//! out. [`parse_reply`] recovers what it can before giving up.

use std::collections::HashMap;

use resonance_config::FallbackTemplate;
use serde_json::{Map, Value};

use crate::capability::Call;
use crate::error::NormalizationError;
use crate::labels::{Emotion, Gender, Language, first_str};

/// Bracket positions tried as the start of the JSON value
const MAX_STARTS: usize = 16;

/// Repair candidates tried for one truncated value
const MAX_REPAIRS: usize = 64;

const SEGMENT_LIST_KEYS: &[&str] = &["segments", "transcript", "transcription", "utterances"];
const START_KEYS: &[&str] = &["start", "start_time", "begin"];
const END_KEYS: &[&str] = &["end", "end_time", "stop"];
const SPEAKER_KEYS: &[&str] = &["speaker", "speaker_id", "speaker_label"];
const TEXT_KEYS: &[&str] = &["text", "transcript", "transcription"];
const LANGUAGE_KEYS: &[&str] = &[
    "language",
    "primary_language",
    "detected_language",
    "languages_detected",
    "languages",
];
const EMOTION_KEYS: &[&str] = &["emotion", "dominant_emotion", "emotions_detected"];
const GENDER_KEYS: &[&str] = &["gender", "speaker_gender"];
const SUMMARY_KEYS: &[&str] = &["summary", "summary_uzbek"];
const ENTITY_LIST_KEYS: &[&str] = &["entities", "named_entities"];
const ENTITY_TEXT_KEYS: &[&str] = &["text", "name", "entity"];
const ENTITY_LABEL_KEYS: &[&str] = &["label", "type", "category"];

/// One transcript segment
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Segment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
    pub text: String,
    pub channel: u32,
    pub language: Option<Language>,
    pub gender: Option<Gender>,
    pub emotion: Option<Emotion>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entity {
    pub text: String,
    pub label: Option<String>,
}

/// Merged result of every model call made for one task
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct NormalizedAnalysis {
    pub segments: Vec<Segment>,
    pub language: Option<Language>,
    pub emotion: Option<Emotion>,
    pub gender: Option<Gender>,
    pub summary: Option<String>,
    pub entities: Vec<Entity>,
    /// Set when any call fell back to the template
    pub fallback: bool,
    /// Set when any call was answered by the model
    pub answered: bool,
}

impl NormalizedAnalysis {
    /// Merge a parsed reply into the fields owned by `call`
    pub fn apply(&mut self, call: Call, reply: &Value) -> Result<(), NormalizationError> {
        let missing = || NormalizationError(format!("{} reply has no usable content", call.as_str()));

        match call {
            Call::Transcript => self.segments = segments(reply).ok_or_else(missing)?,
            Call::Language => {
                self.language = Some(attribute(reply, LANGUAGE_KEYS).map(Language::parse).ok_or_else(missing)?);
            }
            Call::Emotion => {
                self.emotion = Some(attribute(reply, EMOTION_KEYS).map(Emotion::parse).ok_or_else(missing)?);
            }
            Call::Gender => {
                self.gender = Some(attribute(reply, GENDER_KEYS).map(Gender::parse).ok_or_else(missing)?);
            }
            Call::Summary => {
                let summary = attribute(reply, SUMMARY_KEYS)
                    .map(str::trim)
                    .filter(|summary| !summary.is_empty())
                    .ok_or_else(missing)?;
                self.summary = Some(summary.to_owned());
            }
            Call::Entities => self.entities = entities(reply).ok_or_else(missing)?,
        }

        self.answered = true;
        Ok(())
    }

    /// Fill the fields owned by `call` from the fallback template
    pub fn apply_fallback(&mut self, call: Call, template: &FallbackTemplate) {
        self.fallback = true;

        match call {
            Call::Transcript => {
                self.segments = template
                    .transcript
                    .iter()
                    .map(|text| Segment {
                        start: 0.0,
                        end: 0.0,
                        speaker: String::new(),
                        text: text.clone(),
                        channel: 0,
                        language: None,
                        gender: None,
                        emotion: None,
                        confidence: None,
                    })
                    .collect();
            }
            Call::Language => self.language = Some(Language::Unknown),
            Call::Emotion => self.emotion = Some(Emotion::Unknown),
            Call::Gender => self.gender = Some(Gender::Unknown),
            Call::Summary => self.summary = Some(template.summary.clone()),
            Call::Entities => self.entities.clear(),
        }
    }

    /// Sort segments and renumber speakers, in that order
    pub fn finish(&mut self, diarize: bool) {
        self.segments.sort_by(|a, b| a.start.total_cmp(&b.start));

        if !diarize {
            for segment in &mut self.segments {
                segment.speaker = "Speaker 1".to_owned();
            }
            return;
        }

        let mut numbers: HashMap<String, usize> = HashMap::new();

        for segment in &mut self.segments {
            let next = numbers.len() + 1;
            let number = *numbers.entry(std::mem::take(&mut segment.speaker)).or_insert(next);
            segment.speaker = format!("Speaker {number}");
        }
    }

    /// Mean segment confidence, `default` without any
    ///
    /// `fallback` applies only when no call was answered by the model.
    /// Template segments carry no confidence and do not count.
    pub fn score(&self, default: f64, fallback: f64) -> f64 {
        if !self.answered {
            return fallback.clamp(0.0, 1.0);
        }

        let confidences: Vec<f64> = self.segments.iter().filter_map(|s| s.confidence).collect();

        if confidences.is_empty() {
            return default.clamp(0.0, 1.0);
        }

        #[allow(clippy::cast_precision_loss)]
        let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
        mean.clamp(0.0, 1.0)
    }
}

/// Extract and parse the JSON value in a model reply
pub(crate) fn parse_reply(raw: &str) -> Result<Value, NormalizationError> {
    let text = strip_fences(raw);
    let mut rejected: Vec<(usize, usize)> = Vec::new();

    for start in candidate_starts(text) {
        // a value nested in a rejected one is a fragment, not the reply
        if rejected.iter().any(|&(from, to)| from < start && start < to) {
            continue;
        }

        let (candidate, complete) = balanced_prefix(&text[start..]);

        if let Some(value) = parse_candidate(candidate, complete) {
            return Ok(value);
        }

        rejected.push((start, start + candidate.len()));
    }

    let excerpt: String = raw.chars().take(120).collect();
    Err(NormalizationError(format!("no JSON value in reply: {excerpt:?}")))
}

fn parse_candidate(candidate: &str, complete: bool) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(candidate) {
        return Some(value);
    }

    let cleaned = strip_trailing_commas(candidate);
    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }

    // a balanced but invalid value is prose in brackets, not a truncation
    if complete {
        return None;
    }

    close_truncated(&cleaned)
        .into_iter()
        .find_map(|repaired| serde_json::from_str(&repaired).ok())
}

/// Body of the first fenced block, or the trimmed reply without one
fn strip_fences(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw.trim();
    };

    let mut body = &raw[open + 3..];

    // language tag on the fence line
    if let Some((tag, rest)) = body.split_once('\n')
        && tag.trim().chars().all(|c| c.is_ascii_alphanumeric())
    {
        body = rest;
    }

    body.find("```").map_or(body, |close| &body[..close]).trim()
}

/// Offsets to try, a leading bracket first, then objects before arrays
fn candidate_starts(text: &str) -> Vec<usize> {
    let mut starts = Vec::new();

    if text.starts_with(['{', '[']) {
        starts.push(0);
    }

    for (index, _) in text.match_indices('{').chain(text.match_indices('[')) {
        if starts.len() == MAX_STARTS {
            break;
        }
        if !starts.contains(&index) {
            starts.push(index);
        }
    }

    starts
}

/// The value starting at `text[0]`, and whether its brackets balance
fn balanced_prefix(text: &str) -> (&str, bool) {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, byte) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return (&text[..=index], true);
                }
            }
            _ => {}
        }
    }

    (text, false)
}

fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (index, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == ',' && text[index + 1..].trim_start().starts_with(['}', ']']) {
            continue;
        }

        out.push(c);
    }

    out
}

/// Candidate completions of a value cut off mid-stream
///
/// First the whole text with open strings and containers closed, then
/// shorter prefixes ending before a comma or after an opening bracket,
/// latest first.
fn close_truncated(text: &str) -> Vec<String> {
    let mut stack: Vec<u8> = Vec::new();
    let mut cuts: Vec<(usize, Vec<u8>)> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (index, byte) in text.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => {
                stack.push(b'}');
                cuts.push((index + 1, stack.clone()));
            }
            b'[' => {
                stack.push(b']');
                cuts.push((index + 1, stack.clone()));
            }
            b'}' | b']' => {
                stack.pop();
            }
            b',' => cuts.push((index, stack.clone())),
            _ => {}
        }
    }

    let close = |prefix: &str, stack: &[u8]| {
        let mut candidate = prefix.trim_end().to_owned();
        candidate.extend(stack.iter().rev().map(|&b| char::from(b)));
        candidate
    };

    let mut full = text.trim_end().to_owned();
    if in_string {
        if escaped {
            full.pop();
        }
        full.push('"');
    }

    let mut candidates = vec![close(&full, &stack)];
    candidates.extend(
        cuts.iter()
            .rev()
            .take(MAX_REPAIRS - 1)
            .map(|(at, stack)| close(&text[..*at], stack)),
    );

    candidates
}

/// Coerce a timestamp to non-negative seconds at 0.1s precision
pub(crate) fn seconds(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_timestamp(s)?,
        _ => return None,
    };

    raw.is_finite().then(|| (raw.max(0.0) * 10.0).round() / 10.0)
}

fn parse_timestamp(raw: &str) -> Option<f64> {
    let normalized = raw.trim().replace(',', ".");
    let text = normalized
        .strip_suffix("sec")
        .or_else(|| normalized.strip_suffix('s'))
        .unwrap_or(normalized.as_str())
        .trim();

    if !text.contains(':') {
        return text.parse().ok();
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }

    parts
        .iter()
        .try_fold(0.0, |total, part| part.trim().parse::<f64>().ok().map(|v| total * 60.0 + v))
}

fn first_key<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| object.get(*key).filter(|value| !value.is_null()))
}

/// A scalar attribute given bare or under one of `keys`
fn attribute<'a>(reply: &'a Value, keys: &[&str]) -> Option<&'a str> {
    match reply {
        Value::String(s) => Some(s.as_str()),
        Value::Object(object) => first_str(first_key(object, keys)),
        _ => None,
    }
}

fn segments(reply: &Value) -> Option<Vec<Segment>> {
    let list = match reply {
        Value::Array(items) => Some(items),
        Value::Object(object) => SEGMENT_LIST_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array)),
        _ => None,
    };

    if let Some(list) = list {
        return Some(list.iter().filter_map(segment).collect());
    }

    // a lone timed segment means the list around it was lost
    if let Value::Object(object) = reply
        && (first_key(object, START_KEYS).is_some() || first_key(object, END_KEYS).is_some())
    {
        return None;
    }

    // a plain transcript without timing
    let text = attribute(reply, TEXT_KEYS)?.trim();
    let whole = serde_json::json!({ "text": text });

    Some(segment(&whole).into_iter().collect())
}

fn segment(raw: &Value) -> Option<Segment> {
    let object = raw.as_object()?;

    let text = first_key(object, TEXT_KEYS)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_owned();

    let start = first_key(object, START_KEYS).and_then(seconds).unwrap_or(0.0);
    let end = first_key(object, END_KEYS)
        .and_then(seconds)
        .unwrap_or(start)
        .max(start);

    if text.is_empty() && end <= start {
        return None;
    }

    let speaker = match first_key(object, SPEAKER_KEYS) {
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };

    let channel = object
        .get("channel")
        .and_then(Value::as_u64)
        .and_then(|channel| u32::try_from(channel).ok())
        .unwrap_or(0);

    Some(Segment {
        start,
        end,
        speaker,
        text,
        channel,
        language: first_str(first_key(object, LANGUAGE_KEYS)).map(Language::parse),
        gender: first_str(first_key(object, GENDER_KEYS)).map(Gender::parse),
        emotion: first_str(first_key(object, EMOTION_KEYS)).map(Emotion::parse),
        confidence: object.get("confidence").and_then(confidence),
    })
}

/// A confidence in [0, 1], reading values above 1 as percentages
fn confidence(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok()?,
        _ => return None,
    };

    if !raw.is_finite() {
        return None;
    }

    let raw = if raw > 1.0 && raw <= 100.0 { raw / 100.0 } else { raw };
    Some(raw.clamp(0.0, 1.0))
}

fn entities(reply: &Value) -> Option<Vec<Entity>> {
    let list = match reply {
        Value::Array(items) => items,
        Value::Object(object) => ENTITY_LIST_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))?,
        _ => return None,
    };

    let entities = list
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(Entity {
                text: text.trim().to_owned(),
                label: None,
            }),
            Value::Object(object) => Some(Entity {
                text: first_key(object, ENTITY_TEXT_KEYS)?.as_str()?.trim().to_owned(),
                label: first_key(object, ENTITY_LABEL_KEYS)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .map(str::to_owned),
            }),
            _ => None,
        })
        .filter(|entity| !entity.text.is_empty())
        .collect();

    Some(entities)
}
