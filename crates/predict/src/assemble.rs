use resonance_config::{Capability, FallbackTemplate, FieldNames};

use crate::capability::AnalysisPlan;
use crate::labels::choice;
use crate::normalize::{NormalizedAnalysis, Segment};
use crate::types::{EntryKind, EntryValue, PredictionResult, ResultEntry};

const ORIGIN: &str = "prediction";

/// Maps a normalized analysis onto platform result entries
pub(crate) struct Assembler<'a> {
    pub fields: &'a FieldNames,
    pub plan: &'a AnalysisPlan,
    pub model_version: &'a str,
    pub default_score: f64,
    pub fallback: &'a FallbackTemplate,
}

impl Assembler<'_> {
    pub fn assemble(&self, task_id: i64, analysis: &NormalizedAnalysis) -> PredictionResult {
        let mut result = Vec::new();

        for (index, segment) in analysis.segments.iter().enumerate() {
            self.segment_entries(&format!("{task_id}-{index}"), segment, analysis, &mut result);
        }

        if !self.plan.per_region_attributes() || analysis.segments.is_empty() {
            self.task_choices(analysis, &mut result);
        }

        if let Some(summary) = analysis.summary.as_deref().filter(|_| self.plan.has(Capability::Summary)) {
            result.push(self.entry(None, &self.fields.summary, EntryKind::Textarea, EntryValue {
                text: Some(vec![summary.to_owned()]),
                ..EntryValue::default()
            }));
        }

        if self.plan.has(Capability::Entities) && !analysis.entities.is_empty() {
            let lines = analysis
                .entities
                .iter()
                .map(|entity| match &entity.label {
                    Some(label) => format!("{} ({label})", entity.text),
                    None => entity.text.clone(),
                })
                .collect();

            result.push(self.entry(None, &self.fields.entities, EntryKind::Textarea, EntryValue {
                text: Some(lines),
                ..EntryValue::default()
            }));
        }

        PredictionResult {
            result,
            score: analysis.score(self.default_score, self.fallback.score),
            model_version: self.model_version.to_owned(),
            error: None,
        }
    }

    fn segment_entries(&self, id: &str, segment: &Segment, analysis: &NormalizedAnalysis, out: &mut Vec<ResultEntry>) {
        let region = |extra: EntryValue| EntryValue {
            start: Some(segment.start),
            end: Some(segment.end),
            channel: Some(segment.channel),
            ..extra
        };

        if self.plan.diarizes() {
            out.push(self.entry(Some(id), &self.fields.speaker, EntryKind::Labels, region(EntryValue {
                labels: Some(vec![segment.speaker.clone()]),
                ..EntryValue::default()
            })));
        }

        if self.plan.transcribes() && !segment.text.is_empty() {
            out.push(self.entry(Some(id), &self.fields.transcription, EntryKind::Textarea, region(EntryValue {
                text: Some(vec![segment.text.clone()]),
                ..EntryValue::default()
            })));
        }

        if !self.plan.per_region_attributes() {
            return;
        }

        let choices = [
            (
                self.plan.has(Capability::Language),
                &self.fields.language,
                choice(segment.language.or(analysis.language), &self.fallback.language),
            ),
            (
                self.plan.has(Capability::Gender),
                &self.fields.gender,
                choice(segment.gender.or(analysis.gender), &self.fallback.gender),
            ),
            (
                self.plan.has(Capability::Emotion),
                &self.fields.emotion,
                choice(segment.emotion.or(analysis.emotion), &self.fallback.emotion),
            ),
        ];

        for (enabled, from_name, label) in choices {
            if enabled {
                out.push(self.entry(Some(id), from_name, EntryKind::Choices, region(EntryValue {
                    choices: Some(vec![label]),
                    ..EntryValue::default()
                })));
            }
        }
    }

    fn task_choices(&self, analysis: &NormalizedAnalysis, out: &mut Vec<ResultEntry>) {
        let choices = [
            (
                self.plan.has(Capability::Language),
                &self.fields.language,
                choice(analysis.language, &self.fallback.language),
            ),
            (
                self.plan.has(Capability::Gender),
                &self.fields.gender,
                choice(analysis.gender, &self.fallback.gender),
            ),
            (
                self.plan.has(Capability::Emotion),
                &self.fields.emotion,
                choice(analysis.emotion, &self.fallback.emotion),
            ),
        ];

        for (enabled, from_name, label) in choices {
            if enabled {
                out.push(self.entry(None, from_name, EntryKind::Choices, EntryValue {
                    choices: Some(vec![label]),
                    ..EntryValue::default()
                }));
            }
        }
    }

    fn entry(&self, id: Option<&str>, from_name: &str, kind: EntryKind, value: EntryValue) -> ResultEntry {
        ResultEntry {
            id: id.map(str::to_owned),
            from_name: from_name.to_owned(),
            to_name: self.fields.to_name.clone(),
            kind,
            value,
            origin: ORIGIN,
        }
    }
}
