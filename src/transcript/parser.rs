//! Speech-to-text job result parsing.
//!
//! Input shape (the fields that matter):
//!
//! ```json
//! {
//!   "jobName": "...", "accountId": "...", "status": "COMPLETED",
//!   "results": {
//!     "language_code": "en-US",
//!     "transcripts": [{ "transcript": "full text" }],
//!     "items": [
//!       { "type": "pronunciation", "start_time": "0.5", "end_time": "0.9",
//!         "alternatives": [{ "content": "Hello", "confidence": "0.99" }] },
//!       { "type": "punctuation", "alternatives": [{ "content": "." }] }
//!     ],
//!     "speaker_labels": {
//!       "segments": [{ "speaker_label": "spk_0", "items": [{ "start_time": "0.5" }] }]
//!     }
//!   }
//! }
//! ```
//!
//! Times and confidences arrive as strings; numbers are accepted too.

use super::types::{ParsedTranscript, TranscriptMetadata, TranscriptSegment};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

fn de_opt_f64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<f64>, D::Error> {
    match Option::<NumberOrString>::deserialize(d)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[derive(Deserialize)]
struct RawJob {
    #[serde(rename = "jobName", default)]
    job_name: String,
    #[serde(rename = "accountId", default)]
    account_id: String,
    #[serde(default)]
    status: String,
    results: RawResults,
}

#[derive(Deserialize)]
struct RawResults {
    #[serde(default)]
    language_code: String,
    #[serde(default)]
    transcripts: Vec<RawTranscript>,
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    speaker_labels: Option<RawSpeakerLabels>,
}

#[derive(Deserialize)]
struct RawTranscript {
    #[serde(default)]
    transcript: String,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    alternatives: Vec<RawAlternative>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    start_time: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    end_time: Option<f64>,
}

#[derive(Deserialize)]
struct RawAlternative {
    #[serde(default)]
    content: String,
    #[serde(default, deserialize_with = "de_opt_f64")]
    confidence: Option<f64>,
}

#[derive(Deserialize)]
struct RawSpeakerLabels {
    #[serde(default)]
    segments: Vec<RawSpeakerSegment>,
}

#[derive(Deserialize)]
struct RawSpeakerSegment {
    #[serde(default)]
    speaker_label: Option<String>,
    #[serde(default)]
    items: Vec<RawSpeakerItem>,
}

#[derive(Deserialize)]
struct RawSpeakerItem {
    #[serde(default, deserialize_with = "de_opt_f64")]
    start_time: Option<f64>,
}

/// Millisecond key for exact start-time lookups.
fn time_key(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

fn speaker_map(labels: Option<&RawSpeakerLabels>) -> HashMap<i64, String> {
    let mut map = HashMap::new();
    for segment in labels.map(|l| l.segments.as_slice()).unwrap_or_default() {
        let speaker = segment
            .speaker_label
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        for item in &segment.items {
            map.insert(time_key(item.start_time.unwrap_or(0.0)), speaker.clone());
        }
    }
    map
}

struct SegmentBuilder {
    words: Vec<String>,
    start_time: f64,
    end_time: f64,
    speaker: Option<String>,
    confidence_sum: f64,
}

impl SegmentBuilder {
    fn new(start_time: f64, speaker: Option<String>) -> Self {
        Self {
            words: Vec::new(),
            start_time,
            end_time: start_time,
            speaker,
            confidence_sum: 0.0,
        }
    }

    fn push_word(&mut self, content: &str, end_time: f64, confidence: f64) {
        self.words.push(content.to_string());
        self.end_time = end_time;
        self.confidence_sum += confidence;
    }

    fn finish(self) -> TranscriptSegment {
        let confidence = if self.words.is_empty() {
            0.0
        } else {
            self.confidence_sum / self.words.len() as f64
        };
        TranscriptSegment {
            text: self.words.join(" "),
            start_time: self.start_time,
            end_time: self.end_time,
            speaker: self.speaker,
            confidence,
        }
    }
}

fn build_segments(items: &[RawItem], speakers: &HashMap<i64, String>) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut current: Option<SegmentBuilder> = None;

    for item in items {
        let alternative = item.alternatives.first();
        let content = alternative.map(|a| a.content.as_str()).unwrap_or_default();

        if item.kind.as_deref() == Some("punctuation") {
            // Attaches to the preceding word; leading punctuation is dropped.
            if let Some(word) = current.as_mut().and_then(|b| b.words.last_mut()) {
                word.push_str(content);
            }
            continue;
        }

        let start = item.start_time.unwrap_or(0.0);
        let end = item.end_time.unwrap_or(start);
        let confidence = alternative.and_then(|a| a.confidence).unwrap_or(0.0);
        let speaker = speakers.get(&time_key(start)).cloned();

        if current.as_ref().is_some_and(|b| b.speaker != speaker) {
            if let Some(done) = current.take() {
                segments.push(done.finish());
            }
        }
        current
            .get_or_insert_with(|| SegmentBuilder::new(start, speaker))
            .push_word(content, end, confidence);
    }

    if let Some(done) = current {
        segments.push(done.finish());
    }
    segments
}

/// Parse a job result into text, segments, speakers and metadata.
///
/// Fails with a structural error when `results` is missing or malformed.
pub fn parse_transcript(raw: &Value) -> Result<ParsedTranscript> {
    if !raw.get("results").is_some_and(Value::is_object) {
        return Err(Error::structural_with_context(
            "Invalid transcript JSON: missing 'results' key",
            ErrorContext::new()
                .with_field_path("results")
                .with_source("transcript_parser"),
        ));
    }

    let job = RawJob::deserialize(raw).map_err(|e| {
        Error::structural_with_context(
            "Invalid transcript JSON",
            ErrorContext::new()
                .with_details(e.to_string())
                .with_source("transcript_parser"),
        )
    })?;

    let results = job.results;
    let full_text = results
        .transcripts
        .first()
        .map(|t| t.transcript.clone())
        .unwrap_or_default();
    let speakers_by_time = speaker_map(results.speaker_labels.as_ref());
    let segments = build_segments(&results.items, &speakers_by_time);
    let speakers: Vec<String> = segments
        .iter()
        .filter_map(|s| s.speaker.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    info!(
        chars = full_text.chars().count(),
        segments = segments.len(),
        speakers = speakers.len(),
        "Parsed transcript"
    );

    Ok(ParsedTranscript {
        full_text,
        segments,
        speakers,
        metadata: TranscriptMetadata {
            job_name: job.job_name,
            account_id: job.account_id,
            status: job.status,
            language_code: results.language_code,
        },
    })
}

/// Parse raw bytes; invalid JSON is a structural error.
pub fn parse_transcript_bytes(bytes: &[u8]) -> Result<ParsedTranscript> {
    let raw: Value = serde_json::from_slice(bytes).map_err(|e| {
        Error::structural_with_context(
            "Transcript is not valid JSON",
            ErrorContext::new()
                .with_details(e.to_string())
                .with_source("transcript_parser"),
        )
    })?;
    parse_transcript(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn word(content: &str, start: f64, end: f64, confidence: &str) -> Value {
        json!({
            "type": "pronunciation",
            "start_time": format!("{start}"),
            "end_time": format!("{end}"),
            "alternatives": [{ "content": content, "confidence": confidence }]
        })
    }

    fn punct(content: &str) -> Value {
        json!({ "type": "punctuation", "alternatives": [{ "content": content }] })
    }

    fn sample() -> Value {
        json!({
            "jobName": "job-1",
            "accountId": "123",
            "status": "COMPLETED",
            "results": {
                "language_code": "pt-BR",
                "transcripts": [{ "transcript": "Hello world. Hi." }],
                "items": [
                    word("Hello", 0.5, 0.9, "0.9"),
                    word("world", 1.0, 1.4, "0.7"),
                    punct("."),
                    word("Hi", 2.0, 2.3, "1.0"),
                    punct("."),
                ],
                "speaker_labels": {
                    "segments": [
                        { "speaker_label": "spk_0", "items": [{ "start_time": "0.5" }, { "start_time": "1.0" }] },
                        { "speaker_label": "spk_1", "items": [{ "start_time": "2.0" }] }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_parse_builds_segments_per_speaker() {
        let parsed = parse_transcript(&sample()).unwrap();
        assert_eq!(parsed.full_text, "Hello world. Hi.");
        assert_eq!(parsed.segments.len(), 2);

        let first = &parsed.segments[0];
        assert_eq!(first.text, "Hello world.");
        assert_eq!(first.speaker.as_deref(), Some("spk_0"));
        assert_eq!(first.start_time, 0.5);
        assert_eq!(first.end_time, 1.4);
        assert!((first.confidence - 0.8).abs() < 1e-9);

        let second = &parsed.segments[1];
        assert_eq!(second.text, "Hi.");
        assert_eq!(second.speaker.as_deref(), Some("spk_1"));

        assert_eq!(parsed.speakers, vec!["spk_0", "spk_1"]);
        assert_eq!(parsed.metadata.job_name, "job-1");
        assert_eq!(parsed.metadata.language_code, "pt-BR");
    }

    #[test]
    fn test_missing_results_is_structural_error() {
        let err = parse_transcript(&json!({ "jobName": "x" })).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("results")
        );
    }

    #[test]
    fn test_invalid_bytes_are_structural_error() {
        let err = parse_transcript_bytes(b"{not json").unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn test_unlabeled_transcript_is_one_segment() {
        let raw = json!({
            "results": {
                "transcripts": [{ "transcript": "a b" }],
                "items": [
                    { "type": "pronunciation", "start_time": 0.0, "end_time": 0.5,
                      "alternatives": [{ "content": "a", "confidence": 1.0 }] },
                    { "start_time": "0.6", "end_time": "1.0",
                      "alternatives": [{ "content": "b" }] }
                ]
            }
        });
        let parsed = parse_transcript(&raw).unwrap();
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(parsed.segments[0].text, "a b");
        assert_eq!(parsed.segments[0].speaker, None);
        assert!(parsed.speakers.is_empty());
    }

    #[test]
    fn test_empty_results_parse_to_empty_transcript() {
        let parsed = parse_transcript(&json!({ "results": {} })).unwrap();
        assert!(parsed.full_text.is_empty());
        assert!(parsed.segments.is_empty());
    }
}
