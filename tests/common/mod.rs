//! Shared fixtures: a scripted model endpoint and transcript builders.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use transcript_docgen::pipeline::StageId;
use transcript_docgen::transport::{ModelEndpoint, ModelRequest};
use transcript_docgen::{BoxStream, Error, Result};

pub const EXTRACTION: &str =
    r#"{"diagnostics":[{"error_code":"E42","root_cause":"stale lock"}],"solutions":["restart the broker"],"risks":[],"business_rules":[],"configurations":[]}"#;
pub const SOLUTION_MAP: &str =
    r#"{"problem_solution_map":[{"problem":"E42","root_cause":"stale lock","solution_steps":["restart"],"commands":["systemctl restart broker"],"outcome":"ok"}],"preventive_measures":["monitor locks"],"debugging_steps":[]}"#;
pub const OUTLINE: &str = "# Broker Guide\n## Troubleshooting\n- E42";
pub const DOCUMENT: &str = "# Broker Guide\n\nRestart the broker when **E42** appears.\n\n```\nsystemctl restart broker\n```";

/// Which stage a prompt belongs to, by the tag wrapping its input.
pub fn stage_of(prompt: &str) -> Option<StageId> {
    [
        ("</transcription>", StageId::Extract),
        ("</technical_content>", StageId::MapSolutions),
        ("</solution_map>", StageId::Outline),
        ("</document_outline>", StageId::Write),
    ]
    .into_iter()
    .find(|(tag, _)| prompt.contains(tag))
    .map(|(_, stage)| stage)
}

type Responder = Box<dyn Fn(StageId, &ModelRequest, u32) -> Result<String> + Send + Sync>;

/// Answers each call according to the stage its prompt belongs to.
pub struct StageEndpoint {
    respond: Responder,
    calls: AtomicU32,
    per_stage: Mutex<HashMap<u8, u32>>,
    seen: Mutex<Vec<(StageId, ModelRequest)>>,
}

impl StageEndpoint {
    /// `respond` receives the stage, the request and how many calls that stage saw before.
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(StageId, &ModelRequest, u32) -> Result<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            respond: Box::new(respond),
            calls: AtomicU32::new(0),
            per_stage: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Canned successful answers for every stage.
    pub fn happy() -> Arc<Self> {
        Self::new(|stage, _, _| Ok(canned(stage).to_string()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, stage: StageId) -> u32 {
        self.per_stage
            .lock()
            .unwrap()
            .get(&stage.number())
            .copied()
            .unwrap_or(0)
    }

    pub fn requests_for(&self, stage: StageId) -> Vec<ModelRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, r)| r.clone())
            .collect()
    }

    fn answer(&self, request: &ModelRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stage = stage_of(&request.prompt).unwrap_or(StageId::Clean);
        let previous = {
            let mut per_stage = self.per_stage.lock().unwrap();
            let count = per_stage.entry(stage.number()).or_insert(0);
            *count += 1;
            *count - 1
        };
        self.seen.lock().unwrap().push((stage, request.clone()));
        (self.respond)(stage, request, previous)
    }
}

pub fn canned(stage: StageId) -> &'static str {
    match stage {
        StageId::Extract => EXTRACTION,
        StageId::MapSolutions => SOLUTION_MAP,
        StageId::Outline => OUTLINE,
        _ => DOCUMENT,
    }
}

#[async_trait::async_trait]
impl ModelEndpoint for StageEndpoint {
    async fn invoke(&self, request: &ModelRequest) -> Result<String> {
        self.answer(request)
    }

    async fn stream(&self, request: &ModelRequest) -> Result<BoxStream<'static, String>> {
        let text = self.answer(request)?;
        let parts: Vec<Result<String>> = text
            .split_inclusive('\n')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(tokio_stream::iter(parts)))
    }
}

/// Always fails with `err()`.
pub struct FailingEndpoint {
    err: fn() -> Error,
    pub calls: AtomicU32,
}

impl FailingEndpoint {
    pub fn new(err: fn() -> Error) -> Arc<Self> {
        Arc::new(Self {
            err,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait::async_trait]
impl ModelEndpoint for FailingEndpoint {
    async fn invoke(&self, _request: &ModelRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.err)())
    }

    async fn stream(&self, _request: &ModelRequest) -> Result<BoxStream<'static, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.err)())
    }
}

/// A speech-to-text job result with one speaker turn per `(speaker, text, start)`.
///
/// Words are spaced half a second apart.
pub fn transcript_json(turns: &[(&str, &str, f64)]) -> Value {
    let mut items = Vec::new();
    let mut labels = Vec::new();
    let mut full = Vec::new();

    for (speaker, text, start) in turns {
        let mut label_items = Vec::new();
        for (i, word) in text.split_whitespace().enumerate() {
            let t = start + i as f64 * 0.5;
            items.push(json!({
                "type": "pronunciation",
                "start_time": format!("{:.3}", t),
                "end_time": format!("{:.3}", t + 0.4),
                "alternatives": [{ "content": word, "confidence": "0.95" }]
            }));
            label_items.push(json!({ "start_time": format!("{:.3}", t) }));
            full.push(word.to_string());
        }
        labels.push(json!({ "speaker_label": speaker, "items": label_items }));
    }

    json!({
        "jobName": "job-1",
        "accountId": "123",
        "status": "COMPLETED",
        "results": {
            "language_code": "en-US",
            "transcripts": [{ "transcript": full.join(" ") }],
            "items": items,
            "speaker_labels": { "segments": labels }
        }
    })
}

/// Two speakers alternating for `turns` turns of `words` words each.
pub fn conversation(turns: usize, words: usize) -> Value {
    let texts: Vec<String> = (0..turns)
        .map(|t| {
            (0..words)
                .map(|w| format!("word{}x{}", t, w))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    let script: Vec<(&str, &str, f64)> = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let speaker = if i % 2 == 0 { "spk_0" } else { "spk_1" };
            (speaker, text.as_str(), i as f64 * (words as f64 * 0.5 + 1.0))
        })
        .collect();
    transcript_json(&script)
}
