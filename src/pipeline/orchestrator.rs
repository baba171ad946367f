use super::budget::StageBudget;
use super::merge::merge_outlines;
use super::prompts;
use super::result::{PipelineResult, RunStatus};
use super::stages::{
    ArtifactLocations, SolutionMap, StageId, StageOutput, StageResult, TechnicalContent,
};
use super::state::PipelineState;
use crate::cancel::CancelScope;
use crate::client::{AuditLog, ChunkCallback, InvokeOptions, ModelClient};
use crate::render::{DocumentRenderer, HtmlRenderer};
use crate::storage::{ObjectLocation, ObjectMetadata, ObjectStore};
use crate::tracking::{noop_reporter, report_best_effort, ProgressReporter, ProgressUpdate};
use crate::transcript::{ParsedTranscript, TranscriptChunk, TranscriptChunker};
use crate::{Error, Result};
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const DEFAULT_WRITING_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub budget: StageBudget,
    /// Sampling temperature of the writing stage.
    pub writing_temperature: f32,
    /// Overall run deadline; `None` runs until done.
    pub deadline: Option<Duration>,
    /// Stream the writing stage instead of a single blocking call.
    pub stream_writing: bool,
    /// Audit records of each run go to `<audit_root>/<execution_id>`.
    pub audit_root: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            budget: StageBudget::default(),
            writing_temperature: DEFAULT_WRITING_TEMPERATURE,
            deadline: None,
            stream_writing: false,
            audit_root: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_budget(mut self, budget: StageBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_stream_writing(mut self, stream: bool) -> Self {
        self.stream_writing = stream;
        self
    }

    pub fn with_audit_root(mut self, root: Option<PathBuf>) -> Self {
        self.audit_root = root;
        self
    }
}

/// Mutable bookkeeping of one run.
struct Run<'a> {
    execution_id: &'a str,
    started: Instant,
    usage_before: crate::tokens::TokenUsage,
    state: PipelineState,
    stages: Vec<StageResult>,
    chunks: usize,
}

/// Drives a transcript through the six stages and writes the artifacts.
///
/// Chunks run one after another, stages within a chunk strictly in order.
/// A stage failure is recorded and blocks the stages that consume its output;
/// a run only succeeds when the writing stage produced content and both
/// artifacts were stored.
pub struct PipelineOrchestrator {
    client: Arc<ModelClient>,
    store: Arc<dyn ObjectStore>,
    renderer: Arc<dyn DocumentRenderer>,
    reporter: Arc<dyn ProgressReporter>,
    chunker: TranscriptChunker,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(client: Arc<ModelClient>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            client,
            store,
            renderer: Arc::new(HtmlRenderer::new()),
            reporter: noop_reporter(),
            chunker: TranscriptChunker::default(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn DocumentRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_chunker(mut self, chunker: TranscriptChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client(&self) -> &ModelClient {
        &self.client
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline. Always returns a result, failed runs included.
    pub async fn generate(
        &self,
        execution_id: &str,
        transcript_uri: &str,
        output_bucket: &str,
    ) -> PipelineResult {
        let mut scope = CancelScope::new();
        if let Some(deadline) = self.config.deadline {
            scope = scope.with_timeout(deadline);
        }
        self.generate_with_scope(execution_id, transcript_uri, output_bucket, scope)
            .await
    }

    /// [`generate`](Self::generate) under a caller-controlled cancellation scope.
    pub async fn generate_with_scope(
        &self,
        execution_id: &str,
        transcript_uri: &str,
        output_bucket: &str,
        scope: CancelScope,
    ) -> PipelineResult {
        info!(execution_id, transcript_uri, output_bucket, "Starting document generation");
        if let Some(root) = &self.config.audit_root {
            let log = AuditLog::for_execution(root, execution_id);
            debug!(execution_id, dir = %log.dir().display(), "Auditing model calls");
            self.client.set_audit_log(Some(log));
        }
        let mut run = Run {
            execution_id,
            started: Instant::now(),
            usage_before: self.client.total_usage(),
            state: PipelineState::Loading,
            stages: Vec::new(),
            chunks: 0,
        };
        self.report_state(&run).await;

        let content = match self.produce_content(&mut run, transcript_uri, &scope).await {
            Ok(content) => content,
            Err(e) => return self.fail(run, e).await,
        };

        self.enter(&mut run, PipelineState::OutputGeneration).await;
        let started = Instant::now();
        let stored = self
            .write_outputs(execution_id, &content, output_bucket, &scope)
            .await;
        let artifacts = match stored {
            Ok(artifacts) => {
                run.stages.push(StageResult::success(
                    StageId::Output,
                    None,
                    StageOutput::Artifacts(artifacts.clone()),
                    Default::default(),
                    started.elapsed(),
                ));
                artifacts
            }
            Err(e) => {
                error!(execution_id, error = %e, "Output generation failed");
                run.stages.push(StageResult::failed(
                    StageId::Output,
                    None,
                    e.to_string(),
                    Default::default(),
                    started.elapsed(),
                ));
                return self.fail(run, e).await;
            }
        };

        self.enter(&mut run, PipelineState::Done).await;
        let usage = self.client.total_usage().since(&run.usage_before);
        let result = PipelineResult {
            execution_id: execution_id.to_string(),
            status: RunStatus::Success,
            final_content: Some(content),
            markdown_location: Some(artifacts.markdown),
            document_location: Some(artifacts.document),
            total_usage: usage,
            cost_usd: usage.cost(self.client.pricing()),
            duration: run.started.elapsed(),
            stages: run.stages,
            chunks_processed: run.chunks,
            final_state: PipelineState::Done,
            error: None,
        };
        info!(
            execution_id,
            tokens = usage.total(),
            cost = result.cost_usd,
            duration_secs = result.duration.as_secs_f64(),
            chunks = result.chunks_processed,
            "Document generation complete"
        );
        result
    }

    /// Loading through the writing stage. `Err` means no usable content.
    async fn produce_content(
        &self,
        run: &mut Run<'_>,
        transcript_uri: &str,
        scope: &CancelScope,
    ) -> Result<String> {
        let location = ObjectLocation::parse(transcript_uri)?;
        let raw = scope.run(self.store.get(&location)).await??;
        let parsed = self.chunker.parse_bytes(&raw)?;
        if parsed.segments.is_empty() && parsed.full_text.trim().is_empty() {
            return Err(Error::structural("Transcript contains no speech"));
        }

        self.enter(run, PipelineState::Chunking).await;
        let chunks = self.chunker.chunk(&parsed);
        run.chunks = chunks.len();
        info!(execution_id = run.execution_id, chunks = chunks.len(), "Transcript chunked");

        let system = prompts::language_system_prompt(&parsed.metadata.language_code);
        let multi = chunks.len() > 1;

        let mut outlines = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let outline = self
                .run_chunk(run, chunk, &parsed, system.as_deref(), multi, scope)
                .await;
            outlines.push(outline);
        }

        let chunk_id = if multi { None } else { chunks.first().map(|c| c.chunk_id) };
        let outline = if multi {
            let missing: Vec<String> = chunks
                .iter()
                .zip(&outlines)
                .filter(|(_, o)| o.is_none())
                .map(|(c, _)| c.chunk_id.to_string())
                .collect();
            if missing.is_empty() {
                self.enter(run, PipelineState::Merging).await;
                let present: Vec<String> = outlines.into_iter().flatten().collect();
                Some(merge_outlines(&present))
            } else {
                run.stages.push(StageResult::blocked(
                    StageId::Write,
                    None,
                    format!("Blocked: no outline for chunk(s) {}", missing.join(", ")),
                ));
                None
            }
        } else {
            outlines.into_iter().next().flatten()
        };

        if let Some(outline) = outline {
            self.enter(run, PipelineState::Stage { stage: StageId::Write, chunk_id })
                .await;
            let writing = self.write_content(&outline, system.as_deref(), scope);
            let result = self.run_stage(StageId::Write, chunk_id, writing).await;
            run.stages.push(result);
        } else if !multi {
            run.stages.push(StageResult::blocked(
                StageId::Write,
                chunk_id,
                "Blocked: stage 4 produced no outline",
            ));
        }

        let last = run.stages.last();
        match last.filter(|s| s.stage_id == StageId::Write).and_then(StageResult::text) {
            Some(content) => Ok(content.to_string()),
            None => {
                let reason = last
                    .and_then(|s| s.error.clone())
                    .unwrap_or_else(|| "Final stage produced no output".to_string());
                Err(Error::Stage {
                    stage: StageId::Write.number(),
                    message: reason,
                })
            }
        }
    }

    /// Stages 1 to 4 for one chunk. Returns the outline when stage 4 succeeded.
    async fn run_chunk(
        &self,
        run: &mut Run<'_>,
        chunk: &TranscriptChunk,
        parsed: &ParsedTranscript,
        system: Option<&str>,
        multi: bool,
        scope: &CancelScope,
    ) -> Option<String> {
        let id = Some(chunk.chunk_id);
        info!(
            execution_id = run.execution_id,
            chunk_id = chunk.chunk_id,
            total_chunks = chunk.total_chunks,
            tokens = chunk.token_count,
            "Processing chunk"
        );

        self.enter(run, PipelineState::Stage { stage: StageId::Clean, chunk_id: id }).await;
        let cleaning = async {
            let text = if chunk.segments.is_empty() {
                parsed.full_text.clone()
            } else {
                self.chunker.format_with_timestamps(&chunk.segments)
            };
            Ok(StageOutput::Text(text))
        };
        let cleaned = self.run_stage(StageId::Clean, id, cleaning).await;
        let transcript = cleaned.text().map(str::to_string);
        run.stages.push(cleaned);

        let mut upstream = transcript.map(Value::String);
        for stage in [StageId::Extract, StageId::MapSolutions, StageId::Outline] {
            let Some(input) = upstream.take() else {
                run.stages.push(StageResult::blocked(
                    stage,
                    id,
                    format!("Blocked: stage {} produced no output", stage.number() - 1),
                ));
                continue;
            };

            self.enter(run, PipelineState::Stage { stage, chunk_id: id }).await;
            let opts = self.stage_options(stage, system, multi.then_some(chunk.chunk_id), scope);
            let call = self.model_stage(stage, input, opts);
            let result = self.run_stage(stage, id, call).await;
            upstream = match &result.output {
                Some(StageOutput::Json(v)) => Some(v.clone()),
                Some(StageOutput::Text(t)) => Some(Value::String(t.clone())),
                _ => None,
            };
            run.stages.push(result);
        }

        upstream.and_then(|v| match v {
            Value::String(outline) => Some(outline),
            _ => None,
        })
    }

    fn stage_options(
        &self,
        stage: StageId,
        system: Option<&str>,
        chunk_id: Option<usize>,
        scope: &CancelScope,
    ) -> InvokeOptions {
        let label = match chunk_id {
            Some(id) => format!("{}-chunk-{}", stage, id),
            None => stage.to_string(),
        };
        let mut opts = InvokeOptions::new().stage(label).scope(scope.clone());
        if let Some(budget) = self.config.budget.for_stage(stage) {
            opts = opts.max_tokens(budget);
        }
        if let Some(system) = system {
            opts = opts.system_prompt(system);
        }
        if stage == StageId::Write {
            opts = opts.temperature(self.config.writing_temperature);
        }
        opts
    }

    /// One of the model stages 2 to 4, given its upstream output.
    async fn model_stage(&self, stage: StageId, input: Value, opts: InvokeOptions) -> Result<StageOutput> {
        match stage {
            StageId::Extract => {
                let transcript = input.as_str().unwrap_or_default();
                let prompt = prompts::technical_extraction(transcript)?;
                let (value, _) = self.client.invoke_json(&prompt, &opts).await?;
                let value = require_object(stage, value)?;
                match serde_json::from_value::<TechnicalContent>(value.clone()) {
                    Ok(content) => info!(
                        diagnostics = content.diagnostics.len(),
                        solutions = content.solutions.len(),
                        risks = content.risks.len(),
                        "Technical content extracted"
                    ),
                    Err(e) => warn!(error = %e, "Technical content does not match the expected shape"),
                }
                Ok(StageOutput::Json(value))
            }
            StageId::MapSolutions => {
                let prompt = prompts::solution_mapping(&input)?;
                let (value, _) = self.client.invoke_json(&prompt, &opts).await?;
                let value = require_object(stage, value)?;
                match serde_json::from_value::<SolutionMap>(value.clone()) {
                    Ok(map) => info!(
                        problems = map.problem_solution_map.len(),
                        preventive = map.preventive_measures.len(),
                        "Solutions mapped"
                    ),
                    Err(e) => warn!(error = %e, "Solution map does not match the expected shape"),
                }
                Ok(StageOutput::Json(value))
            }
            StageId::Outline => {
                let prompt = prompts::document_outline(&input)?;
                let (text, _) = self.client.invoke(&prompt, &opts).await?;
                Ok(StageOutput::Text(require_text(stage, text)?))
            }
            other => Err(Error::Stage {
                stage: other.number(),
                message: "not a per-chunk model stage".to_string(),
            }),
        }
    }

    async fn write_content(
        &self,
        outline: &str,
        system: Option<&str>,
        scope: &CancelScope,
    ) -> Result<StageOutput> {
        let opts = self.stage_options(StageId::Write, system, None, scope);
        let prompt = prompts::content_writing(outline)?;
        let text = if self.config.stream_writing {
            let received = Mutex::new(0usize);
            let progress = |chunk: &str| {
                let mut total = received.lock().unwrap_or_else(|p| p.into_inner());
                *total += chunk.len();
                debug!(bytes = *total, "Writing stage streaming");
            };
            self.client
                .invoke_streaming(&prompt, &opts, Some(&progress as ChunkCallback<'_>))
                .await?
                .0
        } else {
            self.client.invoke(&prompt, &opts).await?.0
        };
        Ok(StageOutput::Text(require_text(StageId::Write, text)?))
    }

    /// Time a stage and turn its outcome into a [`StageResult`].
    ///
    /// Usage is the growth of the client's running total across the stage, so
    /// calls that fail after the model answered (malformed JSON) still count.
    async fn run_stage<F>(&self, stage: StageId, chunk_id: Option<usize>, fut: F) -> StageResult
    where
        F: Future<Output = Result<StageOutput>>,
    {
        let started = Instant::now();
        let before = self.client.total_usage();
        let outcome = fut.await;
        let usage = self.client.total_usage().since(&before);
        let duration = started.elapsed();

        match outcome {
            Ok(output) => {
                info!(
                    stage = stage.number(),
                    chunk_id = ?chunk_id,
                    tokens = usage.total(),
                    duration_secs = duration.as_secs_f64(),
                    "{} complete",
                    stage.name()
                );
                StageResult::success(stage, chunk_id, output, usage, duration)
            }
            Err(e) => {
                error!(stage = stage.number(), chunk_id = ?chunk_id, error = %e, "{} failed", stage.name());
                StageResult::failed(stage, chunk_id, e.to_string(), usage, duration)
            }
        }
    }

    async fn write_outputs(
        &self,
        execution_id: &str,
        markdown: &str,
        bucket: &str,
        scope: &CancelScope,
    ) -> Result<ArtifactLocations> {
        let generated_at = Utc::now().to_rfc3339();
        let markdown_location = ObjectLocation::new(bucket, format!("{}/document.md", execution_id));
        let document_location = ObjectLocation::new(
            bucket,
            format!("{}/document.{}", execution_id, self.renderer.extension()),
        );

        let mut md_meta = ObjectMetadata::new();
        md_meta.insert("execution_id".into(), execution_id.to_string());
        md_meta.insert("generated_at".into(), generated_at.clone());
        md_meta.insert("content_length".into(), markdown.chars().count().to_string());
        scope
            .run(self.store.put(
                &markdown_location,
                Bytes::from(markdown.to_string()),
                "text/markdown",
                md_meta,
            ))
            .await??;
        info!(uri = %markdown_location, "Markdown saved");

        let rendered = self.renderer.render(markdown, &document_title(markdown, execution_id))?;
        let mut doc_meta = ObjectMetadata::new();
        doc_meta.insert("execution_id".into(), execution_id.to_string());
        doc_meta.insert("generated_at".into(), generated_at);
        scope
            .run(self.store.put(
                &document_location,
                Bytes::from(rendered),
                self.renderer.content_type(),
                doc_meta,
            ))
            .await??;
        info!(uri = %document_location, "Rendered document saved");

        Ok(ArtifactLocations {
            markdown: markdown_location,
            document: document_location,
        })
    }

    async fn enter(&self, run: &mut Run<'_>, next: PipelineState) {
        if !run.state.can_transition_to(&next) {
            warn!(execution_id = run.execution_id, from = %run.state, to = %next, "Unexpected state transition");
        }
        debug!(execution_id = run.execution_id, from = %run.state, to = %next, "Pipeline state");
        run.state = next;
        self.report_state(run).await;
    }

    async fn report_state(&self, run: &Run<'_>) {
        if run.state.is_terminal() {
            return;
        }
        let update = ProgressUpdate::processing().with_stage(run.state.to_string());
        report_best_effort(self.reporter.as_ref(), run.execution_id, update).await;
    }

    async fn fail(&self, mut run: Run<'_>, err: Error) -> PipelineResult {
        self.enter(&mut run, PipelineState::Failed).await;
        let usage = self.client.total_usage().since(&run.usage_before);
        error!(execution_id = run.execution_id, error = %err, "Document generation failed");
        PipelineResult {
            execution_id: run.execution_id.to_string(),
            status: RunStatus::Failed,
            final_content: None,
            markdown_location: None,
            document_location: None,
            total_usage: usage,
            cost_usd: usage.cost(self.client.pricing()),
            duration: run.started.elapsed(),
            stages: run.stages,
            chunks_processed: run.chunks,
            final_state: PipelineState::Failed,
            error: Some(err.to_string()),
        }
    }
}

fn require_object(stage: StageId, value: Value) -> Result<Value> {
    if value.is_object() {
        Ok(value)
    } else {
        Err(Error::MalformedOutput {
            message: format!("stage {} expected a JSON object", stage.number()),
            raw: value.to_string(),
        })
    }
}

fn require_text(stage: StageId, text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(Error::Stage {
            stage: stage.number(),
            message: "model returned an empty response".to_string(),
        });
    }
    Ok(text)
}

/// First level-one heading, or a generic title.
fn document_title(markdown: &str, execution_id: &str) -> String {
    markdown
        .lines()
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("Technical Document {}", execution_id))
}
