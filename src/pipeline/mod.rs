//! Staged document generation.
//!
//! ```text
//! transcript ─▶ chunk(s) ─▶ 1 clean ─▶ 2 extract ─▶ 3 map ─▶ 4 outline ─┐
//!                    (per chunk, in order)                               │
//!                                          merge outlines if >1 chunk ◀─┘
//!                                                     │
//!                                   5 write (once) ─▶ 6 store .md + rendered
//! ```
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`orchestrator`] | [`PipelineOrchestrator::generate`], the single entry point |
//! | [`stages`] | Stage ids, tagged stage outputs, typed stage 2/3 payloads |
//! | [`budget`] | Output-token budget per model stage |
//! | [`prompts`] | Tagged prompt layout and stage prompts |
//! | [`merge`] | Multi-chunk outline merge |
//! | [`state`] | Run state machine |
//! | [`result`] | [`PipelineResult`] |
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use transcript_docgen::client::ModelClientBuilder;
//! use transcript_docgen::pipeline::PipelineOrchestrator;
//! use transcript_docgen::storage::LocalObjectStore;
//! use transcript_docgen::transport::{HttpEndpointConfig, HttpModelEndpoint};
//!
//! # async fn run() -> transcript_docgen::Result<()> {
//! let endpoint = HttpModelEndpoint::new(HttpEndpointConfig::new("https://api.example.com"))?;
//! let client = Arc::new(ModelClientBuilder::new(Arc::new(endpoint)).build());
//! let store = Arc::new(LocalObjectStore::new("./data"));
//!
//! let orchestrator = PipelineOrchestrator::new(client, store);
//! let result = orchestrator
//!     .generate("exec-1", "s3://media/transcripts/exec-1.json", "docs")
//!     .await;
//! println!("{}", result.summary());
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod merge;
pub mod orchestrator;
pub mod prompts;
pub mod result;
pub mod stages;
pub mod state;

pub use budget::{StageBudget, DEFAULT_MAX_OUTPUT_TOKENS};
pub use merge::merge_outlines;
pub use orchestrator::{PipelineConfig, PipelineOrchestrator, DEFAULT_WRITING_TEMPERATURE};
pub use prompts::PromptTemplate;
pub use result::{PipelineResult, RunStatus};
pub use stages::{
    ArtifactLocations, SolutionMap, StageId, StageOutput, StageResult, StageStatus,
    TechnicalContent,
};
pub use state::PipelineState;
