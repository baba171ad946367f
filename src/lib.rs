//! # transcript-docgen
//!
//! Turns a machine-generated speech transcript into a structured technical
//! document through a fixed sequence of model-assisted stages, under token
//! budgets and with a resilient model client in front of the third-party API.
//!
//! ## Overview
//!
//! - **Chunking**: transcripts of any length are split into token-bounded,
//!   speaker- and pause-aware chunks with a small overlap between neighbours.
//! - **Staged pipeline**: clean, extract, map solutions, outline, write, store.
//!   Each model stage gets a fixed share of the output-token ceiling.
//! - **Resilient client**: every model call is rate limited, retried with
//!   exponential backoff and gated by a circuit breaker that opens on
//!   quota-exhaustion storms.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use transcript_docgen::config::ProcessorConfig;
//! use transcript_docgen::processor::Processor;
//!
//! #[tokio::main]
//! async fn main() -> transcript_docgen::Result<()> {
//!     let processor = Processor::from_config(ProcessorConfig::load()?)?;
//!     let response = processor
//!         .handle(&serde_json::json!({
//!             "execution_id": "exec-1",
//!             "transcription_uri": "s3://media/transcripts/exec-1.json",
//!             "video_uri": "s3://media/videos/exec-1.mp4",
//!         }))
//!         .await;
//!     println!("{}", response.body);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`transcript`] | Transcript parsing, chunking and timestamp formatting |
//! | [`pipeline`] | Six-stage orchestrator, budgets, prompts, results |
//! | [`client`] | Model client: retry, usage accounting, JSON output, audit |
//! | [`resilience`] | Rate limiter and circuit breaker |
//! | [`transport`] | Model endpoint trait and the HTTP/SSE implementation |
//! | [`tokens`] | Token estimation and cost |
//! | [`storage`] | Object store trait and backends |
//! | [`render`] | Markdown to secondary document rendering |
//! | [`tracking`] | Progress reporting |
//! | [`config`] | Environment / YAML configuration |
//! | [`processor`] | Event validation and job handling |
//! | [`cancel`] | Cancellation scope and deadlines |

pub mod cancel;
pub mod client;
pub mod config;
pub mod error_code;
pub mod pipeline;
pub mod processor;
pub mod render;
pub mod resilience;
pub mod storage;
pub mod tokens;
pub mod tracking;
pub mod transcript;
pub mod transport;

// Re-export main types for convenience
pub use cancel::CancelScope;
pub use client::{InvokeOptions, ModelClient, ModelClientBuilder};
pub use pipeline::{PipelineOrchestrator, PipelineResult};
pub use transcript::{TranscriptChunk, TranscriptChunker};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream that emits `Result<T>`
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
