//! Transcript ingestion: parse a speech-to-text job result into
//! speaker-labeled segments and split them into token-bounded chunks.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Segments, chunks and parsed transcript |
//! | [`parser`] | Job-result JSON to [`ParsedTranscript`] |
//! | [`chunker`] | Speaker/pause-aware chunking with overlap |
//! | [`format`] | `[HH:MM:SS] Speaker: text` rendering |

pub mod chunker;
pub mod format;
pub mod parser;
pub mod types;

pub use chunker::TranscriptChunker;
pub use format::{format_timestamp, format_with_timestamps};
pub use parser::parse_transcript;
pub use types::{ChunkMetadata, ParsedTranscript, TranscriptChunk, TranscriptMetadata, TranscriptSegment};
