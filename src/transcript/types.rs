use serde::{Deserialize, Serialize};

/// A run of words by one speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub speaker: Option<String>,
    /// Mean confidence of the words in the segment.
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMetadata {
    pub job_name: String,
    pub account_id: String,
    pub status: String,
    pub language_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedTranscript {
    pub full_text: String,
    pub segments: Vec<TranscriptSegment>,
    /// Sorted, unique speaker labels.
    pub speakers: Vec<String>,
    pub metadata: TranscriptMetadata,
}

impl ParsedTranscript {
    /// Segment texts joined with single spaces.
    pub fn joined_text(&self) -> String {
        join_segments(&self.segments)
    }

    pub fn duration(&self) -> f64 {
        match (self.segments.first(), self.segments.last()) {
            (Some(first), Some(last)) => (last.end_time - first.start_time).max(0.0),
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub is_single_chunk: bool,
    pub num_segments: usize,
    pub avg_confidence: f64,
    /// Leading segments copied from the end of the previous chunk.
    pub overlap_segments: usize,
    pub overlap_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub chunk_id: usize,
    pub total_chunks: usize,
    pub text: String,
    pub token_count: usize,
    pub segments: Vec<TranscriptSegment>,
    /// Sorted, unique speaker labels present in this chunk.
    pub speakers: Vec<String>,
    pub time_range: (f64, f64),
    pub metadata: ChunkMetadata,
}

impl TranscriptChunk {
    /// Segments this chunk owns, without the overlap prefix.
    pub fn own_segments(&self) -> &[TranscriptSegment] {
        let skip = self.metadata.overlap_segments.min(self.segments.len());
        &self.segments[skip..]
    }

    /// Chunk text without the overlap prefix.
    pub fn text_without_overlap(&self) -> String {
        join_segments(self.own_segments())
    }
}

pub(crate) fn join_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
