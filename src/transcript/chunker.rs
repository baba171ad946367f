use super::format::format_with_timestamps;
use super::parser::{parse_transcript, parse_transcript_bytes};
use super::types::{join_segments, ChunkMetadata, ParsedTranscript, TranscriptChunk, TranscriptSegment};
use crate::tokens::{CharacterEstimator, TokenCounter};
use crate::Result;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::info;

pub const DEFAULT_MAX_TOKENS_PER_CHUNK: usize = 100_000;

/// Seconds of silence that make a natural break.
const PAUSE_SECS: f64 = 5.0;
/// Fraction of the even-share target after which a speaker change splits.
const SPEAKER_BREAK_RATIO: f64 = 0.8;
/// Fraction of the even-share target after which a long pause splits.
const PAUSE_BREAK_RATIO: f64 = 0.5;

/// Splits transcripts into chunks of at most `max_tokens` estimated tokens.
///
/// Splits prefer natural breaks: a speaker change once the chunk holds 80% of
/// its even share of the transcript, or a pause longer than five seconds once
/// it holds half. Every chunk after the first starts with the longest suffix
/// of its predecessor that fits in 10% of `max_tokens`.
#[derive(Debug, Clone)]
pub struct TranscriptChunker {
    max_tokens: usize,
    overlap_tokens: usize,
    counter: CharacterEstimator,
}

impl Default for TranscriptChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS_PER_CHUNK)
    }
}

impl TranscriptChunker {
    pub fn new(max_tokens_per_chunk: usize) -> Self {
        let max_tokens = max_tokens_per_chunk.max(1);
        Self {
            max_tokens,
            overlap_tokens: max_tokens / 10,
            counter: CharacterEstimator,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    pub fn parse(&self, raw: &Value) -> Result<ParsedTranscript> {
        parse_transcript(raw)
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<ParsedTranscript> {
        parse_transcript_bytes(bytes)
    }

    pub fn format_with_timestamps(&self, segments: &[TranscriptSegment]) -> String {
        format_with_timestamps(segments, true)
    }

    fn tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Chunk a parsed transcript. Always returns at least one chunk.
    pub fn chunk(&self, parsed: &ParsedTranscript) -> Vec<TranscriptChunk> {
        let text = if parsed.full_text.is_empty() {
            parsed.joined_text()
        } else {
            parsed.full_text.clone()
        };
        let total_tokens = self.tokens(&text);
        info!(total_tokens, max_tokens = self.max_tokens, "Chunking transcript");

        if total_tokens <= self.max_tokens || parsed.segments.is_empty() {
            info!("Transcript fits in a single chunk");
            return vec![TranscriptChunk {
                chunk_id: 0,
                total_chunks: 1,
                token_count: total_tokens,
                text,
                segments: parsed.segments.clone(),
                speakers: parsed.speakers.clone(),
                time_range: time_range(&parsed.segments),
                metadata: ChunkMetadata {
                    is_single_chunk: true,
                    num_segments: parsed.segments.len(),
                    avg_confidence: avg_confidence(&parsed.segments),
                    overlap_segments: 0,
                    overlap_tokens: 0,
                },
            }];
        }

        self.adaptive_chunks(&parsed.segments, total_tokens)
    }

    fn adaptive_chunks(&self, segments: &[TranscriptSegment], total_tokens: usize) -> Vec<TranscriptChunk> {
        let planned = total_tokens.div_ceil(self.max_tokens);
        let target = (total_tokens / planned) as f64;
        info!(planned_chunks = planned, target_tokens = target, "Applying adaptive chunking");

        // (segments, overlap count) per chunk, numbered once the count is known.
        let mut groups: Vec<(Vec<TranscriptSegment>, usize)> = Vec::new();
        let mut current: Vec<TranscriptSegment> = Vec::new();
        let mut current_overlap = 0usize;
        let mut current_tokens = 0usize;

        for (i, segment) in segments.iter().enumerate() {
            let segment_tokens = self.tokens(&segment.text);
            let previous = i.checked_sub(1).map(|p| &segments[p]);
            let filled = current_tokens as f64;

            let over_budget = current_tokens + segment_tokens > self.max_tokens;
            let speaker_break = filled >= target * SPEAKER_BREAK_RATIO
                && previous.is_some_and(|p| p.speaker != segment.speaker);
            let pause_break = filled >= target * PAUSE_BREAK_RATIO
                && previous.is_some_and(|p| segment.start_time - p.end_time > PAUSE_SECS);

            // A chunk must own at least one segment beyond its overlap.
            if (over_budget || speaker_break || pause_break) && current.len() > current_overlap {
                let overlap = self.overlap_suffix(&current);
                current_tokens = overlap.iter().map(|s| self.tokens(&s.text)).sum();
                let next_overlap = overlap.len();
                groups.push((std::mem::replace(&mut current, overlap), current_overlap));
                current_overlap = next_overlap;
            }

            current.push(segment.clone());
            current_tokens += segment_tokens;
        }
        if !current.is_empty() {
            groups.push((current, current_overlap));
        }

        let total_chunks = groups.len();
        info!(chunks = total_chunks, "Created chunks");

        groups
            .into_iter()
            .enumerate()
            .map(|(chunk_id, (segments, overlap_segments))| {
                self.build_chunk(chunk_id, total_chunks, segments, overlap_segments)
            })
            .collect()
    }

    /// Longest suffix whose estimated tokens fit in the overlap allowance.
    fn overlap_suffix(&self, segments: &[TranscriptSegment]) -> Vec<TranscriptSegment> {
        let mut tokens = 0usize;
        let mut start = segments.len();
        for (i, segment) in segments.iter().enumerate().rev() {
            let t = self.tokens(&segment.text);
            if tokens + t > self.overlap_tokens {
                break;
            }
            tokens += t;
            start = i;
        }
        segments[start..].to_vec()
    }

    fn build_chunk(
        &self,
        chunk_id: usize,
        total_chunks: usize,
        segments: Vec<TranscriptSegment>,
        overlap_segments: usize,
    ) -> TranscriptChunk {
        let text = join_segments(&segments);
        let overlap_tokens = segments[..overlap_segments.min(segments.len())]
            .iter()
            .map(|s| self.tokens(&s.text))
            .sum();
        let speakers = segments
            .iter()
            .filter_map(|s| s.speaker.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        TranscriptChunk {
            chunk_id,
            total_chunks,
            token_count: self.tokens(&text),
            text,
            speakers,
            time_range: time_range(&segments),
            metadata: ChunkMetadata {
                is_single_chunk: false,
                num_segments: segments.len(),
                avg_confidence: avg_confidence(&segments),
                overlap_segments,
                overlap_tokens,
            },
            segments,
        }
    }
}

fn time_range(segments: &[TranscriptSegment]) -> (f64, f64) {
    match (segments.first(), segments.last()) {
        (Some(first), Some(last)) => (first.start_time, last.end_time),
        _ => (0.0, 0.0),
    }
}

fn avg_confidence(segments: &[TranscriptSegment]) -> f64 {
    if segments.is_empty() {
        return 0.0;
    }
    segments.iter().map(|s| s.confidence).sum::<f64>() / segments.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(text: String, start: f64, end: f64, speaker: &str) -> TranscriptSegment {
        TranscriptSegment {
            text,
            start_time: start,
            end_time: end,
            speaker: Some(speaker.to_string()),
            confidence: 0.9,
        }
    }

    /// `n` segments of `tokens` estimated tokens each, one second apart.
    fn transcript(n: usize, tokens: usize, speaker_every: usize) -> ParsedTranscript {
        let segments: Vec<_> = (0..n)
            .map(|i| {
                let speaker = if speaker_every == 0 {
                    "spk_0".to_string()
                } else {
                    format!("spk_{}", (i / speaker_every) % 2)
                };
                seg(
                    format!("{:0>width$}", i, width = tokens * 4),
                    i as f64,
                    i as f64 + 0.9,
                    &speaker,
                )
            })
            .collect();
        let mut parsed = ParsedTranscript {
            segments,
            ..Default::default()
        };
        parsed.full_text = parsed.joined_text();
        parsed.speakers = parsed
            .segments
            .iter()
            .filter_map(|s| s.speaker.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        parsed
    }

    fn reconstruct(chunks: &[TranscriptChunk]) -> String {
        chunks
            .iter()
            .map(TranscriptChunk::text_without_overlap)
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_small_transcript_is_single_chunk() {
        let parsed = transcript(10, 10, 0);
        let chunks = TranscriptChunker::new(1_000).chunk(&parsed);
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.total_chunks, 1);
        assert_eq!(chunk.segments.len(), 10);
        assert_eq!(chunk.metadata.overlap_segments, 0);
        assert!(chunk.metadata.is_single_chunk);
        assert_eq!(chunk.text, parsed.full_text);
        assert_eq!(chunk.time_range.0, 0.0);
        assert!((chunk.time_range.1 - 9.9).abs() < 1e-9);
    }

    #[test]
    fn test_empty_transcript_is_single_empty_chunk() {
        let chunks = TranscriptChunker::new(100).chunk(&ParsedTranscript::default());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].segments.is_empty());
        assert_eq!(chunks[0].time_range, (0.0, 0.0));
    }

    #[test]
    fn test_large_transcript_respects_budget_and_overlap() {
        // 48 segments x 50 tokens (+ separators) is about 2.4x a 1000-token max.
        let parsed = transcript(48, 50, 0);
        let chunker = TranscriptChunker::new(1_000);
        let chunks = chunker.chunk(&parsed);

        assert!(chunks.len() >= 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_id, i);
            assert_eq!(chunk.total_chunks, chunks.len());
            let own: usize = chunk
                .own_segments()
                .iter()
                .map(|s| estimate(&s.text))
                .sum();
            assert!(own <= 1_000, "chunk {i} owns {own} tokens");
            if i == 0 {
                assert_eq!(chunk.metadata.overlap_segments, 0);
            } else {
                assert!(chunk.metadata.overlap_segments > 0);
                assert!(chunk.metadata.overlap_tokens <= 100);
            }
        }
        assert_eq!(reconstruct(&chunks), parsed.joined_text());
    }

    #[test]
    fn test_overlap_is_suffix_of_previous_chunk() {
        let parsed = transcript(60, 40, 0);
        let chunks = TranscriptChunker::new(800).chunk(&parsed);
        for pair in chunks.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let n = next.metadata.overlap_segments;
            assert_eq!(&next.segments[..n], &prev.segments[prev.segments.len() - n..]);
        }
    }

    #[test]
    fn test_speaker_change_splits_near_target() {
        // Speaker flips every 5 segments; 20-token segments, max 300 tokens.
        let parsed = transcript(40, 20, 5);
        let chunks = TranscriptChunker::new(300).chunk(&parsed);
        assert!(chunks.len() >= 3);
        for chunk in &chunks[..chunks.len() - 1] {
            let own = chunk.own_segments();
            let next_first_index = parsed
                .segments
                .iter()
                .position(|s| s == own.last().unwrap())
                .unwrap()
                + 1;
            let next = &parsed.segments[next_first_index];
            let last = own.last().unwrap();
            // Closed either on a speaker boundary or because the budget ran out.
            let tokens: usize = chunk.segments.iter().map(|s| estimate(&s.text)).sum();
            assert!(last.speaker != next.speaker || tokens + 20 > 300);
        }
        assert_eq!(reconstruct(&chunks), parsed.joined_text());
    }

    #[test]
    fn test_long_pause_splits_after_half_target() {
        let mut parsed = transcript(30, 20, 0);
        // A 30 second silence before segment 12.
        for seg in parsed.segments.iter_mut().skip(12) {
            seg.start_time += 30.0;
            seg.end_time += 30.0;
        }
        parsed.full_text = parsed.joined_text();
        // About 607 tokens with a 400 max: 2 planned chunks, target 303.
        let chunks = TranscriptChunker::new(400).chunk(&parsed);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].segments.len(), 12);
        assert!((chunks[0].time_range.1 - 11.9).abs() < 1e-9);
    }

    #[test]
    fn test_oversized_segment_after_overlap_does_not_emit_overlap_only_chunk() {
        let mut parsed = transcript(10, 50, 0);
        parsed.segments[6].text = "x".repeat(4 * 950);
        parsed.full_text = parsed.joined_text();
        let chunks = TranscriptChunker::new(1_000).chunk(&parsed);
        for chunk in &chunks {
            assert!(!chunk.own_segments().is_empty());
        }
        assert_eq!(reconstruct(&chunks), parsed.joined_text());
    }

    #[test]
    fn test_format_delegates_to_timestamp_renderer() {
        let parsed = transcript(2, 1, 0);
        let out = TranscriptChunker::default().format_with_timestamps(&parsed.segments);
        assert_eq!(out, "[00:00:00] spk_0: 0000\n[00:00:01] spk_0: 0001");
    }

    fn estimate(text: &str) -> usize {
        crate::tokens::estimate_tokens(text)
    }
}
