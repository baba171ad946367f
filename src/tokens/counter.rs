//! Token counter implementations.

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;

    fn count_all<'a, I>(&self, texts: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
        Self: Sized,
    {
        texts.into_iter().map(|t| self.count(t)).sum()
    }
}

/// Character-count approximation: `chars / 4`, rounded down.
///
/// Counts Unicode scalar values rather than bytes so accented transcripts are
/// not over-estimated.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterEstimator;

impl CharacterEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl TokenCounter for CharacterEstimator {
    fn count(&self, text: &str) -> usize {
        text.chars().count() / CHARS_PER_TOKEN
    }
}

/// Estimate tokens with the crate-wide heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    CharacterEstimator.count(text)
}
