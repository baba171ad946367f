//! Token estimation and cost accounting.
//!
//! # Token Counting and Cost Module
//!
//! Every budget in the pipeline (chunk sizes, overlap, rate-limiter admission,
//! usage totals) is expressed in *estimated* tokens. The estimate is the fixed
//! `characters / 4` heuristic: it is documented as approximate, and it must stay
//! identical everywhere so stage budgets remain comparable between runs.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`TokenCounter`] | Trait for token counting implementations |
//! | [`CharacterEstimator`] | Integer `chars / 4` approximation |
//! | [`estimate_tokens`] | Shorthand for the default estimator |
//! | [`TokenUsage`] | Append-only input/output token accumulator |
//! | [`ModelPricing`] | Per-1K token prices used to derive cost |
//!
//! ## Example
//!
//! ```rust
//! use transcript_docgen::tokens::{estimate_tokens, ModelPricing, TokenUsage};
//!
//! let mut usage = TokenUsage::new(estimate_tokens("Explain the deployment step"), 0);
//! usage.add(&TokenUsage::new(0, 1200));
//! let cost = usage.cost(&ModelPricing::default());
//! assert!(cost > 0.0);
//! ```

mod counter;
mod pricing;

pub use counter::{estimate_tokens, CharacterEstimator, TokenCounter, CHARS_PER_TOKEN};
pub use pricing::{ModelPricing, TokenUsage};
