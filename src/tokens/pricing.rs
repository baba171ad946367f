//! Token usage accumulation and cost derivation.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Input/output token counts. Cost is derived, never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens: input_tokens as u64,
            output_tokens: output_tokens as u64,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    /// Usage accumulated since `earlier` was captured.
    pub fn since(&self, earlier: &TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.saturating_sub(earlier.input_tokens),
            output_tokens: self.output_tokens.saturating_sub(earlier.output_tokens),
        }
    }

    pub fn cost(&self, pricing: &ModelPricing) -> f64 {
        pricing.cost_of(self)
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.add(&rhs);
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), |mut acc, u| {
            acc += u;
            acc
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub model: String,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub currency: String,
}

impl ModelPricing {
    pub fn new(model: &str, input: f64, output: f64) -> Self {
        Self {
            model: model.into(),
            input_cost_per_1k: input,
            output_cost_per_1k: output,
            currency: "USD".into(),
        }
    }

    /// Cost in `currency`, rounded to 4 decimal places.
    pub fn cost_of(&self, usage: &TokenUsage) -> f64 {
        let ic = (usage.input_tokens as f64 / 1000.0) * self.input_cost_per_1k;
        let oc = (usage.output_tokens as f64 / 1000.0) * self.output_cost_per_1k;
        ((ic + oc) * 10_000.0).round() / 10_000.0
    }

    pub fn claude_sonnet() -> Self {
        Self::new("claude-sonnet", 0.003, 0.015)
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::claude_sonnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let mut usage = TokenUsage::new(100, 50);
        usage.add(&TokenUsage::new(10, 5));
        usage += TokenUsage::new(1, 1);
        assert_eq!(usage.input_tokens, 111);
        assert_eq!(usage.output_tokens, 56);
        assert_eq!(usage.total(), 167);
    }

    #[test]
    fn test_usage_since_snapshot() {
        let before = TokenUsage::new(100, 40);
        let after = TokenUsage::new(350, 90);
        assert_eq!(after.since(&before), TokenUsage::new(250, 50));
    }

    #[test]
    fn test_sum_of_usages() {
        let total: TokenUsage = vec![TokenUsage::new(1, 2), TokenUsage::new(3, 4)]
            .into_iter()
            .sum();
        assert_eq!(total, TokenUsage::new(4, 6));
    }

    #[test]
    fn test_cost_is_pure_function_of_counts() {
        let pricing = ModelPricing::default();
        // 10K input * 0.003 + 2K output * 0.015 = 0.03 + 0.03
        let usage = TokenUsage::new(10_000, 2_000);
        assert!((usage.cost(&pricing) - 0.06).abs() < 1e-9);
        assert_eq!(usage.cost(&pricing), usage.cost(&pricing));
        assert_eq!(TokenUsage::default().cost(&pricing), 0.0);
    }

    #[test]
    fn test_cost_rounds_to_four_places() {
        let pricing = ModelPricing::default();
        // 1 input token = 0.000003 -> rounds to 0
        assert_eq!(TokenUsage::new(1, 0).cost(&pricing), 0.0);
        // 100 output tokens = 0.0015
        assert!((TokenUsage::new(0, 100).cost(&pricing) - 0.0015).abs() < 1e-9);
    }
}
