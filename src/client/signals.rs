use crate::resilience::circuit_breaker::CircuitBreakerSnapshot;
use crate::resilience::rate_limiter::RateLimiterSnapshot;
use crate::tokens::TokenUsage;
use serde::Serialize;

/// Point-in-time view of a client's resilience state and spend.
///
/// Facts only; callers decide what to do with them.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSignals {
    pub total_usage: TokenUsage,
    pub total_cost: f64,
    pub rate_limiter: RateLimiterSnapshot,
    pub circuit_breaker: Option<CircuitBreakerSnapshot>,
}
