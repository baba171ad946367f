//! # Resilience Primitives Module
//!
//! Admission control and failure isolation for calls to the model endpoint.
//! Both primitives belong to a single [`ModelClient`](crate::client::ModelClient)
//! and are never shared process-wide.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Three-state breaker counting quota-signature failures |
//! | [`rate_limiter`] | Sliding 60s window over request and token budgets |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: calls pass through, quota failures are counted
//! - **Open**: calls fail fast with [`Error::CircuitOpen`](crate::Error::CircuitOpen)
//! - **Half-Open**: one trial call decides between Closed and Open
//!
//! ```rust,no_run
//! use transcript_docgen::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> transcript_docgen::Result<()> {
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new()
//!         .with_failure_threshold(5)
//!         .with_timeout(Duration::from_secs(300)),
//! );
//! let answer = breaker.call(|| async { Ok(42) }).await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust,no_run
//! use transcript_docgen::cancel::CancelScope;
//! use transcript_docgen::resilience::rate_limiter::{RateLimiter, RateLimiterConfig};
//!
//! # async fn demo() -> transcript_docgen::Result<()> {
//! let limiter = RateLimiter::new(
//!     RateLimiterConfig::new()
//!         .with_requests_per_minute(10)
//!         .with_tokens_per_minute(100_000),
//! );
//! limiter.acquire(1_200, &CancelScope::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;

pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
