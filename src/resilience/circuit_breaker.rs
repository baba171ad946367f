use crate::error_code::DEFAULT_QUOTA_SIGNATURES;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub timeout_secs: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    /// Error names/message fragments that count as quota failures.
    pub expected_signatures: Vec<String>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(300),
            expected_signatures: DEFAULT_QUOTA_SIGNATURES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_expected_signatures<I, S>(mut self, signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_signatures = signatures.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug)]
struct State {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// Three-state gate in front of the model endpoint.
///
/// Only errors matching one of the configured quota signatures are counted;
/// everything else passes through untouched. After `failure_threshold`
/// consecutive quota failures the breaker opens and rejects calls with
/// [`Error::CircuitOpen`] until `timeout` has elapsed since the last failure.
/// The next call after that is a single half-open trial whose outcome either
/// closes the breaker or opens it again.
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
}

/// Clears the half-open trial slot if the trial future is dropped mid-flight.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(State {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_at: None,
                last_success_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic in another holder; every
        // mutation is a handful of field writes.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` if the breaker admits it, recording the outcome.
    ///
    /// The error `f` returns is always handed back unchanged.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let trial = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            armed: trial,
        };

        let outcome = f().await;
        guard.armed = false;

        match &outcome {
            Ok(_) => self.on_success(),
            Err(e) if self.is_expected(e) => self.on_failure(e),
            Err(_) => self.on_unrelated_failure(),
        }
        outcome
    }

    /// Whether `err` matches one of the configured quota signatures.
    ///
    /// Matching is by exact error name or by substring of the message, so it is
    /// as fuzzy as the provider's error wording.
    pub fn is_expected(&self, err: &Error) -> bool {
        if matches!(err, Error::CircuitOpen { .. }) || err.is_interruption() {
            return false;
        }
        let (name, message) = err.signature();
        self.cfg
            .expected_signatures
            .iter()
            .any(|sig| name == *sig || message.contains(sig.as_str()))
    }

    /// Returns `Ok(true)` when the admitted call is the half-open trial.
    fn admit(&self) -> Result<bool> {
        let mut st = self.lock();
        match st.state {
            BreakerState::Closed => Ok(false),
            BreakerState::Open => {
                let elapsed = st
                    .last_failure
                    .map(|at| Instant::now().duration_since(at))
                    .unwrap_or(self.cfg.timeout);
                if elapsed >= self.cfg.timeout {
                    st.state = BreakerState::HalfOpen;
                    st.trial_in_flight = true;
                    info!(
                        failure_count = st.failure_count,
                        "Circuit breaker entering HALF_OPEN state"
                    );
                    Ok(true)
                } else {
                    Err(Error::CircuitOpen {
                        remaining: self.cfg.timeout - elapsed,
                        failure_count: st.failure_count,
                    })
                }
            }
            BreakerState::HalfOpen => {
                if st.trial_in_flight {
                    Err(Error::CircuitOpen {
                        remaining: Duration::ZERO,
                        failure_count: st.failure_count,
                    })
                } else {
                    st.trial_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    fn on_success(&self) {
        let mut st = self.lock();
        if st.state == BreakerState::HalfOpen {
            info!("Circuit breaker trial succeeded, CLOSED");
        }
        st.state = BreakerState::Closed;
        st.failure_count = 0;
        st.trial_in_flight = false;
        st.last_success_at = Some(Utc::now());
    }

    fn on_failure(&self, err: &Error) {
        let mut st = self.lock();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure = Some(Instant::now());
        st.last_failure_at = Some(Utc::now());
        st.trial_in_flight = false;

        match st.state {
            BreakerState::HalfOpen => {
                st.state = BreakerState::Open;
                error!(
                    failure_count = st.failure_count,
                    error = %err,
                    "Circuit breaker trial failed, OPEN again"
                );
            }
            BreakerState::Closed if st.failure_count >= self.cfg.failure_threshold => {
                st.state = BreakerState::Open;
                error!(
                    failure_count = st.failure_count,
                    timeout_secs = self.cfg.timeout.as_secs(),
                    error = %err,
                    "Circuit breaker OPEN: model endpoint quota likely exceeded"
                );
            }
            _ => {}
        }
    }

    fn on_unrelated_failure(&self) {
        self.lock().trial_in_flight = false;
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let open_remaining_ms = match (st.state, st.last_failure) {
            (BreakerState::Open, Some(at)) => {
                let elapsed = Instant::now().duration_since(at);
                Some(self.cfg.timeout.saturating_sub(elapsed).as_millis() as u64)
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: st.state,
            failure_count: st.failure_count,
            failure_threshold: self.cfg.failure_threshold,
            timeout_secs: self.cfg.timeout.as_secs(),
            last_failure_time: st.last_failure_at,
            last_success_time: st.last_success_at,
            open_remaining_ms,
        }
    }

    /// Manually open the breaker; the cooldown starts now.
    pub fn force_open(&self) {
        let mut st = self.lock();
        st.state = BreakerState::Open;
        st.last_failure = Some(Instant::now());
        st.last_failure_at = Some(Utc::now());
        st.trial_in_flight = false;
        error!("Circuit breaker manually forced OPEN");
    }

    /// Manually close the breaker and forget past failures.
    pub fn force_reset(&self) {
        let mut st = self.lock();
        st.state = BreakerState::Closed;
        st.failure_count = 0;
        st.last_failure = None;
        st.last_failure_at = None;
        st.trial_in_flight = false;
        info!("Circuit breaker manually reset to CLOSED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_code::ProviderErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn throttled() -> Error {
        Error::provider(ProviderErrorKind::Throttling, "Rate exceeded")
    }

    fn breaker(threshold: u32, timeout_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_timeout(Duration::from_secs(timeout_secs)),
        )
    }

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.expected_signatures.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_rejects_without_calling() {
        let cb = breaker(3, 300);
        let counter = AtomicU32::new(0);
        let calls = &counter;

        for _ in 0..3 {
            let err = cb
                .call(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(throttled())
                })
                .await
                .unwrap_err();
            assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Throttling));
        }
        assert_eq!(cb.state(), BreakerState::Open);

        let err = cb
            .call(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap_err();
        match err {
            Error::CircuitOpen {
                remaining,
                failure_count,
            } => {
                assert_eq!(failure_count, 3);
                assert_eq!(remaining, Duration::from_secs(300));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrelated_errors_do_not_count() {
        let cb = breaker(2, 300);
        for _ in 0..5 {
            let _ = cb
                .call(|| async {
                    Err::<(), _>(Error::provider(ProviderErrorKind::Validation, "bad field"))
                })
                .await;
        }
        let snap = cb.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_substring_counts_as_quota_failure() {
        let cb = breaker(1, 300);
        let _ = cb
            .call(|| async {
                Err::<(), _>(Error::provider_from_signature(
                    "ClientError",
                    "An error occurred (ServiceQuotaExceededException) when calling InvokeModel",
                ))
            })
            .await;
        assert_eq!(cb.state(), BreakerState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_count() {
        let cb = breaker(3, 300);
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(throttled()) }).await;
        }
        cb.call(|| async { Ok(()) }).await.unwrap();
        let _ = cb.call(|| async { Err::<(), _>(throttled()) }).await;

        let snap = cb.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 1);
        assert!(snap.last_success_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let cb = breaker(2, 60);
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), _>(throttled()) }).await;
        }
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(
            cb.call(|| async { Ok(()) }).await,
            Err(Error::CircuitOpen { .. })
        ));
        assert_eq!(cb.snapshot().open_remaining_ms, Some(30_000));

        tokio::time::advance(Duration::from_secs(30)).await;
        cb.call(|| async { Ok(()) }).await.unwrap();

        let snap = cb.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let cb = breaker(1, 10);
        let _ = cb.call(|| async { Err::<(), _>(throttled()) }).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let _ = cb.call(|| async { Err::<(), _>(throttled()) }).await;
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.snapshot().open_remaining_ms, Some(10_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_trial_in_flight() {
        let cb = breaker(1, 10);
        let _ = cb.call(|| async { Err::<(), _>(throttled()) }).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let mut trial = tokio_test::task::spawn(cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }));
        tokio_test::assert_pending!(trial.poll());
        assert_eq!(cb.state(), BreakerState::HalfOpen);

        let second = cb.call(|| async { Ok(()) }).await;
        assert!(matches!(second, Err(Error::CircuitOpen { .. })));

        tokio::time::advance(Duration::from_secs(5)).await;
        tokio_test::assert_ready!(trial.poll()).unwrap();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_the_slot() {
        let cb = breaker(1, 10);
        let _ = cb.call(|| async { Err::<(), _>(throttled()) }).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        {
            let mut trial = tokio_test::task::spawn(cb.call(|| async {
                std::future::pending::<Result<()>>().await
            }));
            tokio_test::assert_pending!(trial.poll());
        }
        cb.call(|| async { Ok(()) }).await.unwrap();
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_open_and_reset() {
        let cb = breaker(5, 300);
        cb.force_open();
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(matches!(
            cb.call(|| async { Ok(()) }).await,
            Err(Error::CircuitOpen { .. })
        ));

        cb.force_reset();
        let snap = cb.snapshot();
        assert_eq!(snap.state, BreakerState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert!(snap.last_failure_time.is_none());
        cb.call(|| async { Ok(()) }).await.unwrap();
    }

    #[test]
    fn test_snapshot_serializes_state_name() {
        let cb = breaker(5, 300);
        let json = serde_json::to_value(cb.snapshot()).unwrap();
        assert_eq!(json["state"], "CLOSED");
        assert_eq!(json["failure_threshold"], 5);
        assert_eq!(json["timeout_secs"], 300);
    }
}
