use crate::cancel::CancelScope;
use crate::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::info;

/// Length of the trailing admission window.
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
    /// Requests admitted within the trailing window.
    pub requests_in_window: usize,
    /// Estimated tokens admitted within the trailing window.
    pub tokens_in_window: u64,
    /// Estimated wait until another request would be admitted (ms), if at the request limit.
    pub estimated_wait_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
}

impl RateLimiterConfig {
    /// Create a new config with default values (10 req/min, 100K tokens/min)
    pub fn new() -> Self {
        Self {
            requests_per_minute: 10,
            tokens_per_minute: 100_000,
        }
    }

    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm.max(1);
        self
    }

    pub fn with_tokens_per_minute(mut self, tpm: u64) -> Self {
        self.tokens_per_minute = tpm.max(1);
        self
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct Window {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

impl Window {
    fn evict(&mut self, now: Instant) {
        while let Some(&t) = self.requests.front() {
            if now.duration_since(t) >= WINDOW {
                self.requests.pop_front();
            } else {
                break;
            }
        }
        while let Some(&(t, _)) = self.tokens.front() {
            if now.duration_since(t) >= WINDOW {
                self.tokens.pop_front();
            } else {
                break;
            }
        }
    }

    fn tokens_used(&self) -> u64 {
        self.tokens.iter().map(|(_, c)| *c).sum()
    }
}

/// Sliding-window admission control for the model endpoint.
///
/// Two budgets are tracked independently over the trailing 60 seconds: a
/// request count and an estimated-token count. [`acquire`](Self::acquire)
/// paces callers by sleeping; it never drops work. The only failure it can
/// report is an interruption of the wait by the caller's [`CancelScope`].
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self {
            cfg,
            window: Mutex::new(Window::default()),
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    /// Wait until admitting a call of `estimated_tokens` stays within both
    /// budgets, then record it.
    ///
    /// The window lock is released while sleeping, so snapshots stay
    /// responsive; the budgets are re-checked after every wake-up.
    pub async fn acquire(&self, estimated_tokens: u64, scope: &CancelScope) -> Result<()> {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                window.evict(now);
                match self.wait_for(&window, now, estimated_tokens) {
                    Some(wait) => wait,
                    None => {
                        window.requests.push_back(now);
                        if estimated_tokens > 0 {
                            window.tokens.push_back((now, estimated_tokens));
                        }
                        return Ok(());
                    }
                }
            };
            scope.sleep(wait).await?;
        }
    }

    /// Time until the oldest entry blocking admission ages out, or `None` when
    /// the call fits now.
    fn wait_for(&self, window: &Window, now: Instant, estimated_tokens: u64) -> Option<Duration> {
        if window.requests.len() >= self.cfg.requests_per_minute as usize {
            if let Some(&oldest) = window.requests.front() {
                let wait = WINDOW.saturating_sub(now.duration_since(oldest));
                if !wait.is_zero() {
                    info!(
                        wait_secs = wait.as_secs_f64(),
                        limit = self.cfg.requests_per_minute,
                        "Request rate limit reached, sleeping"
                    );
                    return Some(wait);
                }
            }
        }

        if window.tokens_used() + estimated_tokens > self.cfg.tokens_per_minute {
            if let Some(&(oldest, _)) = window.tokens.front() {
                let wait = WINDOW.saturating_sub(now.duration_since(oldest));
                if !wait.is_zero() {
                    info!(
                        wait_secs = wait.as_secs_f64(),
                        estimated_tokens,
                        limit = self.cfg.tokens_per_minute,
                        "Token rate limit reached, sleeping"
                    );
                    return Some(wait);
                }
            }
        }
        None
    }

    pub async fn snapshot(&self) -> RateLimiterSnapshot {
        let mut window = self.window.lock().await;
        let now = Instant::now();
        window.evict(now);

        let estimated_wait_ms = if window.requests.len() >= self.cfg.requests_per_minute as usize {
            window
                .requests
                .front()
                .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)).as_millis() as u64)
        } else {
            None
        };

        RateLimiterSnapshot {
            requests_per_minute: self.cfg.requests_per_minute,
            tokens_per_minute: self.cfg.tokens_per_minute,
            requests_in_window: window.requests.len(),
            tokens_in_window: window.tokens_used(),
            estimated_wait_ms,
        }
    }
}
