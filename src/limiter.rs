//! Shared request pacing with exponential backoff.
//!
//! One [`RateController`] is created per harvest run and passed by [`Arc`] to
//! every component that issues an upstream request. It enforces a global
//! in-flight ceiling, a minimum jittered inter-request interval, and a shared
//! backoff window that slows all callers once any of them observes a
//! throttling signal.

use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};

/// Pacing and backoff tuning for a [`RateController`].
#[derive(Debug, Clone)]
pub struct PacerConfig {
    /// Maximum number of requests allowed in flight at once
    pub max_in_flight: usize,
    /// Minimum delay between consecutive request starts
    pub min_interval: Duration,
    /// Upper bound of the random jitter added to each interval
    pub jitter: Duration,
    /// First backoff delay after a throttling signal
    pub initial_backoff: Duration,
    /// Cap on the exponential backoff delay
    pub max_backoff: Duration,
    /// Consecutive throttling signals after which callers must stop retrying
    pub failure_ceiling: u32,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            min_interval: Duration::from_millis(280),
            jitter: Duration::from_millis(120),
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(120),
            failure_ceiling: 8,
        }
    }
}

impl PacerConfig {
    /// A controller configuration with no pacing delays, for tests.
    pub fn fast() -> Self {
        Self {
            max_in_flight: 64,
            min_interval: Duration::ZERO,
            jitter: Duration::ZERO,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            failure_ceiling: 8,
        }
    }
}

/// Rate controller errors.
#[derive(Debug, thiserror::Error)]
pub enum PacerError {
    /// Failed to acquire a request credit
    #[error("failed to acquire request credit: {0}")]
    Acquire(String),
}

/// Permit for one outbound request. Dropping it releases the in-flight slot.
pub struct RequestPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
struct PacerState {
    next_slot: Instant,
    hold_until: Instant,
}

/// Shared pacing and backoff state for all outbound requests.
///
/// Backoff is process-wide: one caller's observed throttling slows every
/// caller, approximating respectful pacing against a single upstream origin.
#[derive(Debug)]
pub struct RateController {
    semaphore: Arc<Semaphore>,
    state: Mutex<PacerState>,
    consecutive_failures: AtomicU32,
    cfg: PacerConfig,
}

impl RateController {
    /// Create a new controller.
    pub fn new(cfg: PacerConfig) -> Self {
        let now = Instant::now();
        Self {
            semaphore: Arc::new(Semaphore::new(cfg.max_in_flight)),
            state: Mutex::new(PacerState {
                next_slot: now,
                hold_until: now,
            }),
            consecutive_failures: AtomicU32::new(0),
            cfg,
        }
    }

    /// Create a new shared controller wrapped in [`Arc`].
    pub fn shared(cfg: PacerConfig) -> Arc<Self> {
        Arc::new(Self::new(cfg))
    }

    /// Wait for a request credit and for the next pacing slot.
    ///
    /// The returned permit must be held for the duration of the request so
    /// the in-flight ceiling stays accurate.
    pub async fn acquire(&self) -> Result<RequestPermit, PacerError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| PacerError::Acquire(e.to_string()))?;

        let wake = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let earliest = state.next_slot.max(state.hold_until).max(now);
            state.next_slot = earliest + self.cfg.min_interval + self.jitter();
            earliest
        };
        sleep_until(wake).await;

        Ok(RequestPermit { _permit: permit })
    }

    /// Record a successful request, resetting the consecutive-failure count.
    pub fn report_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// Record a throttling or blocking signal.
    ///
    /// Extends the shared hold window by the next exponential backoff delay
    /// and returns the new consecutive-failure count. Callers compare the
    /// count against [`RateController::ceiling_exceeded`] to decide whether
    /// to escalate to a terminal failure instead of retrying.
    pub async fn report_throttled(&self) -> u32 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.backoff_delay(failures);

        let mut state = self.state.lock().await;
        let hold = Instant::now() + delay;
        if hold > state.hold_until {
            state.hold_until = hold;
        }
        failures
    }

    /// Whether consecutive throttling signals have reached the ceiling.
    pub fn ceiling_exceeded(&self) -> bool {
        self.consecutive_failures.load(Ordering::SeqCst) >= self.cfg.failure_ceiling
    }

    /// Exponential backoff delay for the given 1-indexed attempt, with up to
    /// 25% random jitter added below the cap.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .cfg
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16)));
        let capped = exp.min(self.cfg.max_backoff);

        let jitter_ms = (capped.as_millis() as u64) / 4;
        if jitter_ms == 0 {
            return capped;
        }
        capped + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.cfg.jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
