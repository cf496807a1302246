//! Circuit breaker shared by the HTTP providers.
//!
//! A hard block (HTTP 403 / IP ban) trips the breaker immediately; repeated
//! soft failures (429, 5xx, timeouts) trip it after a threshold. While open,
//! all requests are refused until the cooldown elapses, at which point the
//! breaker closes itself on the next check.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct BreakerState {
    tripped_at: Option<Instant>,
    consecutive_failures: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    cooldown: Duration,
    failure_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration, failure_threshold: u32) -> Self {
        Self {
            state: Mutex::new(BreakerState {
                tripped_at: None,
                consecutive_failures: 0,
            }),
            cooldown,
            failure_threshold,
        }
    }

    /// Default for external quote providers: 30-minute cooldown, trips after
    /// 3 consecutive soft failures.
    pub fn default_provider() -> Self {
        Self::new(Duration::from_secs(30 * 60), 3)
    }

    /// Whether a request may be issued right now.
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.tripped_at {
            None => true,
            Some(at) if at.elapsed() >= self.cooldown => {
                state.tripped_at = None;
                state.consecutive_failures = 0;
                true
            }
            Some(_) => false,
        }
    }

    pub fn on_success(&self) {
        self.state.lock().unwrap().consecutive_failures = 0;
    }

    /// Record a soft failure; trips the breaker once the threshold is hit.
    pub fn on_failure(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            state.tripped_at = Some(Instant::now());
        }
    }

    /// Trip immediately (hard block from the provider).
    pub fn trip(&self) {
        self.state.lock().unwrap().tripped_at = Some(Instant::now());
    }

    /// Remaining cooldown, zero when closed.
    pub fn remaining_cooldown(&self) -> Duration {
        match self.state.lock().unwrap().tripped_at {
            None => Duration::ZERO,
            Some(at) => self.cooldown.saturating_sub(at.elapsed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_closed() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        assert!(cb.allow());
    }

    #[test]
    fn trips_after_threshold_soft_failures() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.on_failure();
        cb.on_failure();
        assert!(cb.allow());
        cb.on_failure();
        assert!(!cb.allow());
    }

    #[test]
    fn hard_trip_is_immediate() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.trip();
        assert!(!cb.allow());
        assert!(cb.remaining_cooldown() > Duration::ZERO);
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new(Duration::from_secs(60), 3);
        cb.on_failure();
        cb.on_failure();
        cb.on_success();
        cb.on_failure();
        assert!(cb.allow());
    }

    #[test]
    fn closes_after_cooldown() {
        let cb = CircuitBreaker::new(Duration::from_millis(10), 3);
        cb.trip();
        assert!(!cb.allow());
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.allow());
    }
}
