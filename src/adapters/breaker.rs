//! Per-adapter circuit breaker.
//!
//! Opens after a threshold of failures inside a sliding window, stays open
//! for a cooldown, then admits a single half-open probe. State is shared
//! process-wide per adapter and updated under a brief lock.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: VecDeque<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Windowed circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, threshold: u32, window_ms: u64, cooldown_ms: u64) -> Self {
        CircuitBreaker {
            name,
            threshold,
            window: Duration::milliseconds(window_ms as i64),
            cooldown: Duration::milliseconds(cooldown_ms as i64),
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether a call may proceed right now. An open circuit transitions to
    /// half-open once the cooldown has elapsed and then admits exactly one
    /// probe.
    pub fn allow(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|at| now - at >= self.cooldown)
                    .unwrap_or(true);
                if !cooled_down {
                    return false;
                }

                adapter_info!("(allow) [{}] breaker half-open, probing.", self.name);
                inner.state = BreakerState::HalfOpen;
                inner.probe_in_flight = true;
                true
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    return false;
                }

                inner.probe_in_flight = true;
                true
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            adapter_info!("(record_success) [{}] breaker closed.", self.name);
        }

        inner.state = BreakerState::Closed;
        inner.failures.clear();
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.lock();

        // a failed half-open probe reopens immediately
        if inner.state == BreakerState::HalfOpen {
            adapter_warn!("(record_failure) [{}] probe failed, breaker reopened.", self.name);
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
            inner.probe_in_flight = false;
            return;
        }

        inner.failures.push_back(now);
        let window = self.window;
        while let Some(&front) = inner.failures.front() {
            if now - front > window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }

        if inner.state == BreakerState::Closed && inner.failures.len() as u32 >= self.threshold {
            adapter_warn!(
                "(record_failure) [{}] {} failures in window, breaker open.",
                self.name,
                inner.failures.len()
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_opens_after_threshold) Start.");

        let breaker = CircuitBreaker::new("flights", 5, 60_000, 60_000);
        let now = t0();
        for _ in 0..4 {
            breaker.record_failure(now);
            assert!(breaker.allow(now));
        }

        breaker.record_failure(now);
        assert!(!breaker.allow(now));

        ut_info!("(test_opens_after_threshold) Success.");
    }

    #[tokio::test]
    async fn test_window_expires_failures() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_window_expires_failures) Start.");

        let breaker = CircuitBreaker::new("flights", 5, 60_000, 60_000);
        let now = t0();
        for i in 0..4 {
            breaker.record_failure(now + Duration::seconds(i));
        }

        // the early failures have left the window by now
        breaker.record_failure(now + Duration::seconds(120));
        assert!(breaker.allow(now + Duration::seconds(120)));

        ut_info!("(test_window_expires_failures) Success.");
    }

    #[tokio::test]
    async fn test_half_open_single_probe() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_half_open_single_probe) Start.");

        let breaker = CircuitBreaker::new("weather", 1, 60_000, 60_000);
        let now = t0();
        breaker.record_failure(now);
        assert!(!breaker.allow(now));

        // cooldown elapsed: exactly one probe is admitted
        let later = now + Duration::seconds(61);
        assert!(breaker.allow(later));
        assert!(!breaker.allow(later));

        // probe failure reopens; probe success closes
        breaker.record_failure(later);
        assert!(!breaker.allow(later + Duration::seconds(1)));

        let even_later = later + Duration::seconds(61);
        assert!(breaker.allow(even_later));
        breaker.record_success();
        assert!(breaker.allow(even_later));
        assert!(breaker.allow(even_later));

        ut_info!("(test_half_open_single_probe) Success.");
    }
}
