//! Per-agent throughput ceiling.
//!
//! [`FixedWindowRateLimiter`] counts requests per agent in fixed,
//! non-overlapping windows. A window opens on the first request after the
//! previous one closed and covers `[started_at, started_at + window)`; once
//! the clock reaches its end the next request starts a fresh window with a
//! fresh count.
//!
//! # Thread Safety
//!
//! All windows live behind one `parking_lot::Mutex`. Increment-and-compare
//! happens inside a single critical section, so two concurrent requests for
//! the same agent can never both observe a count below the ceiling when only
//! one slot remains.
//!
//! # Memory Management
//!
//! Expired windows are swept every `cleanup_interval` calls, bounding the map
//! by the number of agents active within one window.
//!
//! # Scaling
//!
//! State is process-local and never persisted. Each instance of a
//! horizontally scaled deployment enforces its own ceiling. A shared counter
//! can replace this type behind the [`RateLimiter`] trait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::ports::Clock;
use crate::{AgentId, Timestamp};

/// Proof that a request was admitted, naming the window that counted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSlot {
    /// Start of the window the request was counted in.
    pub window_started_at: Timestamp,
}

/// Decides whether an agent may make another request right now.
pub trait RateLimiter: Send + Sync {
    /// Records one request for `agent_id`. Returns the slot it consumed, or
    /// `None` if the agent is over its ceiling.
    fn allow(&self, agent_id: &AgentId) -> Option<RateSlot>;

    /// Hands `slot` back to the window that issued it.
    ///
    /// No-op if that window has since been replaced or has closed.
    fn refund(&self, agent_id: &AgentId, slot: RateSlot);

    /// Time until the agent's current window closes, if known.
    fn retry_after(&self, _agent_id: &AgentId) -> Option<Duration> {
        None
    }
}

/// Configuration for [`FixedWindowRateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per agent per window.
    pub max_requests: u32,

    /// Window length.
    pub window: Duration,

    /// Sweep expired windows every N calls to [`RateLimiter::allow`].
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: crate::config::DEFAULT_RATE_LIMIT_PER_MINUTE,
            window: crate::config::RATE_WINDOW,
            cleanup_interval: 1_000,
        }
    }
}

/// Counter state for one agent's current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// When the window opened.
    pub started_at: Timestamp,
    /// Requests admitted so far in this window.
    pub count: u32,
}

impl RateWindow {
    fn is_expired(&self, now: Timestamp, window: Duration) -> bool {
        now >= self.started_at.saturating_add(window)
    }
}

/// In-memory fixed-window counter keyed by agent id.
pub struct FixedWindowRateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<AgentId, RateWindow>>,
    calls: AtomicU64,
}

impl FixedWindowRateLimiter {
    /// Creates a limiter reading time from `clock`.
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of agents with a window in memory.
    pub fn tracked_agents(&self) -> usize {
        self.windows.lock().len()
    }

    /// Snapshot of an agent's current window, if it has one.
    pub fn window(&self, agent_id: &AgentId) -> Option<RateWindow> {
        self.windows.lock().get(agent_id).copied()
    }

    /// Drops every window that has closed.
    pub fn cleanup(&self) {
        let now = self.clock.now();
        let window = self.config.window;
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| !w.is_expired(now, window));
        tracing::debug!(
            removed = before - windows.len(),
            remaining = windows.len(),
            "swept expired rate windows"
        );
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn allow(&self, agent_id: &AgentId) -> Option<RateSlot> {
        let count = self.calls.fetch_add(1, Ordering::Relaxed);
        if count > 0 && count % self.config.cleanup_interval.max(1) == 0 {
            self.cleanup();
        }

        let now = self.clock.now();
        let mut windows = self.windows.lock();

        match windows.get_mut(agent_id) {
            Some(w) if !w.is_expired(now, self.config.window) => {
                if w.count >= self.config.max_requests {
                    tracing::warn!(
                        agent_id = %agent_id,
                        count = w.count,
                        max = self.config.max_requests,
                        "rate limit exceeded"
                    );
                    return None;
                }
                w.count += 1;
                Some(RateSlot {
                    window_started_at: w.started_at,
                })
            },
            _ => {
                if self.config.max_requests == 0 {
                    return None;
                }
                windows.insert(
                    agent_id.clone(),
                    RateWindow {
                        started_at: now,
                        count: 1,
                    },
                );
                Some(RateSlot {
                    window_started_at: now,
                })
            },
        }
    }

    fn refund(&self, agent_id: &AgentId, slot: RateSlot) {
        let now = self.clock.now();
        let mut windows = self.windows.lock();
        if let Some(w) = windows.get_mut(agent_id) {
            // A slot from an earlier window must not lower the current count.
            if w.started_at == slot.window_started_at && !w.is_expired(now, self.config.window) {
                w.count = w.count.saturating_sub(1);
            }
        }
    }

    fn retry_after(&self, agent_id: &AgentId) -> Option<Duration> {
        let now = self.clock.now();
        self.windows.lock().get(agent_id).map(|w| {
            w.started_at
                .saturating_add(self.config.window)
                .duration_since(now)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::ports::ManualClock;

    fn t0() -> Timestamp {
        Timestamp::parse_rfc3339("2024-05-01T09:00:00Z").unwrap()
    }

    fn limiter(max: u32) -> (Arc<ManualClock>, FixedWindowRateLimiter) {
        let clock = Arc::new(ManualClock::new(t0()));
        let config = RateLimitConfig {
            max_requests: max,
            window: Duration::from_secs(60),
            cleanup_interval: 1_000,
        };
        (clock.clone(), FixedWindowRateLimiter::new(config, clock))
    }

    fn agent(name: &str) -> AgentId {
        AgentId::new(name).unwrap()
    }

    #[test]
    fn nth_plus_one_request_in_window_is_rejected() {
        let (_clock, limiter) = limiter(3);
        let a = agent("a");
        assert!(limiter.allow(&a).is_some());
        assert!(limiter.allow(&a).is_some());
        assert!(limiter.allow(&a).is_some());
        assert!(limiter.allow(&a).is_none());
        assert!(limiter.allow(&a).is_none());
        assert_eq!(limiter.window(&a).unwrap().count, 3);
    }

    #[test]
    fn next_window_starts_a_fresh_count() {
        let (clock, limiter) = limiter(1);
        let a = agent("a");
        assert!(limiter.allow(&a).is_some());
        clock.advance(Duration::from_secs(59));
        assert!(limiter.allow(&a).is_none());
        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow(&a).is_some());
        assert_eq!(limiter.window(&a).unwrap().started_at, t0().saturating_add(Duration::from_secs(60)));
    }

    #[test]
    fn agents_do_not_share_budget() {
        let (_clock, limiter) = limiter(1);
        assert!(limiter.allow(&agent("a")).is_some());
        assert!(limiter.allow(&agent("a")).is_none());
        assert!(limiter.allow(&agent("b")).is_some());
    }

    #[test]
    fn refund_returns_a_slot_in_the_current_window() {
        let (clock, limiter) = limiter(1);
        let a = agent("a");
        let slot = limiter.allow(&a).unwrap();
        assert_eq!(slot.window_started_at, t0());
        limiter.refund(&a, slot);
        let slot = limiter.allow(&a).unwrap();

        clock.advance(Duration::from_secs(60));
        limiter.refund(&a, slot);
        assert_eq!(limiter.window(&a).unwrap().count, 1);
    }

    #[test]
    fn refund_from_a_previous_window_keeps_the_ceiling() {
        let (clock, limiter) = limiter(1);
        let a = agent("a");

        let old_slot = limiter.allow(&a).unwrap();

        // Another request opens the next window before the refund lands.
        clock.advance(Duration::from_secs(61));
        let new_slot = limiter.allow(&a).unwrap();
        assert_ne!(old_slot, new_slot);

        limiter.refund(&a, old_slot);
        assert_eq!(limiter.window(&a).unwrap().count, 1);
        assert!(limiter.allow(&a).is_none());
    }

    #[test]
    fn zero_ceiling_admits_nothing() {
        let (_clock, limiter) = limiter(0);
        assert!(limiter.allow(&agent("a")).is_none());
        assert!(limiter.window(&agent("a")).is_none());
    }

    #[test]
    fn retry_after_reports_time_left_in_window() {
        let (clock, limiter) = limiter(1);
        let a = agent("a");
        assert!(limiter.allow(&a).is_some());
        clock.advance(Duration::from_secs(45));
        assert_eq!(limiter.retry_after(&a), Some(Duration::from_secs(15)));
        assert_eq!(limiter.retry_after(&agent("unknown")), None);
    }

    #[test]
    fn cleanup_drops_closed_windows() {
        let (clock, limiter) = limiter(5);
        for i in 0..10 {
            limiter.allow(&agent(&format!("bot-{i}")));
        }
        assert_eq!(limiter.tracked_agents(), 10);
        clock.advance(Duration::from_secs(61));
        limiter.allow(&agent("fresh"));
        limiter.cleanup();
        assert_eq!(limiter.tracked_agents(), 1);
    }

    #[test]
    fn concurrent_requests_never_exceed_the_ceiling() {
        let (_clock, limiter) = limiter(50);
        let limiter = Arc::new(limiter);
        let a = agent("busy");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let a = a.clone();
                thread::spawn(move || (0..25).filter(|_| limiter.allow(&a).is_some()).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
