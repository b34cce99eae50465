//! Sliding-window request rate limiting
//!
//! Each client key keeps the timestamps of its requests inside the trailing
//! window, and so does the process as a whole. A request is admitted only if
//! both its client log and the global log are below their limits; admitted
//! requests are recorded in both logs under the same lock, denied ones in
//! neither.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::config::RateLimitConfig;

/// Which limit refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    Client,
    Global,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Client => "client",
            LimitScope::Global => "global",
        }
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied {
        scope: LimitScope,
        /// Whole seconds until the oldest blocking request leaves the window
        retry_after_secs: u64,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[derive(Debug, Default)]
struct WindowState {
    clients: HashMap<String, VecDeque<DateTime<Utc>>>,
    global: VecDeque<DateTime<Utc>>,
}

/// Per-client and global sliding-window limiter
pub struct SlidingWindowLimiter {
    request_limit: usize,
    global_limit: usize,
    window: Duration,
    state: Mutex<WindowState>,
}

/// Drop timestamps whose window has fully elapsed
fn prune(log: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    while log.front().is_some_and(|t| *t <= cutoff) {
        log.pop_front();
    }
}

fn retry_after(log: &VecDeque<DateTime<Utc>>, window: Duration, now: DateTime<Utc>) -> u64 {
    let oldest = log.front().copied().unwrap_or(now);
    let wait = (oldest + window - now).num_milliseconds().max(0) as u64;
    wait.div_ceil(1000).max(1)
}

impl SlidingWindowLimiter {
    /// Create a limiter
    ///
    /// A `global_limit` of zero disables the global cap.
    pub fn new(request_limit: u32, global_limit: u32, window_secs: u64) -> Self {
        Self {
            request_limit: request_limit as usize,
            global_limit: global_limit as usize,
            window: Duration::seconds(window_secs.min(i32::MAX as u64) as i64),
            state: Mutex::new(WindowState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, WindowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a request from `client_key` is admitted now
    pub fn allow(&self, client_key: &str) -> bool {
        self.check_at(client_key, Utc::now()).is_allowed()
    }

    pub fn check(&self, client_key: &str) -> RateDecision {
        self.check_at(client_key, Utc::now())
    }

    /// Decide and record a request arriving at `now`
    pub fn check_at(&self, client_key: &str, now: DateTime<Utc>) -> RateDecision {
        let cutoff = now - self.window;
        let mut state = self.state();
        let WindowState { clients, global } = &mut *state;

        prune(global, cutoff);
        if self.global_limit > 0 && global.len() >= self.global_limit {
            return RateDecision::Denied {
                scope: LimitScope::Global,
                retry_after_secs: retry_after(global, self.window, now),
            };
        }

        let log = clients.entry(client_key.to_string()).or_default();
        prune(log, cutoff);
        if log.len() >= self.request_limit {
            return RateDecision::Denied {
                scope: LimitScope::Client,
                retry_after_secs: retry_after(log, self.window, now),
            };
        }

        log.push_back(now);
        global.push_back(now);
        RateDecision::Allowed
    }

    /// Forget clients with no request inside the window
    pub fn cleanup_at(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        let mut state = self.state();
        prune(&mut state.global, cutoff);
        state.clients.retain(|_, log| {
            prune(log, cutoff);
            !log.is_empty()
        });
    }

    /// Number of client keys currently tracked
    pub fn tracked_clients_count(&self) -> usize {
        self.state().clients.len()
    }
}

/// Request rate limiter selected once from configuration
pub enum RequestRateLimiter {
    /// Every request is admitted
    Disabled,
    Active(SlidingWindowLimiter),
}

impl RequestRateLimiter {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.enabled {
            RequestRateLimiter::Active(SlidingWindowLimiter::new(
                config.request_limit,
                config.global_limit,
                config.window_secs,
            ))
        } else {
            RequestRateLimiter::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, RequestRateLimiter::Active(_))
    }

    pub fn check(&self, client_key: &str) -> RateDecision {
        match self {
            RequestRateLimiter::Disabled => RateDecision::Allowed,
            RequestRateLimiter::Active(limiter) => limiter.check(client_key),
        }
    }

    pub fn cleanup(&self) {
        if let RequestRateLimiter::Active(limiter) = self {
            limiter.cleanup_at(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn at(base: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        base + Duration::seconds(secs)
    }

    #[test]
    fn test_limit_requests_allowed_then_denied() {
        let limiter = SlidingWindowLimiter::new(5, 100, 30);
        let t0 = Utc::now();

        for i in 0..5 {
            assert!(limiter.check_at("10.0.0.1", at(t0, i)).is_allowed());
        }
        assert_eq!(
            limiter.check_at("10.0.0.1", at(t0, 5)),
            RateDecision::Denied {
                scope: LimitScope::Client,
                retry_after_secs: 25
            }
        );
    }

    #[test]
    fn test_window_elapses_and_requests_succeed_again() {
        let limiter = SlidingWindowLimiter::new(2, 100, 30);
        let t0 = Utc::now();

        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(!limiter.check_at("a", at(t0, 29)).is_allowed());
        assert!(limiter.check_at("a", at(t0, 30)).is_allowed());
    }

    #[test]
    fn test_no_burst_across_window_boundary() {
        let limiter = SlidingWindowLimiter::new(3, 100, 10);
        let t0 = Utc::now();

        // Three requests at the end of one window...
        for _ in 0..3 {
            assert!(limiter.check_at("a", at(t0, 9)).is_allowed());
        }
        // ...still count at the start of the next fixed interval
        assert!(!limiter.check_at("a", at(t0, 11)).is_allowed());
        assert!(limiter.check_at("a", at(t0, 19)).is_allowed());
    }

    #[test]
    fn test_denials_are_not_counted() {
        let limiter = SlidingWindowLimiter::new(1, 100, 10);
        let t0 = Utc::now();

        assert!(limiter.check_at("a", t0).is_allowed());
        for i in 1..5 {
            assert!(!limiter.check_at("a", at(t0, i)).is_allowed());
        }
        // Only the admitted request at t0 counts, so t0+10 is admitted
        assert!(limiter.check_at("a", at(t0, 10)).is_allowed());
    }

    #[test]
    fn test_clients_tracked_separately() {
        let limiter = SlidingWindowLimiter::new(1, 100, 30);
        let t0 = Utc::now();

        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(!limiter.check_at("a", t0).is_allowed());
        assert!(limiter.check_at("b", t0).is_allowed());
    }

    #[test]
    fn test_global_limit_independent_of_clients() {
        let limiter = SlidingWindowLimiter::new(5, 3, 30);
        let t0 = Utc::now();

        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(limiter.check_at("b", t0).is_allowed());
        assert!(limiter.check_at("c", t0).is_allowed());
        assert!(matches!(
            limiter.check_at("d", t0),
            RateDecision::Denied {
                scope: LimitScope::Global,
                ..
            }
        ));
    }

    #[test]
    fn test_client_denial_does_not_consume_global_quota() {
        let limiter = SlidingWindowLimiter::new(1, 2, 30);
        let t0 = Utc::now();

        assert!(limiter.check_at("a", t0).is_allowed());
        assert!(!limiter.check_at("a", t0).is_allowed());
        assert!(!limiter.check_at("a", t0).is_allowed());
        assert!(limiter.check_at("b", t0).is_allowed());
    }

    #[test]
    fn test_cleanup_forgets_idle_clients() {
        let limiter = SlidingWindowLimiter::new(5, 100, 10);
        let t0 = Utc::now();

        limiter.check_at("a", t0);
        limiter.check_at("b", at(t0, 8));
        assert_eq!(limiter.tracked_clients_count(), 2);

        limiter.cleanup_at(at(t0, 12));
        assert_eq!(limiter.tracked_clients_count(), 1);
    }

    #[test]
    fn test_concurrent_checks_admit_exactly_the_limit() {
        let limiter = Arc::new(SlidingWindowLimiter::new(50, 1000, 60));
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || (0..20).filter(|_| limiter.allow("shared")).count())
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    #[test]
    fn test_disabled_limiter_admits_everything() {
        let config = RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        };
        let limiter = RequestRateLimiter::from_config(&config);
        assert!(!limiter.is_enabled());
        for _ in 0..100 {
            assert!(limiter.check("a").is_allowed());
        }
    }

    #[test]
    fn test_active_limiter_from_config() {
        let limiter = RequestRateLimiter::from_config(&RateLimitConfig::default());
        assert!(limiter.is_enabled());
        for _ in 0..5 {
            assert!(limiter.check("a").is_allowed());
        }
        assert!(!limiter.check("a").is_allowed());
    }
}
