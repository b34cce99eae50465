//! Submission quotas per source IP and per email address

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::config::AccessConfig;
use crate::error::AccessError;

#[derive(Debug, Default)]
struct ThrottleState {
    ips: HashMap<String, VecDeque<DateTime<Utc>>>,
    emails: HashMap<String, VecDeque<DateTime<Utc>>>,
}

/// Sliding-window quotas with a minimum interval between submissions
pub struct SubmissionThrottle {
    window: Duration,
    min_interval: Duration,
    max_per_ip: usize,
    max_per_email: usize,
    state: Mutex<ThrottleState>,
}

fn prune(log: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) {
    while log.front().is_some_and(|t| now - *t > window) {
        log.pop_front();
    }
}

/// Check one log against its quota without recording
fn check(
    log: &VecDeque<DateTime<Utc>>,
    now: DateTime<Utc>,
    min_interval: Duration,
    max: usize,
    interval_reason: &'static str,
    window_reason: &'static str,
) -> Result<(), AccessError> {
    if log.back().is_some_and(|last| now - *last < min_interval) {
        return Err(AccessError::RateLimited(interval_reason));
    }
    if log.len() >= max {
        return Err(AccessError::RateLimited(window_reason));
    }
    Ok(())
}

impl SubmissionThrottle {
    pub fn new(
        window_secs: u64,
        min_interval_secs: u64,
        max_per_ip: usize,
        max_per_email: usize,
    ) -> Self {
        Self {
            window: Duration::seconds(window_secs.min(i32::MAX as u64) as i64),
            min_interval: Duration::seconds(min_interval_secs.min(i32::MAX as u64) as i64),
            max_per_ip,
            max_per_email,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self::new(
            config.window_secs,
            config.min_interval_secs,
            config.max_per_ip,
            config.max_per_email,
        )
    }

    fn state(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit and record a submission, or report which quota it exceeds
    ///
    /// Emails are compared case-insensitively. A refused submission is not
    /// recorded against either key.
    pub fn check_and_record_at(
        &self,
        ip: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AccessError> {
        let email = email.to_lowercase();
        let mut state = self.state();
        let ThrottleState { ips, emails } = &mut *state;

        let ip_log = ips.entry(ip.to_string()).or_default();
        prune(ip_log, now, self.window);
        check(
            ip_log,
            now,
            self.min_interval,
            self.max_per_ip,
            "ip interval",
            "ip window",
        )?;

        let email_log = emails.entry(email).or_default();
        prune(email_log, now, self.window);
        check(
            email_log,
            now,
            self.min_interval,
            self.max_per_email,
            "email interval",
            "email window",
        )?;

        email_log.push_back(now);
        ip_log.push_back(now);
        Ok(())
    }

    /// Forget keys with no submission inside the window
    pub fn cleanup_at(&self, now: DateTime<Utc>) {
        let window = self.window;
        let mut state = self.state();
        let ThrottleState { ips, emails } = &mut *state;
        for logs in [ips, emails] {
            logs.retain(|_, log| {
                prune(log, now, window);
                !log.is_empty()
            });
        }
    }

    pub fn tracked_keys_count(&self) -> usize {
        let state = self.state();
        state.ips.len() + state.emails.len()
    }
}
