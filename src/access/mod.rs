//! Access-request intake
//!
//! A submission passes, in order: body size, field validation, identity
//! lookup, duplicate detection, submission quotas, durable append, and a
//! best-effort tracker notification. A request refused at any step before the
//! quota check never consumes quota.

pub mod log;
pub mod throttle;
pub mod validate;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::AccessConfig;
use crate::error::{AccessError, UpstreamError};
use crate::github::GitHubClient;
use crate::models::{AccessReceipt, AccessRequest, AccessRequestRecord, NotificationOutcome};

pub use log::AccessLog;
pub use throttle::SubmissionThrottle;

/// Directory of known identities
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Whether the login exists; errors mean the directory could not answer
    async fn user_exists(&self, login: &str) -> Result<bool, UpstreamError>;
}

/// External tracker where accepted requests are filed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessTracker: Send + Sync {
    /// Whether an open request already exists for this login
    async fn has_open_request(&self, login: &str) -> Result<bool, UpstreamError>;

    /// File the request; failures are reported in the outcome
    async fn notify(&self, record: &AccessRequestRecord) -> NotificationOutcome;
}

#[async_trait]
impl IdentityDirectory for GitHubClient {
    async fn user_exists(&self, login: &str) -> Result<bool, UpstreamError> {
        GitHubClient::user_exists(self, login).await
    }
}

#[async_trait]
impl AccessTracker for GitHubClient {
    async fn has_open_request(&self, login: &str) -> Result<bool, UpstreamError> {
        GitHubClient::has_open_request(self, login).await
    }

    async fn notify(&self, record: &AccessRequestRecord) -> NotificationOutcome {
        self.create_issue(record).await
    }
}

/// Access-request service
pub struct AccessRequestService {
    max_body_bytes: usize,
    verify_identity: bool,
    directory: Arc<dyn IdentityDirectory>,
    tracker: Arc<dyn AccessTracker>,
    throttle: SubmissionThrottle,
    log: AccessLog,
}

impl AccessRequestService {
    pub fn new(
        config: &AccessConfig,
        log: AccessLog,
        directory: Arc<dyn IdentityDirectory>,
        tracker: Arc<dyn AccessTracker>,
    ) -> Self {
        Self {
            max_body_bytes: config.max_body_bytes,
            verify_identity: config.verify_identity,
            directory,
            tracker,
            throttle: SubmissionThrottle::from_config(config),
            log,
        }
    }

    pub fn log(&self) -> &AccessLog {
        &self.log
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Drop expired quota entries
    pub fn cleanup(&self) {
        self.throttle.cleanup_at(Utc::now());
    }

    /// Handle one raw submission body
    pub async fn submit(
        &self,
        body: &[u8],
        remote_addr: &str,
        user_agent: &str,
    ) -> Result<AccessReceipt, AccessError> {
        self.submit_at(body, remote_addr, user_agent, Utc::now()).await
    }

    pub async fn submit_at(
        &self,
        body: &[u8],
        remote_addr: &str,
        user_agent: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessReceipt, AccessError> {
        if body.len() > self.max_body_bytes {
            return Err(AccessError::BodyTooLarge);
        }

        let request: AccessRequest = serde_json::from_slice(body)
            .map_err(|_| AccessError::Invalid("Malformed request body".to_string()))?;
        let request = validate::validate(&request)?;
        let login = request.github_username.clone();

        if self.verify_identity {
            match self.directory.user_exists(&login).await {
                Ok(true) => {}
                Ok(false) => return Err(AccessError::UnknownIdentity(login)),
                Err(e) => {
                    warn!(login = %login, error = %e, "Identity lookup failed");
                    return Err(AccessError::LookupUnavailable(e.to_string()));
                }
            }
        }

        if self.log.contains(&login) {
            return Err(AccessError::DuplicateRequest(login));
        }
        match self.tracker.has_open_request(&login).await {
            Ok(true) => return Err(AccessError::DuplicateRequest(login)),
            Ok(false) => {}
            Err(e) => {
                warn!(
                    login = %login,
                    error = %e,
                    "Tracker duplicate check failed, using local log only"
                );
            }
        }

        self.throttle
            .check_and_record_at(remote_addr, &request.email, now)?;

        let record = AccessRequestRecord::new(request, now, remote_addr, user_agent);
        self.log.append_unique(&record).await?;
        info!(login = %login, remote_addr = %remote_addr, "Access request recorded");

        let outcome = self.tracker.notify(&record).await;
        if let Some(error) = &outcome.error {
            warn!(login = %login, error = %error, "Access request notification failed");
        }

        Ok(AccessReceipt::from(outcome))
    }
}
