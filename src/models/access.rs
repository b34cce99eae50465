//! Access-request domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /access/request`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub github_username: String,
}

impl AccessRequest {
    /// Copy with surrounding whitespace removed from every field
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            surname: self.surname.trim().to_string(),
            email: self.email.trim().to_string(),
            github_username: self.github_username.trim().to_string(),
        }
    }
}

/// One line of the append-only request log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRequestRecord {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub github_username: String,
    pub timestamp: DateTime<Utc>,
    pub remote_addr: String,
    #[serde(default)]
    pub user_agent: String,
}

impl AccessRequestRecord {
    pub fn new(
        request: AccessRequest,
        timestamp: DateTime<Utc>,
        remote_addr: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            name: request.name,
            surname: request.surname,
            email: request.email,
            github_username: request.github_username,
            timestamp,
            remote_addr: remote_addr.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Key used for duplicate detection
    pub fn identity_key(&self) -> String {
        identity_key(&self.github_username)
    }

    /// Title of the tracking issue opened for this request
    pub fn issue_title(&self) -> String {
        format!(
            "Access request: {} {} ({})",
            self.name, self.surname, self.github_username
        )
    }

    /// Body of the tracking issue opened for this request
    pub fn issue_body(&self) -> String {
        [
            "New access request received:\n".to_string(),
            format!("Name: {} {}", self.name, self.surname),
            format!("Email: {}", self.email),
            format!("GitHub: {}", self.github_username),
            format!("Remote: {}", self.remote_addr),
            format!("Timestamp: {}", self.timestamp.to_rfc3339()),
            format!("User-Agent: {}", self.user_agent),
        ]
        .join("\n")
    }
}

/// GitHub logins are case-insensitive
pub fn identity_key(github_username: &str) -> String {
    github_username.trim().to_ascii_lowercase()
}

/// Result of the best-effort notification step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    pub created: bool,
    pub url: Option<String>,
    pub number: Option<u64>,
    pub error: Option<String>,
}

impl NotificationOutcome {
    pub fn created(url: Option<String>, number: Option<u64>) -> Self {
        Self {
            created: true,
            url,
            number,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Response of an accepted access request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessReceipt {
    pub accepted: bool,
    pub github_issue_created: bool,
    pub github_issue_url: Option<String>,
    pub github_issue_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_issue_error: Option<String>,
}

impl From<NotificationOutcome> for AccessReceipt {
    fn from(outcome: NotificationOutcome) -> Self {
        Self {
            accepted: true,
            github_issue_created: outcome.created,
            github_issue_url: outcome.url,
            github_issue_number: outcome.number,
            github_issue_error: outcome.error,
        }
    }
}
