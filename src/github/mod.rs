//! GitHub REST API client
//!
//! Covers the handful of endpoints the gateway needs: the token owner
//! (`/user`), repository permissions (`/repos/{repo}`), account existence
//! (`/users/{login}`), and listing/creating access-request issues.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GitHubConfig;
use crate::error::UpstreamError;
use crate::models::{AccessRequestRecord, Identity, NotificationOutcome};

const API_VERSION: &str = "2022-11-28";
const CLIENT_USER_AGENT: &str = concat!("atlas-gateway/", env!("CARGO_PKG_VERSION"));

/// Upper bound on issue-list pages followed through `Link: rel="next"`
const MAX_ISSUE_PAGES: usize = 20;

/// Repository permission ladder, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    None,
    Read,
    Triage,
    Write,
    Maintain,
    Admin,
}

/// `permissions` object of a repository response
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RepoPermissions {
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub maintain: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub triage: bool,
    #[serde(default)]
    pub pull: bool,
}

impl RepoPermissions {
    /// Highest permission granted
    pub fn level(&self) -> Permission {
        if self.admin {
            Permission::Admin
        } else if self.maintain {
            Permission::Maintain
        } else if self.push {
            Permission::Write
        } else if self.triage {
            Permission::Triage
        } else if self.pull {
            Permission::Read
        } else {
            Permission::None
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    #[serde(default)]
    permissions: RepoPermissions,
}

/// Token owner as returned by `GET /user`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GitHubUser {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
}

impl GitHubUser {
    /// Login, falling back to display name, then `github:{id}`
    pub fn identity(&self) -> Identity {
        let label = self
            .login
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.name.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| match self.id {
                Some(id) => format!("github:{}", id),
                None => "github:unknown".to_string(),
            });
        Identity::new(label)
    }
}

#[derive(Debug, Deserialize)]
struct IssueSummary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedIssue {
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    number: Option<u64>,
}

/// GitHub REST API client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: Client,
    api_url: String,
    repo: String,
    issue_token: Option<String>,
    labels: Vec<String>,
}

impl GitHubClient {
    /// Create a client for the configured API and repository
    pub fn new(config: &GitHubConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(CLIENT_USER_AGENT)
            .build()
            .map_err(|e| UpstreamError::Network(e.to_string()))?;
        Ok(Self::with_client(client, &config.api_url, &config.repo))
    }

    /// Create a client around an existing reqwest client
    pub fn with_client(client: Client, api_url: &str, repo: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            issue_token: None,
            labels: Vec::new(),
        }
    }

    /// Token and labels used for access-request issues
    pub fn with_issue_tracking(mut self, token: Option<String>, labels: Vec<String>) -> Self {
        self.issue_token = token.filter(|t| !t.trim().is_empty());
        self.labels = labels;
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn has_issue_token(&self) -> bool {
        self.issue_token.is_some()
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        self.request_url(method, &format!("{}{}", self.api_url, path), token)
    }

    fn request_url(&self, method: Method, url: &str, token: Option<&str>) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        if let Some(token) = token {
            if let Ok(value) = HeaderValue::from_str(&format!("token {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        self.client.request(method, url).headers(headers)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
    ) -> Result<T, UpstreamError> {
        self.send_json(self.request(Method::GET, path, token), path)
            .await
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
        path: &str,
    ) -> Result<T, UpstreamError> {
        debug!(path = path, "GitHub API request");
        let response = request.send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::InvalidData(e.to_string()))
    }

    /// Owner of `token`
    pub async fn authenticated_user(&self, token: &str) -> Result<GitHubUser, UpstreamError> {
        self.get_json("/user", Some(token)).await
    }

    /// Permissions `token`'s owner holds on the configured repository
    pub async fn repo_permissions(&self, token: &str) -> Result<RepoPermissions, UpstreamError> {
        let repo: RepoResponse = self
            .get_json(&format!("/repos/{}", self.repo), Some(token))
            .await?;
        Ok(repo.permissions)
    }

    /// Whether a GitHub account named `login` exists
    pub async fn user_exists(&self, login: &str) -> Result<bool, UpstreamError> {
        let response = self
            .request(
                Method::GET,
                &format!("/users/{}", login),
                self.issue_token.as_deref(),
            )
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(UpstreamError::Status(status.as_u16())),
        }
    }

    /// Whether an open access-request issue already mentions `login`
    ///
    /// Matches titles containing `({login})`, case-insensitively. Follows
    /// `Link: rel="next"` across pages.
    pub async fn has_open_request(&self, login: &str) -> Result<bool, UpstreamError> {
        let path = format!("/repos/{}/issues", self.repo);
        let mut query = vec![("state", "open".to_string()), ("per_page", "100".to_string())];
        if !self.labels.is_empty() {
            query.push(("labels", self.labels.join(",")));
        }
        let needle = format!("({})", login.to_ascii_lowercase());

        let mut request = self
            .request(Method::GET, &path, self.issue_token.as_deref())
            .query(&query);
        for page in 1..=MAX_ISSUE_PAGES {
            debug!(path = %path, page, "GitHub API request");
            let response = request.send().await?;
            let status = response.status();
            if status != StatusCode::OK {
                return Err(UpstreamError::Status(status.as_u16()));
            }

            let next = next_page_url(response.headers());
            let issues: Vec<IssueSummary> = response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidData(e.to_string()))?;

            let found = issues
                .iter()
                .filter(|issue| issue.pull_request.is_none())
                .any(|issue| issue.title.to_ascii_lowercase().contains(&needle));
            if found {
                return Ok(true);
            }

            match next {
                Some(url) => {
                    request = self.request_url(Method::GET, &url, self.issue_token.as_deref())
                }
                None => return Ok(false),
            }
        }

        warn!(
            pages = MAX_ISSUE_PAGES,
            "Open issue listing truncated during duplicate check"
        );
        Ok(false)
    }

    /// Open a tracking issue for an accepted request
    ///
    /// Never fails; the outcome reports what happened.
    pub async fn create_issue(&self, record: &AccessRequestRecord) -> NotificationOutcome {
        let Some(token) = self.issue_token.as_deref() else {
            return NotificationOutcome::failed("missing token");
        };

        let payload = json!({
            "title": record.issue_title(),
            "body": record.issue_body(),
            "labels": self.labels,
        });

        let result = self
            .request(
                Method::POST,
                &format!("/repos/{}/issues", self.repo),
                Some(token),
            )
            .json(&payload)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let err = UpstreamError::from(e);
                warn!(error = %err, "Failed to create access request issue");
                return NotificationOutcome::failed(err.to_string());
            }
        };

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            warn!(status = status.as_u16(), "GitHub rejected access request issue");
            return NotificationOutcome::failed(format!("http {}", status.as_u16()));
        }

        match response.json::<CreatedIssue>().await {
            Ok(issue) => NotificationOutcome::created(issue.html_url.or(issue.url), issue.number),
            Err(e) => NotificationOutcome {
                created: true,
                url: None,
                number: None,
                error: Some(format!("unreadable response: {}", e)),
            },
        }
    }
}

/// URL tagged `rel="next"` in a GitHub `Link` header
fn next_page_url(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (url, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|param| param.trim() == r#"rel="next""#);
        is_next.then(|| {
            url.trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .to_string()
        })
    })
}
