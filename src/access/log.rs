//! Append-only access-request log
//!
//! Records are stored one JSON object per line in `requests.jsonl`. The set
//! of identities already present is rebuilt from the file at startup and
//! kept in memory for duplicate detection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::AccessError;
use crate::models::access::identity_key;
use crate::models::AccessRequestRecord;

/// File name of the log inside the requests directory
pub const LOG_FILE_NAME: &str = "requests.jsonl";

pub struct AccessLog {
    path: PathBuf,
    identities: Mutex<HashSet<String>>,
    writer: tokio::sync::Mutex<()>,
}

impl AccessLog {
    /// Open (creating if needed) the log in `dir` and index its identities
    ///
    /// Lines that do not parse are skipped with a warning.
    pub fn open(dir: &Path) -> Result<Self, AccessError> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AccessError::Storage(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(LOG_FILE_NAME);
        let mut identities = HashSet::new();

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                for (line_no, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<AccessRequestRecord>(line) {
                        Ok(record) => {
                            identities.insert(record.identity_key());
                        }
                        Err(e) => {
                            warn!(
                                line = line_no + 1,
                                error = %e,
                                "Skipping unreadable access log line"
                            );
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AccessError::Storage(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        info!(path = %path.display(), identities = identities.len(), "Access log opened");

        Ok(Self {
            path,
            identities: Mutex::new(identities),
            writer: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn identities(&self) -> MutexGuard<'_, HashSet<String>> {
        self.identities.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a request for this GitHub login is already logged
    pub fn contains(&self, github_username: &str) -> bool {
        self.identities().contains(&identity_key(github_username))
    }

    pub fn len(&self) -> usize {
        self.identities().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a record unless its identity is already logged
    ///
    /// The identity is reserved before the write and released again if the
    /// write fails, so concurrent submissions for one identity admit exactly
    /// one.
    pub async fn append_unique(&self, record: &AccessRequestRecord) -> Result<(), AccessError> {
        let key = record.identity_key();
        if !self.identities().insert(key.clone()) {
            return Err(AccessError::DuplicateRequest(record.github_username.clone()));
        }

        if let Err(e) = self.append_line(record).await {
            self.identities().remove(&key);
            return Err(e);
        }
        Ok(())
    }

    async fn append_line(&self, record: &AccessRequestRecord) -> Result<(), AccessError> {
        let mut line =
            serde_json::to_string(record).map_err(|e| AccessError::Storage(e.to_string()))?;
        line.push('\n');

        let _guard = self.writer.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| AccessError::Storage(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| AccessError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| AccessError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccessRequest;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(login: &str) -> AccessRequestRecord {
        AccessRequestRecord::new(
            AccessRequest {
                name: "Ada".to_string(),
                surname: "Lovelace".to_string(),
                email: format!("{}@example.org", login),
                github_username: login.to_string(),
            },
            Utc::now(),
            "127.0.0.1",
            "test",
        )
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let log = AccessLog::open(dir.path()).unwrap();

        log.append_unique(&record("ada")).await.unwrap();
        log.append_unique(&record("grace")).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: AccessRequestRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.github_username, "grace");
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let log = AccessLog::open(dir.path()).unwrap();

        log.append_unique(&record("Ada")).await.unwrap();
        assert!(log.contains("ada"));
        assert_eq!(
            log.append_unique(&record("ADA")).await,
            Err(AccessError::DuplicateRequest("ADA".to_string()))
        );
    }

    #[tokio::test]
    async fn test_identities_rebuilt_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let log = AccessLog::open(dir.path()).unwrap();
            log.append_unique(&record("ada")).await.unwrap();
        }
        // A corrupt line must not prevent startup
        let path = dir.path().join(LOG_FILE_NAME);
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{not json\n");
        std::fs::write(&path, content).unwrap();

        let reopened = AccessLog::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.contains("ada"));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_admit_one() {
        let dir = TempDir::new().unwrap();
        let log = Arc::new(AccessLog::open(dir.path()).unwrap());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let log = Arc::clone(&log);
                tokio::spawn(async move { log.append_unique(&record("ada")).await.is_ok() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        let content = std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let log = AccessLog::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(log.is_empty());
        assert_eq!(log.path(), nested.join(LOG_FILE_NAME));
    }
}
