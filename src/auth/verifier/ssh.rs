//! Password verification by SSH login
//!
//! A password is accepted if it opens an authenticated SSH session on the
//! configured host. The session is closed immediately afterwards.

use async_trait::async_trait;
use russh::client;
use russh::Disconnect;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::SshConfig;
use crate::error::AuthError;
use crate::models::Identity;

/// Client handler that accepts any host key
///
/// The session only proves the password; no data crosses it.
struct LoginProbe;

#[async_trait]
impl client::Handler for LoginProbe {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Verifies usernames and passwords against an SSH server
#[derive(Debug, Clone)]
pub struct SshVerifier {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl SshVerifier {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Every failure is reported as `Unauthorized`
    pub async fn verify(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Unauthorized);
        }

        match self.try_login(username, password).await {
            Ok(true) => Ok(Identity::new(username)),
            Ok(false) => {
                debug!(username = username, "SSH password rejected");
                Err(AuthError::Unauthorized)
            }
            Err(e) => {
                warn!(ssh_host = %self.target(), error = %e, "SSH verification failed");
                Err(AuthError::Unauthorized)
            }
        }
    }

    async fn try_login(&self, username: &str, password: &str) -> Result<bool, russh::Error> {
        let config = Arc::new(client::Config {
            inactivity_timeout: Some(self.connect_timeout),
            ..Default::default()
        });

        let connect = client::connect(config, (self.host.as_str(), self.port), LoginProbe);
        let mut session = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| {
                russh::Error::IO(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "SSH connect timed out",
                ))
            })??;

        let authenticated = session.authenticate_password(username, password).await?;
        let _ = session
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;

        Ok(authenticated)
    }
}
