//! Configuration management for atlas-gateway
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Request rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Tile datasets by name
    #[serde(default = "default_datasets")]
    pub datasets: BTreeMap<String, DatasetConfig>,

    /// Access request configuration
    #[serde(default)]
    pub access: AccessConfig,

    /// GitHub API configuration shared by the verifier and access requests
    #[serde(default)]
    pub github: GitHubConfig,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            datasets: default_datasets(),
            access: AccessConfig::default(),
            github: GitHubConfig::default(),
            otel: OtelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// First path segments taken by fixed routes
const RESERVED_DATASET_NAMES: &[&str] = &["auth", "access", "files", "get", "healthz"];

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the service's environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    ///
    /// Unset variables keep their defaults; set but unparsable numeric
    /// values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(host) = lookup("HOST") {
            config.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.server.port = parse_var("PORT", &port)?;
        }

        if let Some(enabled) = lookup("ENABLE_AUTH") {
            config.auth.enabled = parse_flag(&enabled);
        }
        if let Some(ttl) = lookup("TOKEN_TTL_SECONDS") {
            config.auth.token_ttl_secs = parse_var("TOKEN_TTL_SECONDS", &ttl)?;
        }
        if let Some(host) = lookup("SSH_HOST") {
            config.auth.ssh.host = host;
        }
        if let Some(port) = lookup("SSH_PORT") {
            config.auth.ssh.port = parse_var("SSH_PORT", &port)?;
        }

        if let Some(enabled) = lookup("ENABLE_RATE_LIMIT") {
            config.rate_limit.enabled = parse_flag(&enabled);
        }
        if let Some(limit) = lookup("RATE_REQ_LIMIT") {
            config.rate_limit.request_limit = parse_var("RATE_REQ_LIMIT", &limit)?;
        }
        if let Some(window) = lookup("RATE_TIME_WINDOW") {
            config.rate_limit.window_secs = parse_var("RATE_TIME_WINDOW", &window)?;
        }
        if let Some(limit) = lookup("RATE_GLOBAL_LIMIT") {
            config.rate_limit.global_limit = parse_var("RATE_GLOBAL_LIMIT", &limit)?;
        }

        if let Some(lidar) = config.datasets.get_mut("lidar") {
            if let Some(path) = lookup("LIDAR_ATLAS_PATH") {
                lidar.atlas_path = PathBuf::from(path);
            }
            if let Some(dir) = lookup("LAZ_DIRECTORY") {
                lidar.data_dir = PathBuf::from(dir);
            }
        }
        if let Some(gpkg) = config.datasets.get_mut("gpkg") {
            if let Some(path) = lookup("GPKG_ATLAS_PATH") {
                gpkg.atlas_path = PathBuf::from(path);
            }
            if let Some(dir) = lookup("GPKG_DATA_DIRECTORY") {
                gpkg.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(url) = lookup("GITHUB_API_URL") {
            config.github.api_url = url;
        }
        if let Some(repo) = lookup("GITHUB_REPO") {
            config.github.repo = repo;
        }

        if let Some(token) = lookup("ACCESS_GITHUB_TOKEN") {
            config.access.github_token = Some(token);
        }
        if let Some(labels) = lookup("ACCESS_GITHUB_LABELS") {
            config.access.labels = labels
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(dir) = lookup("ACCESS_REQUESTS_DIR") {
            config.access.requests_dir = PathBuf::from(dir);
        }
        if let Some(v) = lookup("ACCESS_REQ_WINDOW_SECONDS") {
            config.access.window_secs = parse_var("ACCESS_REQ_WINDOW_SECONDS", &v)?;
        }
        if let Some(v) = lookup("ACCESS_REQ_MIN_INTERVAL_SECONDS") {
            config.access.min_interval_secs = parse_var("ACCESS_REQ_MIN_INTERVAL_SECONDS", &v)?;
        }
        if let Some(v) = lookup("ACCESS_REQ_MAX_PER_IP") {
            config.access.max_per_ip = parse_var("ACCESS_REQ_MAX_PER_IP", &v)?;
        }
        if let Some(v) = lookup("ACCESS_REQ_MAX_PER_EMAIL") {
            config.access.max_per_email = parse_var("ACCESS_REQ_MAX_PER_EMAIL", &v)?;
        }
        if let Some(v) = lookup("ACCESS_REQ_MAX_BODY_BYTES") {
            config.access.max_body_bytes = parse_var("ACCESS_REQ_MAX_BODY_BYTES", &v)?;
        }

        if let Some(enabled) = lookup("OTEL_ENABLED") {
            config.otel.enabled = parse_flag(&enabled);
        }
        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot serve requests
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.token_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.enabled && self.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.github.enabled && self.github.repo.split('/').count() != 2 {
            return Err(ConfigError::InvalidValue(format!(
                "github.repo must be owner/name, got {}",
                self.github.repo
            )));
        }
        for (name, dataset) in &self.datasets {
            if name.is_empty()
                || name.contains('/')
                || RESERVED_DATASET_NAMES.contains(&name.as_str())
            {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid dataset name: {:?}",
                    name
                )));
            }
            if dataset.data_dir.as_os_str().is_empty() {
                return Err(ConfigError::MissingRequired(format!(
                    "datasets.{}.data_dir",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Parse(format!("Invalid value for {}: {}", name, value)))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

/// Which verifier answers `POST /auth/token`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PasswordBackend {
    /// Password authentication against an SSH host
    #[default]
    Ssh,
    /// Argon2 hashes listed in `auth.static_users`
    Static,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Whether bearer tokens are required on tile and file routes
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lifetime of issued tokens in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// Upper bound on any single credential verification
    #[serde(default = "default_verify_timeout")]
    pub verify_timeout_secs: u64,

    /// Verifier used for username/password exchange
    #[serde(default)]
    pub password_backend: PasswordBackend,

    /// SSH verifier settings
    #[serde(default)]
    pub ssh: SshConfig,

    /// Username to argon2 password hash, used by the static backend
    #[serde(default)]
    pub static_users: BTreeMap<String, String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_ttl_secs: default_token_ttl(),
            verify_timeout_secs: default_verify_timeout(),
            password_backend: PasswordBackend::default(),
            ssh: SshConfig::default(),
            static_users: BTreeMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_verify_timeout() -> u64 {
    10
}

/// SSH verifier configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshConfig {
    /// Host to authenticate against
    #[serde(default = "default_ssh_host")]
    pub host: String,

    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Connection timeout in seconds
    #[serde(default = "default_ssh_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: default_ssh_host(),
            port: default_ssh_port(),
            connect_timeout_secs: default_ssh_timeout(),
        }
    }
}

fn default_ssh_host() -> String {
    "data2.dtcc.chalmers.se".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_timeout() -> u64 {
    5
}

/// Request rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Whether the limiter is active
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum requests per client within the window
    #[serde(default = "default_request_limit")]
    pub request_limit: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Maximum requests across all clients within the window
    #[serde(default = "default_global_limit")]
    pub global_limit: u32,

    /// Key clients by the first `X-Forwarded-For` hop instead of the peer address
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_limit: default_request_limit(),
            window_secs: default_window_secs(),
            global_limit: default_global_limit(),
            trust_forwarded_for: false,
        }
    }
}

fn default_request_limit() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    30
}

fn default_global_limit() -> u32 {
    20
}

/// Catalog layout of a dataset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Flat `tile_id -> {filename, minx, miny, maxx, maxy}` catalog
    Gpkg,
    /// Nested `x -> y -> {filename, width, height}` catalog
    Lidar,
}

/// A tile dataset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatasetConfig {
    /// Catalog layout
    pub kind: DatasetKind,

    /// Path to the atlas catalog JSON
    pub atlas_path: PathBuf,

    /// Directory holding the tile files
    pub data_dir: PathBuf,
}

fn default_datasets() -> BTreeMap<String, DatasetConfig> {
    let mut datasets = BTreeMap::new();
    datasets.insert(
        "lidar".to_string(),
        DatasetConfig {
            kind: DatasetKind::Lidar,
            atlas_path: PathBuf::from("/mnt/raid0/testingexclude/out/atlas.json"),
            data_dir: PathBuf::from("/mnt/raid0/testingexclude/out"),
        },
    );
    datasets.insert(
        "gpkg".to_string(),
        DatasetConfig {
            kind: DatasetKind::Gpkg,
            atlas_path: PathBuf::from("/mnt/raid0/testing_by/tiles_atlas.json"),
            data_dir: PathBuf::from("/mnt/raid0/testing_by/tiled_data"),
        },
    );
    datasets
}

/// Access request configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessConfig {
    /// Directory for the append-only request log
    #[serde(default = "default_requests_dir")]
    pub requests_dir: PathBuf,

    /// Sliding window length in seconds
    #[serde(default = "default_access_window")]
    pub window_secs: u64,

    /// Minimum seconds between submissions from the same IP or email
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    /// Maximum submissions per IP within the window
    #[serde(default = "default_max_per_ip")]
    pub max_per_ip: usize,

    /// Maximum submissions per email within the window
    #[serde(default = "default_max_per_email")]
    pub max_per_email: usize,

    /// Maximum accepted body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Verify that the GitHub username exists before accepting
    #[serde(default = "default_true")]
    pub verify_identity: bool,

    /// Token used to look up and create tracking issues
    #[serde(default)]
    pub github_token: Option<String>,

    /// Labels applied to (and searched on) tracking issues
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            requests_dir: default_requests_dir(),
            window_secs: default_access_window(),
            min_interval_secs: default_min_interval(),
            max_per_ip: default_max_per_ip(),
            max_per_email: default_max_per_email(),
            max_body_bytes: default_max_body_bytes(),
            verify_identity: true,
            github_token: None,
            labels: default_labels(),
        }
    }
}

fn default_requests_dir() -> PathBuf {
    PathBuf::from("/var/lib/dtcc-data/access_requests")
}

fn default_access_window() -> u64 {
    3600
}

fn default_min_interval() -> u64 {
    30
}

fn default_max_per_ip() -> usize {
    5
}

fn default_max_per_email() -> usize {
    3
}

fn default_max_body_bytes() -> usize {
    2048
}

fn default_labels() -> Vec<String> {
    vec!["access-request".to_string()]
}

/// GitHub API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GitHubConfig {
    /// Whether `POST /auth/github` is served
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// API base URL
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Repository (`owner/name`) whose permission gates access
    #[serde(default = "default_github_repo")]
    pub repo: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_github_api_url(),
            repo: default_github_repo(),
            timeout_secs: default_github_timeout(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_repo() -> String {
    "dtcc-platform/dtcc-auth".to_string()
}

fn default_github_timeout() -> u64 {
    10
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "atlas-gateway".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax; unknown variables are left as written.
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
