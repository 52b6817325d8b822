//! Application configuration management.
//!
//! Configuration is loaded once at startup from a YAML file with environment variable overrides,
//! and then handed to the relay as an immutable value. The configuration file path defaults to
//! `config.yaml` but can be specified via the `-f` flag or the `IMGRELAY_CONFIG` environment
//! variable. A missing file is not an error: every setting has a default or can come from the
//! environment.
//!
//! ## Loading Priority
//!
//! Sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Prefixed environment variables** - `IMGRELAY_` variables, `__` separating nested keys
//! 3. **Plain environment variables** - `GITHUB_TOKEN`, `GITHUB_OWNER`, `GITHUB_REPO`,
//!    `GITHUB_BRANCH` and `PORT`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! # Remote store credentials and coordinates
//! GITHUB_TOKEN=ghp_xxx
//! GITHUB_OWNER=octo
//! GITHUB_REPO=gallery
//! GITHUB_BRANCH=main
//!
//! # Override server port
//! PORT=8080
//!
//! # Nested values
//! IMGRELAY_UPLOAD__MAX_FILE_SIZE=16777216
//! IMGRELAY_GITHUB__REQUEST_TIMEOUT=10s
//! ```
//!
//! Missing GitHub credentials do not prevent startup. The relay comes up, logs a warning, and
//! every upload or delete fails with a "not configured" error until it is restarted with them.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;

/// Plain environment variables and the config keys they populate.
const PLAIN_ENV_KEYS: [(&str, &str); 5] = [
    ("GITHUB_TOKEN", "github.token"),
    ("GITHUB_OWNER", "github.owner"),
    ("GITHUB_REPO", "github.repo"),
    ("GITHUB_BRANCH", "github.branch"),
    ("PORT", "port"),
];

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "IMGRELAY_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Remote content store (GitHub) settings
    pub github: GithubConfig,
    /// Upload handling
    pub upload: UploadConfig,
    /// CORS settings for browser clients
    pub cors: CorsConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// GitHub repository that images are committed to.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GithubConfig {
    /// Token with contents write access to the repository
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Repository owner (user or organization)
    pub owner: Option<String>,
    /// Repository name
    pub repo: Option<String>,
    /// Branch that commits land on
    pub branch: String,
    /// Base URL of the REST API
    pub api_url: Url,
    /// Base URL that public raw file URLs are built from
    pub raw_url: Url,
    /// User-Agent sent with every API request
    pub user_agent: String,
    /// Upper bound on each API request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Credentials and coordinates required before any remote call is made.
#[derive(Clone, PartialEq, Eq)]
pub struct GithubCredentials {
    pub token: String,
    pub owner: String,
    pub repo: String,
}

/// Upload limits and naming.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    pub max_file_size: u64,
    /// Multipart field carrying the file
    pub field_name: String,
    /// Repository directory that uploads are stored under
    pub path_prefix: String,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://gallery.example.com`)
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            github: GithubConfig::default(),
            upload: UploadConfig::default(),
            cors: CorsConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repo: None,
            branch: "main".to_string(),
            api_url: Url::parse("https://api.github.com").expect("valid default api url"),
            raw_url: Url::parse("https://raw.githubusercontent.com").expect("valid default raw url"),
            user_agent: "imgrelay".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 8 * 1024 * 1024, // 8 MiB
            field_name: "image".to_string(),
            path_prefix: "images".to_string(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: None,
        }
    }
}

// The token must never end up in logs
impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url.as_str())
            .field("raw_url", &self.raw_url.as_str())
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl std::fmt::Debug for GithubCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubCredentials")
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .finish()
    }
}

impl GithubConfig {
    /// Token, owner and repo, if all three are present and non-empty.
    pub fn credentials(&self) -> Option<GithubCredentials> {
        fn present(value: &Option<String>) -> Option<String> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
        }

        Some(GithubCredentials {
            token: present(&self.token)?,
            owner: present(&self.owner)?,
            repo: present(&self.repo)?,
        })
    }
}

fn invalid(message: &str) -> Error {
    Error::Other(anyhow::anyhow!("Config validation: {message}"))
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency. Missing credentials are allowed.
    pub fn validate(&self) -> Result<(), Error> {
        if self.upload.max_file_size == 0 {
            return Err(invalid("upload.max_file_size must be greater than 0"));
        }

        if self.upload.field_name.trim().is_empty() {
            return Err(invalid("upload.field_name cannot be empty"));
        }

        if self.upload.path_prefix.trim_matches('/').is_empty() {
            return Err(invalid("upload.path_prefix cannot be empty"));
        }

        if self.github.request_timeout.is_zero() {
            return Err(invalid("github.request_timeout must be greater than 0"));
        }

        if self.cors.allow_credentials && self.cors.allowed_origins.contains(&CorsOrigin::Wildcard) {
            return Err(invalid(
                "cors.allow_credentials cannot be combined with a wildcard origin",
            ));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        let figment = Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Prefixed environment variables override specific values
            .merge(Env::prefixed("IMGRELAY_").ignore(&["config"]).split("__"));

        // The plain names are what deployments usually set. Empty values keep the default.
        PLAIN_ENV_KEYS.iter().fold(figment, |figment, &(var, key)| match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => figment.merge(Env::raw().only(&[var]).map(move |_| key.into())),
            _ => figment,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
