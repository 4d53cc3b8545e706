//! Configuration loading and types for RepoStore.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Each subsection governs a different part of the
//! system: networking, the upstream contents API, logging, and
//! observability.  Secrets are never placed in the file itself; the
//! upstream section only names the environment variables holding them.

use garde::Validate;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream repository contents API settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings (metrics + health probe).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body in bytes (uploads).
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
        }
    }
}

/// Upstream contents API configuration.
///
/// Objects live at `{api_url}/repos/{owner}/{repo}/contents/{name}` on
/// `branch`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpstreamConfig {
    /// Base URL of the hosting provider's REST API.
    #[serde(default = "default_api_url")]
    #[garde(length(min = 1), pattern(r"^https?://"))]
    pub api_url: String,

    /// Repository owner (user or organisation).
    #[serde(default = "default_owner")]
    #[garde(length(min = 1, max = 100))]
    pub owner: String,

    /// Repository name.
    #[serde(default = "default_repo")]
    #[garde(length(min = 1, max = 100))]
    pub repo: String,

    /// Branch that receives every write.
    #[serde(default = "default_branch")]
    #[garde(length(min = 1))]
    pub branch: String,

    /// Environment variable holding the primary token (required).
    #[serde(default = "default_primary_token_env")]
    #[garde(length(min = 1))]
    pub primary_token_env: String,

    /// Environment variable holding the fallback token (optional).
    #[serde(default = "default_fallback_token_env")]
    #[garde(skip)]
    pub fallback_token_env: String,

    /// Status code the upstream uses to signal a rejected credential.
    /// A response with this status triggers exactly one rotation + retry.
    #[serde(default = "default_auth_denied_status")]
    #[garde(range(min = 400, max = 499))]
    pub auth_denied_status: u16,

    /// `User-Agent` sent on every upstream request.
    #[serde(default = "default_user_agent")]
    #[garde(length(min = 1))]
    pub user_agent: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    #[garde(range(min = 1))]
    pub timeout_secs: u64,
}

impl UpstreamConfig {
    /// URL of the repository root in the contents API.
    pub fn contents_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/contents",
            self.api_url.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            owner: default_owner(),
            repo: default_repo(),
            branch: default_branch(),
            primary_token_env: default_primary_token_env(),
            fallback_token_env: default_fallback_token_env(),
            auth_denied_status: default_auth_denied_status(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
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

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_body_size() -> usize {
    100 * 1024 * 1024
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_owner() -> String {
    "MyScratchBlocks".to_string()
}

fn default_repo() -> String {
    "Project-DB".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_primary_token_env() -> String {
    "GH_KEY".to_string()
}

fn default_fallback_token_env() -> String {
    "GH_TOKEN_V".to_string()
}

fn default_auth_denied_status() -> u16 {
    403
}

fn default_user_agent() -> String {
    concat!("repostore/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load, parse, and validate configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse and validate configuration from YAML text.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    config
        .upstream
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid upstream configuration: {e}"))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = parse_config("{}").unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.upstream.branch, "main");
        assert_eq!(config.upstream.primary_token_env, "GH_KEY");
        assert_eq!(config.upstream.fallback_token_env, "GH_TOKEN_V");
        assert_eq!(config.upstream.auth_denied_status, 403);
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_contents_url() {
        let yaml = r#"
upstream:
  api_url: "https://ghe.example.com/api/v3/"
  owner: acme
  repo: store
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(
            config.upstream.contents_url(),
            "https://ghe.example.com/api/v3/repos/acme/store/contents"
        );
    }

    #[test]
    fn test_rejects_empty_repo() {
        let yaml = "upstream:\n  repo: \"\"\n";
        assert!(parse_config(yaml).is_err());
    }

    #[test]
    fn test_rejects_non_client_error_denied_status() {
        let yaml = "upstream:\n  auth_denied_status: 500\n";
        assert!(parse_config(yaml).is_err());
    }
}
