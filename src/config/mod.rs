//! Configuration management.
//!
//! Configuration is assembled once at startup from three layers, lowest
//! precedence first:
//!
//! 1. built-in defaults
//! 2. an optional configuration file (TOML, YAML or JSON, nested keys)
//! 3. environment variables
//!
//! # Environment Variables
//!
//! | Variable | Default |
//! |---|---|
//! | `CONSUL_HOST` | `localhost` |
//! | `CONSUL_PORT` | `8500` |
//! | `CONSUL_TOKEN` | unset |
//! | `CONSUL_DC` | unset |
//! | `CONSUL_SCHEME` | `http` |
//! | `CONSUL_TIMEOUT_SECS` | `10` |
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `8080` |
//! | `SSE_ENDPOINT` | `/sse` |
//! | `MESSAGES_ENDPOINT` | `/messages` |
//! | `HEALTH_ENDPOINT` | `/health` |
//! | `SESSION_IDLE_TIMEOUT_SECS` | `0` (disabled) |
//! | `SSE_KEEPALIVE_SECS` | `15` |
//! | `LOG_LEVEL` | `info` |
//! | `LOG_FILE_ENABLE` | `false` |
//! | `LOG_FILE` | unset |
//!
//! # Configuration File Format
//!
//! ```toml
//! [consul]
//! host = "consul.internal"
//! port = 8500
//! token = "secret"
//! datacenter = "dc1"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! session_idle_timeout_secs = 900
//!
//! [logging]
//! level = "debug"
//! enable_file = true
//! file = "/var/log/consul-mcp.log"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Environment variable to configuration key mapping.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("CONSUL_HOST", "consul.host"),
    ("CONSUL_PORT", "consul.port"),
    ("CONSUL_TOKEN", "consul.token"),
    ("CONSUL_DC", "consul.datacenter"),
    ("CONSUL_SCHEME", "consul.scheme"),
    ("CONSUL_TIMEOUT_SECS", "consul.timeout_secs"),
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("SSE_ENDPOINT", "server.sse_endpoint"),
    ("MESSAGES_ENDPOINT", "server.messages_endpoint"),
    ("HEALTH_ENDPOINT", "server.health_endpoint"),
    ("SESSION_IDLE_TIMEOUT_SECS", "server.session_idle_timeout_secs"),
    ("SSE_KEEPALIVE_SECS", "server.keep_alive_secs"),
    ("LOG_LEVEL", "logging.level"),
    ("LOG_FILE_ENABLE", "logging.enable_file"),
    ("LOG_FILE", "logging.file"),
];

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Consul connection settings
    #[serde(default)]
    pub consul: ConsulConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Consul connection configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ConsulConfig {
    #[serde(default = "default_consul_host")]
    pub host: String,

    #[serde(default = "default_consul_port")]
    pub port: u16,

    /// ACL token sent as `X-Consul-Token`
    #[serde(default)]
    pub token: Option<String>,

    /// Datacenter used when a call does not name one
    #[serde(default)]
    pub datacenter: Option<String>,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_consul_timeout")]
    pub timeout_secs: u64,
}

impl ConsulConfig {
    /// Base URL of the Consul HTTP API, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            host: default_consul_host(),
            port: default_consul_port(),
            token: None,
            datacenter: None,
            scheme: default_scheme(),
            timeout_secs: default_consul_timeout(),
        }
    }
}

// Hand-written so the token never reaches a log line.
impl fmt::Debug for ConsulConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsulConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .field("datacenter", &self.datacenter)
            .field("scheme", &self.scheme)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl fmt::Display for ConsulConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (token={}, dc={})",
            self.base_url(),
            if self.token.is_some() { "***" } else { "None" },
            self.datacenter.as_deref().unwrap_or("None")
        )
    }
}

fn default_consul_host() -> String {
    "localhost".to_string()
}

fn default_consul_port() -> u16 {
    8500
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_consul_timeout() -> u64 {
    10
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    #[serde(default = "default_sse_endpoint")]
    pub sse_endpoint: String,

    #[serde(default = "default_messages_endpoint")]
    pub messages_endpoint: String,

    #[serde(default = "default_health_endpoint")]
    pub health_endpoint: String,

    /// Close a session after this many seconds without inbound messages (0 disables)
    #[serde(default)]
    pub session_idle_timeout_secs: u64,

    /// Interval between SSE keep-alive comments
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl ServerConfig {
    /// Socket address string to bind to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_idle_timeout(&self) -> Option<Duration> {
        (self.session_idle_timeout_secs > 0)
            .then(|| Duration::from_secs(self.session_idle_timeout_secs))
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            sse_endpoint: default_sse_endpoint(),
            messages_endpoint: default_messages_endpoint(),
            health_endpoint: default_health_endpoint(),
            session_idle_timeout_secs: 0,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_sse_endpoint() -> String {
    "/sse".to_string()
}

fn default_messages_endpoint() -> String {
    "/messages".to_string()
}

fn default_health_endpoint() -> String {
    "/health".to_string()
}

fn default_keep_alive() -> u64 {
    15
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level (`trace`, `debug`, `info`, `warn`, `error`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to also write logs to `file`
    #[serde(default)]
    pub enable_file: bool,

    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            enable_file: false,
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from defaults, an optional file and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Load configuration with a custom environment lookup.
///
/// Empty values are treated as unset.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<Config, config::ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path));
    }

    for (var, key) in ENV_OVERRIDES {
        let value = lookup(var).filter(|v| !v.trim().is_empty());
        builder = builder.set_override_option(*key, value)?;
    }

    builder.build()?.try_deserialize()
}

/// Get the configuration from the environment only
pub fn get_config() -> Config {
    load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Invalid configuration in environment, using defaults: {}", e);
        Config::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = load_config_with(None, env(&[])).unwrap();
        assert_eq!(config.consul.host, "localhost");
        assert_eq!(config.consul.port, 8500);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.sse_endpoint, "/sse");
        assert_eq!(config.server.messages_endpoint, "/messages");
        assert_eq!(config.server.health_endpoint, "/health");
        assert!(config.server.session_idle_timeout().is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.enable_file);
    }

    #[test]
    fn test_env_overrides() {
        let config = load_config_with(
            None,
            env(&[
                ("CONSUL_HOST", "consul.internal"),
                ("CONSUL_PORT", "8501"),
                ("CONSUL_TOKEN", "secret"),
                ("CONSUL_DC", "eu-west"),
                ("PORT", "9000"),
                ("MESSAGES_ENDPOINT", "/rpc"),
                ("SESSION_IDLE_TIMEOUT_SECS", "300"),
                ("LOG_FILE_ENABLE", "true"),
                ("LOG_FILE", "/tmp/mcp.log"),
            ]),
        )
        .unwrap();

        assert_eq!(config.consul.base_url(), "http://consul.internal:8501");
        assert_eq!(config.consul.token.as_deref(), Some("secret"));
        assert_eq!(config.consul.datacenter.as_deref(), Some("eu-west"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.messages_endpoint, "/rpc");
        assert_eq!(
            config.server.session_idle_timeout(),
            Some(Duration::from_secs(300))
        );
        assert!(config.logging.enable_file);
        assert_eq!(config.logging.file.as_deref(), Some("/tmp/mcp.log"));
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let result = load_config_with(None, env(&[("CONSUL_PORT", "not-a-port")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_token_is_masked() {
        let config = ConsulConfig {
            token: Some("super-secret".to_string()),
            ..ConsulConfig::default()
        };
        assert!(!format!("{}", config).contains("super-secret"));
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
