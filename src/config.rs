//! Configuration management for the contact gate.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration as StdDuration;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ContactGateError, Result};
use crate::ratelimit::{
    duration_ms, RateLimitPolicy, DEFAULT_MAX_SUBMISSIONS, DEFAULT_MIN_INTERVAL_MS,
    DEFAULT_WINDOW_MS,
};

/// Prefix for layered environment overrides, e.g. `CONTACT_GATE__SERVER__BIND_ADDR`.
pub const ENV_PREFIX: &str = "CONTACT_GATE";

/// Legacy variable naming the backend endpoint.
pub const LEGACY_ENDPOINT_VAR: &str = "CONTACT_API_URL";

/// Upper bound on any configured duration (one year).
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactGateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Token configuration
    #[serde(default)]
    pub token: TokenConfig,

    /// Client transport configuration
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Mark the session cookie `Secure`
    #[serde(default)]
    pub secure_cookies: bool,

    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`.
    /// Enable only behind a reverse proxy that overwrites both headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,

    /// Idle lifetime of a server-side session
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Interval of the rate limit and session cleanup task
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            secure_cookies: false,
            trust_proxy_headers: false,
            session_ttl_secs: default_session_ttl(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl ServerConfig {
    pub fn session_ttl(&self) -> chrono::Duration {
        duration_ms(self.session_ttl_secs.saturating_mul(1000))
    }

    pub fn cleanup_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_cleanup_interval() -> u64 {
    900
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Accepted submissions per window
    #[serde(default = "default_max_submissions")]
    pub max_submissions: u32,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Minimum spacing between submissions of one session, in milliseconds
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_submissions: default_max_submissions(),
            window_ms: default_window_ms(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl RateLimitingConfig {
    /// Client policy: window and spacing both apply.
    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(
            self.max_submissions,
            duration_ms(self.window_ms),
            duration_ms(self.min_interval_ms),
        )
    }

    /// Server policy per IP address.
    pub fn ip_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::window_only(self.max_submissions, duration_ms(self.window_ms))
    }

    /// Server policy per session.
    pub fn session_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy::spacing_only(duration_ms(self.min_interval_ms))
    }
}

fn default_max_submissions() -> u32 {
    DEFAULT_MAX_SUBMISSIONS
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_min_interval_ms() -> u64 {
    DEFAULT_MIN_INTERVAL_MS
}

/// Token configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Token lifetime in seconds
    #[serde(default = "default_token_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl TokenConfig {
    pub fn ttl(&self) -> chrono::Duration {
        duration_ms(self.ttl_secs.saturating_mul(1000))
    }
}

fn default_token_ttl_secs() -> u64 {
    3600
}

/// Client transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Backend endpoint; the mock transport is used when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bound on one dispatch, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay of the mock transport, in milliseconds
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            mock_delay_ms: default_mock_delay_ms(),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.timeout_ms)
    }

    pub fn mock_delay(&self) -> StdDuration {
        StdDuration::from_millis(self.mock_delay_ms)
    }
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_mock_delay_ms() -> u64 {
    1500
}

impl ContactGateConfig {
    /// Load configuration from a YAML file path, without environment layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ContactGateError::Config(e.to_string()))
    }

    /// Layered load: defaults, then the optional YAML file, then environment.
    ///
    /// Environment keys use `CONTACT_GATE__<SECTION>__<KEY>`.
    /// `CONTACT_API_URL`, when set, overrides `transport.endpoint`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }

        let mut config: ContactGateConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if let Ok(endpoint) = std::env::var(LEGACY_ENDPOINT_VAR) {
            if !endpoint.trim().is_empty() {
                config.transport.endpoint = Some(endpoint);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the limiter meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.max_submissions == 0 {
            return Err(ContactGateError::Config(
                "rate_limiting.max_submissions must be at least 1".to_string(),
            ));
        }
        if self.rate_limiting.window_ms == 0 {
            return Err(ContactGateError::Config(
                "rate_limiting.window_ms must be positive".to_string(),
            ));
        }
        if self.token.ttl_secs == 0 {
            return Err(ContactGateError::Config(
                "token.ttl_secs must be positive".to_string(),
            ));
        }

        let secs = |value: u64| value.saturating_mul(1000);
        let max_ms = secs(MAX_DURATION_SECS);
        let durations_ms = [
            ("rate_limiting.window_ms", self.rate_limiting.window_ms),
            ("rate_limiting.min_interval_ms", self.rate_limiting.min_interval_ms),
            ("token.ttl_secs", secs(self.token.ttl_secs)),
            ("server.session_ttl_secs", secs(self.server.session_ttl_secs)),
            ("server.cleanup_interval_secs", secs(self.server.cleanup_interval_secs)),
            ("transport.timeout_ms", self.transport.timeout_ms),
            ("transport.mock_delay_ms", self.transport.mock_delay_ms),
        ];
        for (key, ms) in durations_ms {
            if ms > max_ms {
                return Err(ContactGateError::Config(format!(
                    "{} exceeds the maximum of {} days",
                    key,
                    MAX_DURATION_SECS / 86_400
                )));
            }
        }
        Ok(())
    }
}
