//! Reconciler configuration.
//!
//! This module defines the TOML-deserializable configuration for the reconciler:
//! where the API lives, which tier the checkout is for, how the token may arrive,
//! and where to send the user afterwards.
//!
//! ```toml
//! base_url = "https://app.example.com"
//! target_tier = "pro"
//! home_path = "/dashboard"
//! redirect_delay_ms = 3000
//!
//! [endpoints]
//! complete_upgrade = "/api/complete-upgrade"
//! subscription_status = "/api/subscription-status"
//! current_user = "/api/user"
//!
//! [token]
//! primary = "session_id"
//! aliases = ["sessionId", "checkout_session_id"]
//!
//! [http]
//! timeout_secs = 30
//! connect_timeout_secs = 10
//! ```

use std::{path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    account::Tier,
    error::{ReconcileError, Result},
    token::TokenParams,
};

/// Upper bound for the post-success redirect delay.
const MAX_REDIRECT_DELAY_MS: u64 = 60_000;

/// Root reconciler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Base URL of the application API.
    pub base_url: String,

    /// Tier the checkout purchases.
    #[serde(default = "default_target_tier")]
    pub target_tier: Tier,

    /// Path of the application's landing surface.
    #[serde(default = "default_home_path")]
    pub home_path: String,

    /// Delay between confirming success and redirecting home.
    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,

    /// Endpoint paths.
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Query parameter names carrying the checkout token.
    #[serde(default)]
    pub token: TokenParams,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpConfig,
}

impl ReconcilerConfig {
    /// Creates a configuration with defaults for everything but the base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            target_tier: default_target_tier(),
            home_path: default_home_path(),
            redirect_delay_ms: default_redirect_delay_ms(),
            endpoints: EndpointConfig::default(),
            token: TokenParams::default(),
            http: HttpConfig::default(),
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if parsing or validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use tier_reconciler::{account::Tier, config::ReconcilerConfig};
    ///
    /// let config = ReconcilerConfig::from_toml(r#"
    ///     base_url = "https://app.example.com"
    ///     target_tier = "elite"
    /// "#)?;
    /// assert_eq!(config.target_tier, Tier::Elite);
    /// assert_eq!(config.endpoints.complete_upgrade, "/api/complete-upgrade");
    /// # Ok::<(), tier_reconciler::error::ReconcileError>(())
    /// ```
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ReconcileError::InvalidConfig(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if the file cannot be read or the
    /// content is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::InvalidConfig(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] describing the first violation found.
    pub fn validate(&self) -> Result<()> {
        self.parsed_base_url()?;

        if !self.target_tier.is_paid() {
            return Err(ReconcileError::InvalidConfig(
                "target_tier must be a paid tier".to_owned(),
            ));
        }
        validate_endpoint_path("home_path", &self.home_path)?;
        if self.redirect_delay_ms > MAX_REDIRECT_DELAY_MS {
            return Err(ReconcileError::InvalidConfig(format!(
                "redirect_delay_ms must be at most {MAX_REDIRECT_DELAY_MS}"
            )));
        }

        self.endpoints.validate()?;
        self.token.validate()?;
        self.http.validate()
    }

    /// Parses the base URL, enforcing HTTPS and rejecting loopback hosts.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if the URL is malformed or violates
    /// the policy.
    pub fn parsed_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ReconcileError::InvalidConfig(format!("invalid base_url '{}': {e}", self.base_url))
        })?;

        if url.scheme() != "https" {
            return Err(ReconcileError::InvalidConfig(format!(
                "base_url must use HTTPS, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str() {
            let host_lower = host.to_lowercase();
            if host_lower == "localhost"
                || host_lower.starts_with("127.")
                || host_lower == "::1"
                || host_lower == "[::1]"
            {
                return Err(ReconcileError::InvalidConfig(format!(
                    "base_url must not be localhost or loopback: {host}"
                )));
            }
        }

        Ok(url)
    }

    /// Delay before the post-success redirect.
    #[must_use]
    pub const fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

/// API endpoint paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    /// Upgrade completion endpoint (`POST`).
    #[serde(default = "default_complete_upgrade")]
    pub complete_upgrade: String,

    /// Subscription status endpoint (`GET`).
    #[serde(default = "default_subscription_status")]
    pub subscription_status: String,

    /// Current user endpoint (`GET`), used to refresh the cached account.
    #[serde(default = "default_current_user")]
    pub current_user: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            complete_upgrade: default_complete_upgrade(),
            subscription_status: default_subscription_status(),
            current_user: default_current_user(),
        }
    }
}

impl EndpointConfig {
    /// Validates every endpoint path.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] if any path is invalid.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint_path("complete_upgrade", &self.complete_upgrade)?;
        validate_endpoint_path("subscription_status", &self.subscription_status)?;
        validate_endpoint_path("current_user", &self.current_user)
    }
}

fn validate_endpoint_path(name: &str, path: &str) -> Result<()> {
    if path.contains("..") {
        return Err(ReconcileError::InvalidConfig(format!(
            "'{name}' contains path traversal sequence '..': {path}"
        )));
    }
    if path.contains("//") {
        return Err(ReconcileError::InvalidConfig(format!(
            "'{name}' contains double slash '//': {path}"
        )));
    }
    if !path.starts_with('/') {
        return Err(ReconcileError::InvalidConfig(format!("'{name}' must start with '/': {path}")));
    }
    Ok(())
}

/// Client settings shared by the completion, status and account endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Idle connections kept to the API host between calls.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Upper bound in seconds on one endpoint call, body included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound in seconds on reaching the API host.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: default_pool_max_idle(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Checks that both timeouts are set.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] unless `timeout_secs` is in 1..=300
    /// and `connect_timeout_secs` is in 1..=60.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 || self.timeout_secs > 300 {
            return Err(ReconcileError::InvalidConfig(
                "http.timeout_secs must be between 1 and 300".to_owned(),
            ));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > 60 {
            return Err(ReconcileError::InvalidConfig(
                "http.connect_timeout_secs must be between 1 and 60".to_owned(),
            ));
        }
        Ok(())
    }

    /// Timeout applied to each reconciliation and account call.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Time allowed to open a connection to the API host.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

const fn default_target_tier() -> Tier {
    Tier::Pro
}

fn default_home_path() -> String {
    "/".to_owned()
}

const fn default_redirect_delay_ms() -> u64 {
    3000
}

fn default_complete_upgrade() -> String {
    "/api/complete-upgrade".to_owned()
}

fn default_subscription_status() -> String {
    "/api/subscription-status".to_owned()
}

fn default_current_user() -> String {
    "/api/user".to_owned()
}

const fn default_pool_max_idle() -> usize {
    10
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_connect_timeout_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = ReconcilerConfig::from_toml("base_url = \"https://app.example.com\"").unwrap();
        assert_eq!(config.target_tier, Tier::Pro);
        assert_eq!(config.home_path, "/");
        assert_eq!(config.redirect_delay(), Duration::from_secs(3));
        assert_eq!(config.endpoints, EndpointConfig::default());
        assert_eq!(config.token, TokenParams::default());
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_full_config() {
        let toml = r#"
            base_url = "https://api.example.com"
            target_tier = "elite"
            home_path = "/dashboard"
            redirect_delay_ms = 1500

            [endpoints]
            complete_upgrade = "/v2/billing/complete"

            [token]
            primary = "cs"
            aliases = ["checkout", "session"]

            [http]
            timeout_secs = 15
        "#;

        let config = ReconcilerConfig::from_toml(toml).unwrap();
        assert_eq!(config.target_tier, Tier::Elite);
        assert_eq!(config.home_path, "/dashboard");
        assert_eq!(config.endpoints.complete_upgrade, "/v2/billing/complete");
        assert_eq!(config.endpoints.subscription_status, "/api/subscription-status");
        assert_eq!(config.token.names().collect::<Vec<_>>(), ["cs", "checkout", "session"]);
        assert_eq!(config.http.timeout_secs, 15);
        assert_eq!(config.http.connect_timeout_secs, 10);
    }

    #[test]
    fn test_rejects_http_base_url() {
        let err = ReconcilerConfig::from_toml("base_url = \"http://app.example.com\"").unwrap_err();
        assert!(err.to_string().contains("HTTPS"));
    }

    #[test]
    fn test_rejects_loopback() {
        for host in ["https://localhost", "https://127.0.0.1:8443", "https://[::1]"] {
            let config = ReconcilerConfig::new(host);
            assert!(config.validate().is_err(), "{host} should be rejected");
        }
    }

    #[test]
    fn test_rejects_free_target() {
        let toml = "base_url = \"https://app.example.com\"\ntarget_tier = \"free\"";
        assert!(ReconcilerConfig::from_toml(toml).is_err());
    }

    #[test]
    fn test_rejects_endpoint_traversal() {
        let mut config = ReconcilerConfig::new("https://app.example.com");
        config.endpoints.subscription_status = "/api/../admin".to_owned();
        assert!(config.validate().is_err());
        config.endpoints.subscription_status = "api/status".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_single_alias() {
        let toml = r#"
            base_url = "https://app.example.com"
            [token]
            aliases = ["sessionId"]
        "#;
        let err = ReconcilerConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("at least two"));
    }

    #[test]
    fn test_rejects_long_redirect_delay() {
        let mut config = ReconcilerConfig::new("https://app.example.com");
        config.redirect_delay_ms = 120_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = ReconcilerConfig::new("https://app.example.com");
        config.http.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_tier_fails_parse() {
        let toml = "base_url = \"https://app.example.com\"\ntarget_tier = \"platinum\"";
        assert!(ReconcilerConfig::from_toml(toml).is_err());
    }
}
