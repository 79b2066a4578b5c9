//! Configuration loading and constants.
//!
//! Loads application configuration from TOML files and defines constants for
//! HTTP cache headers, default paths, and logging. `AppConfig` is the root
//! configuration struct. It is constructed once at startup and never mutated
//! afterwards; in particular, a fallback port chosen at bind time is *not*
//! written back here.

use const_format::formatcp;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::Path;

// =============================================================================
// HTTP Response Cache Control
// =============================================================================

/// Static assets (CSS, JS) - long cache with immutable hint
pub const HTTP_CACHE_STATIC_MAX_AGE: u32 = 86400;

pub const CACHE_CONTROL_STATIC: &str =
    formatcp!("public, max-age={}, immutable", HTTP_CACHE_STATIC_MAX_AGE);

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Directory for static files
pub const STATIC_DIR: &str = "static";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "quarry=debug,tower_http=debug";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    pub http: HttpServerConfig,
    /// Embedded datastore configuration
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub ui: UiConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    /// Bind address. `0.0.0.0` listens on every interface.
    #[serde(default = "HttpServerConfig::default_ip")]
    pub ip: String,
    /// Port for plain HTTP
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// Port for HTTPS (defaults to `port` when unset)
    pub https_port: Option<u16>,
    /// Passphrase for the TLS private key. The key must be stored decrypted;
    /// this is only consulted to produce a useful error when it isn't.
    pub cert_passphrase: Option<String>,
    /// Path to the PEM private key. TLS is enabled only when both `key_path`
    /// and `cert_path` are set.
    pub key_path: Option<String>,
    /// Path to the PEM certificate chain
    pub cert_path: Option<String>,
    /// Acquire the listening socket from systemd instead of binding a port
    #[serde(default)]
    pub systemd_socket: bool,
    /// Idle connection timeout in seconds (0 disables the timeout)
    #[serde(default = "HttpServerConfig::default_timeout")]
    pub timeout_seconds: u64,
    /// Path prefix the application is served under, e.g. `/quarry`
    #[serde(default)]
    pub base_url: String,
}

impl HttpServerConfig {
    fn default_ip() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }

    fn default_timeout() -> u64 {
        300
    }

    /// Effective HTTPS port (falls back to `port`)
    pub fn https_port(&self) -> u16 {
        self.https_port.unwrap_or(self.port)
    }

    /// Key and certificate paths, when both are present and non-empty.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (self.key_path.as_deref(), self.cert_path.as_deref()) {
            (Some(key), Some(cert)) if !key.is_empty() && !cert.is_empty() => Some((key, cert)),
            _ => None,
        }
    }
}

/// Embedded datastore configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    /// Directory holding the datastore files
    #[serde(default = "DbConfig::default_dir")]
    pub dir: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
        }
    }
}

impl DbConfig {
    fn default_dir() -> String {
        "data".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiConfig {
    /// Site title shown on the landing page. Defaults to the crate name.
    #[serde(default = "UiConfig::default_site_name")]
    pub site_name: String,
    /// Version string, populated at runtime
    #[serde(skip_deserializing, default = "UiConfig::default_version")]
    pub version: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            site_name: Self::default_site_name(),
            version: Self::default_version(),
        }
    }
}

impl UiConfig {
    fn default_site_name() -> String {
        env!("CARGO_PKG_NAME").to_string()
    }

    fn default_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }
}

/// Result of checking a loaded configuration for operator mistakes.
///
/// Warnings are surfaced in the log; any error stops startup before the
/// server binds anything.
#[derive(Debug, Default)]
pub struct Validations {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Check the configuration for problems that deserve an operator's
    /// attention before the server starts.
    pub fn validations(&self) -> Validations {
        let mut v = Validations::default();

        if self.http.ip.parse::<IpAddr>().is_err() {
            v.errors
                .push(format!("http.ip \"{}\" is not a valid IP address", self.http.ip));
        }

        if !self.http.base_url.is_empty() {
            if !self.http.base_url.starts_with('/') {
                v.errors
                    .push(format!("http.base_url \"{}\" must start with \"/\"", self.http.base_url));
            }
            if self.http.base_url.ends_with('/') {
                v.errors.push(format!(
                    "http.base_url \"{}\" must not end with \"/\"",
                    self.http.base_url
                ));
            }
        }

        let key_set = self.http.key_path.as_deref().is_some_and(|p| !p.is_empty());
        let cert_set = self.http.cert_path.as_deref().is_some_and(|p| !p.is_empty());
        if key_set != cert_set {
            v.warnings.push(
                "TLS requires both http.key_path and http.cert_path; serving plain HTTP"
                    .to_string(),
            );
        }
        if self.http.cert_passphrase.is_some() && self.http.tls_paths().is_none() {
            v.warnings
                .push("http.cert_passphrase is set but TLS is not configured".to_string());
        }

        if self.http.timeout_seconds == 0 {
            v.warnings
                .push("http.timeout_seconds is 0; idle connections will never be closed".to_string());
        }

        v
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(toml_str: &str) -> AppConfig {
        toml::from_str(toml_str).expect("config should parse")
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("[http]\n");
        assert_eq!(config.http.ip, "0.0.0.0");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.https_port(), 8080);
        assert_eq!(config.http.timeout_seconds, 300);
        assert!(!config.http.systemd_socket);
        assert_eq!(config.http.base_url, "");
        assert_eq!(config.db.dir, "data");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn https_port_overrides_port() {
        let config = parse("[http]\nport = 8080\nhttps_port = 8443\n");
        assert_eq!(config.http.https_port(), 8443);
    }

    #[test]
    fn load_reads_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\nip = \"127.0.0.1\"\nport = 9000").unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.http.ip, "127.0.0.1");
        assert_eq!(config.http.port, 9000);
    }

    #[test]
    fn load_rejects_missing_file() {
        assert!(matches!(
            AppConfig::load("no/such/config.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn tls_paths_requires_both_non_empty() {
        let both = parse("[http]\nkey_path = \"k.pem\"\ncert_path = \"c.pem\"\n");
        assert_eq!(both.http.tls_paths(), Some(("k.pem", "c.pem")));

        let key_only = parse("[http]\nkey_path = \"k.pem\"\n");
        assert_eq!(key_only.http.tls_paths(), None);

        let empty_cert = parse("[http]\nkey_path = \"k.pem\"\ncert_path = \"\"\n");
        assert_eq!(empty_cert.http.tls_paths(), None);

        let neither = parse("[http]\n");
        assert_eq!(neither.http.tls_paths(), None);
    }

    #[test]
    fn validations_accept_sane_config() {
        let v = parse("[http]\nbase_url = \"/quarry\"\n").validations();
        assert!(v.errors.is_empty(), "unexpected errors: {:?}", v.errors);
        assert!(v.warnings.is_empty(), "unexpected warnings: {:?}", v.warnings);
    }

    #[test]
    fn validations_reject_bad_base_url() {
        let v = parse("[http]\nbase_url = \"quarry\"\n").validations();
        assert_eq!(v.errors.len(), 1);

        let v = parse("[http]\nbase_url = \"/quarry/\"\n").validations();
        assert_eq!(v.errors.len(), 1);
    }

    #[test]
    fn validations_reject_bad_ip() {
        let v = parse("[http]\nip = \"not-an-ip\"\n").validations();
        assert_eq!(v.errors.len(), 1);
    }

    #[test]
    fn validations_warn_on_half_configured_tls() {
        let v = parse("[http]\ncert_path = \"c.pem\"\n").validations();
        assert!(v.errors.is_empty());
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn validations_warn_on_unused_passphrase() {
        let v = parse("[http]\ncert_passphrase = \"secret\"\n").validations();
        assert!(v.errors.is_empty());
        assert_eq!(v.warnings.len(), 1);
    }

    #[test]
    fn validations_warn_on_disabled_timeout() {
        let v = parse("[http]\ntimeout_seconds = 0\n").validations();
        assert!(v.errors.is_empty());
        assert_eq!(v.warnings.len(), 1);
    }
}
