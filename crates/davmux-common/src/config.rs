//! Configuration types for davmux
//!
//! The gateway reads a TOML file into [`Config`]. Every section and field
//! has a default so a missing or partial file still yields a usable
//! configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Root configuration for davmux
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Backends exposed as folders, in any order
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

/// Listener and virtual tree layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Optional folder that nests every backend, e.g. a domain name
    #[serde(default)]
    pub static_root: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            static_root: None,
        }
    }
}

/// PROPFIND result cache
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Outbound connection settings shared by every backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-request timeout, 0 disables it
    #[serde(default)]
    pub request_timeout_ms: u64,
    #[serde(default = "default_pool_idle_timeout_secs")]
    pub pool_idle_timeout_secs: u64,
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: 0,
            pool_idle_timeout_secs: default_pool_idle_timeout_secs(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Option<Duration> {
        if self.request_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.request_timeout_ms))
        }
    }

    #[must_use]
    pub const fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A single WebDAV backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Folder name under the virtual root
    pub name: String,
    /// Base URL requests are forwarded to
    pub url: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

const fn default_cache_enabled() -> bool {
    true
}

const fn default_cache_ttl_secs() -> u64 {
    10
}

const fn default_connect_timeout_ms() -> u64 {
    5000
}

const fn default_pool_idle_timeout_secs() -> u64 {
    90
}

const fn default_pool_max_idle_per_host() -> usize {
    32
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| Error::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&s)
    }

    /// Check backend names and URLs
    pub fn validate(&self) -> Result<()> {
        if let Some(root) = &self.gateway.static_root {
            validate_folder_name(root)?;
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            validate_folder_name(&backend.name)?;
            if !seen.insert(backend.name.as_str()) {
                return Err(Error::configuration(format!(
                    "duplicate backend name: {}",
                    backend.name
                )));
            }
            validate_url(&backend.url)?;
        }
        Ok(())
    }
}

fn validate_folder_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::configuration(format!("invalid folder name: {name:?}")));
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e| Error::configuration(format!("invalid backend url {url}: {e}")))?;
    match uri.scheme_str() {
        Some("http" | "https") if uri.authority().is_some() => Ok(()),
        _ => Err(Error::configuration(format!(
            "backend url must be absolute http(s): {url}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway.listen, "0.0.0.0:8080");
        assert!(config.gateway.static_root.is_none());
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl(), Duration::from_secs(10));
        assert!(config.transport.request_timeout().is_none());
        assert!(config.backends.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(
            r#"
            [gateway]
            listen = "127.0.0.1:9090"
            static_root = "domain"

            [cache]
            ttl_secs = 3

            [transport]
            request_timeout_ms = 1500

            [[backends]]
            name = "remote2"
            url = "http://10.0.0.2:8080/share"

            [[backends]]
            name = "remote1"
            url = "https://10.0.0.1/"
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.static_root.as_deref(), Some("domain"));
        assert_eq!(config.cache.ttl(), Duration::from_secs(3));
        assert_eq!(
            config.transport.request_timeout(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].name, "remote2");
    }

    #[test]
    fn test_rejects_duplicate_backends() {
        let err = Config::from_toml_str(
            r#"
            [[backends]]
            name = "remote1"
            url = "http://a"

            [[backends]]
            name = "remote1"
            url = "http://b"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate backend name"));
    }

    #[test]
    fn test_rejects_bad_names_and_urls() {
        let bad_name = r#"
            [[backends]]
            name = "a/b"
            url = "http://a"
        "#;
        assert!(Config::from_toml_str(bad_name).is_err());

        let relative_url = r#"
            [[backends]]
            name = "remote1"
            url = "/just/a/path"
        "#;
        assert!(Config::from_toml_str(relative_url).is_err());

        let bad_root = r#"
            [gateway]
            static_root = ""
        "#;
        assert!(Config::from_toml_str(bad_root).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert!(config.backends.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[gateway]\nstatic_root = \"domain\"\n[[backends]]\nname = \"remote1\"\nurl = \"http://127.0.0.1:1\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.gateway.static_root.as_deref(), Some("domain"));
        assert_eq!(config.backends[0].url, "http://127.0.0.1:1");
    }
}
