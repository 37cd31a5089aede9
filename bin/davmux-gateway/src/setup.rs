//! Turning a loaded configuration into a running router

use anyhow::{Context, Result};
use davmux_common::Config;
use davmux_composite::{BackendSpec, CompositeRouter, HttpTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub static_root: Option<String>,
    pub cache_ttl_secs: Option<u64>,
}

impl Overrides {
    /// Apply to `config` and re-validate
    pub fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(listen) = &self.listen {
            config.gateway.listen.clone_from(listen);
        }
        if let Some(root) = &self.static_root {
            config.gateway.static_root = Some(root.clone());
        }
        if let Some(ttl) = self.cache_ttl_secs {
            config.cache.ttl_secs = ttl;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Read the configuration file with overrides applied
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<Config> {
    let config =
        Config::load(path).with_context(|| format!("loading {}", path.display()))?;
    overrides.apply(config)
}

/// Backend registrations sharing one transport
pub fn backend_specs(config: &Config, transport: &Arc<dyn Transport>) -> Vec<BackendSpec> {
    config
        .backends
        .iter()
        .map(|b| BackendSpec::new(&b.name, &b.url, Arc::clone(transport)))
        .collect()
}

fn new_transport(config: &Config) -> Result<Arc<dyn Transport>> {
    let transport = HttpTransport::new(config.transport.clone())
        .context("building backend HTTP client")?;
    Ok(Arc::new(transport))
}

/// Build the router and install the configured backends
pub fn build_router(config: &Config) -> Result<Arc<CompositeRouter>> {
    let mut router = CompositeRouter::new();
    if config.cache.enabled && config.cache.ttl_secs > 0 {
        info!("PROPFIND cache enabled (ttl {}s)", config.cache.ttl_secs);
        router = router.with_stat_cache(config.cache.ttl());
    }
    let router = Arc::new(router);
    install(&router, config)?;
    Ok(router)
}

/// Replace the router's backends with those in `config`.
///
/// A fresh transport is built each time so that the previous one has its
/// idle connections closed by the swap.
pub fn install(router: &CompositeRouter, config: &Config) -> Result<()> {
    let transport = new_transport(config)?;
    for backend in &config.backends {
        info!("Backend {} -> {}", backend.name, backend.url);
    }
    if config.backends.is_empty() {
        warn!("No backends configured");
    }
    router.replace_backends(
        config.gateway.static_root.clone(),
        backend_specs(config, &transport),
    );
    Ok(())
}

/// Re-read the configuration and swap in its backends. Listen address and
/// cache settings only take effect on restart.
pub fn reload(router: &CompositeRouter, path: &Path, overrides: &Overrides, ttl: Duration) -> Result<()> {
    let config = load_config(path, overrides)?;
    if config.cache.ttl() != ttl {
        warn!("Cache TTL changes take effect on restart");
    }
    install(router, &config)?;
    info!("Reloaded configuration from {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
[gateway]
static_root = "domain"

[cache]
ttl_secs = 30

[[backends]]
name = "remote2"
url = "http://10.0.0.2:8080/share"

[[backends]]
name = "remote1"
url = "http://10.0.0.1"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_overrides() {
        let file = write_config(CONFIG);
        let overrides = Overrides {
            listen: Some("127.0.0.1:9999".to_string()),
            static_root: Some("tailnet".to_string()),
            cache_ttl_secs: Some(5),
        };
        let config = load_config(file.path(), &overrides).unwrap();
        assert_eq!(config.gateway.listen, "127.0.0.1:9999");
        assert_eq!(config.gateway.static_root.as_deref(), Some("tailnet"));
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.backends.len(), 2);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let file = write_config(CONFIG);
        let overrides = Overrides {
            static_root: Some("a/b".to_string()),
            ..Overrides::default()
        };
        assert!(load_config(file.path(), &overrides).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml"), &Overrides::default()).unwrap();
        assert!(config.backends.is_empty());
        assert!(config.gateway.static_root.is_none());
    }

    #[test]
    fn test_build_and_reload() {
        let file = write_config(CONFIG);
        let overrides = Overrides::default();
        let config = load_config(file.path(), &overrides).unwrap();
        let router = build_router(&config).unwrap();
        assert_eq!(router.virtual_depth(), 2);
        assert_eq!(router.backend_names(), vec!["remote1", "remote2"]);
        assert!(router.stat_cache().is_some());

        std::fs::write(
            file.path(),
            "[[backends]]\nname = \"remote3\"\nurl = \"https://10.0.0.3\"\n",
        )
        .unwrap();
        reload(&router, file.path(), &overrides, config.cache.ttl()).unwrap();
        assert_eq!(router.virtual_depth(), 1);
        assert_eq!(router.backend_names(), vec!["remote3"]);
    }

    #[test]
    fn test_reload_keeps_backends_on_error() {
        let file = write_config(CONFIG);
        let overrides = Overrides::default();
        let config = load_config(file.path(), &overrides).unwrap();
        let router = build_router(&config).unwrap();

        std::fs::write(file.path(), "[[backends]]\nname = \"x\"\nurl = \"ftp://x\"\n").unwrap();
        assert!(reload(&router, file.path(), &overrides, config.cache.ttl()).is_err());
        assert_eq!(router.backend_names(), vec!["remote1", "remote2"]);
    }

    #[test]
    fn test_cache_disabled() {
        let mut config = Config::default();
        config.cache.enabled = false;
        let router = build_router(&config).unwrap();
        assert!(router.stat_cache().is_none());
    }
}
