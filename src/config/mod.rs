use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::pool::PoolError;

/// Connection parameters for one backend
///
/// `initial` and `capacity` bound pooled backends (documents and services)
/// only; the database handle and cache client hold a single connection and
/// ignore them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend address (host:port)
    pub address: String,

    /// Optional user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Optional password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Optional database name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Connections to build before first use (default: 1)
    #[serde(default = "default_initial")]
    pub initial: usize,

    /// Maximum number of pooled connections (default: 10)
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Connect timeout in seconds (default: 20)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_initial() -> usize {
    1
}

fn default_capacity() -> usize {
    10
}

fn default_connect_timeout_secs() -> u64 {
    20
}

impl BackendConfig {
    /// Configuration for `address` with default bounds and no credentials
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            username: None,
            password: None,
            database: None,
            initial: default_initial(),
            capacity: default_capacity(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Check the address and timeout of the backend called `name`
    pub fn validate_endpoint(&self, name: &str) -> Result<(), PoolError> {
        if self.address.trim().is_empty() {
            return Err(PoolError::invalid_config(name, "address is empty"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(PoolError::invalid_config(name, "connect_timeout_secs must be greater than 0"));
        }
        Ok(())
    }

    /// Check the endpoint and pool bounds of the backend called `name`
    pub fn validate(&self, name: &str) -> Result<(), PoolError> {
        self.validate_endpoint(name)?;
        if self.capacity == 0 {
            return Err(PoolError::invalid_config(name, "capacity must be greater than 0"));
        }
        if self.initial > self.capacity {
            return Err(PoolError::invalid_config(
                name,
                format!("initial ({}) must not exceed capacity ({})", self.initial, self.capacity),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("initial", &self.initial)
            .field("capacity", &self.capacity)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Read-only lookup of backend configuration by name
pub trait ConfigSource: Send + Sync {
    fn backend(&self, name: &str) -> Option<BackendConfig>;
}

impl ConfigSource for HashMap<String, BackendConfig> {
    fn backend(&self, name: &str) -> Option<BackendConfig> {
        self.get(name).cloned()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document store, served from a slot pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<BackendConfig>,

    /// Relational database, served from a self-healing handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<BackendConfig>,

    /// Cache client, constructed once
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<BackendConfig>,

    /// Remote services, one pool per name
    #[serde(default)]
    pub services: HashMap<String, BackendConfig>,
}

impl Config {
    /// Create a new empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Every configured backend as (name, config), services sorted by name
    pub fn backends(&self) -> Vec<(String, &BackendConfig)> {
        let mut backends = Vec::new();
        for (name, backend) in [
            ("documents", &self.documents),
            ("database", &self.database),
            ("cache", &self.cache),
        ] {
            if let Some(backend) = backend {
                backends.push((name.to_string(), backend));
            }
        }

        let mut services: Vec<_> = self.services.iter().collect();
        services.sort_by(|a, b| a.0.cmp(b.0));
        backends.extend(services.into_iter().map(|(name, backend)| (name.clone(), backend)));

        backends
    }

    /// Validate every configured backend
    ///
    /// Pool bounds are checked for documents and services only.
    pub fn validate(&self) -> Result<(), PoolError> {
        if let Some(documents) = &self.documents {
            documents.validate("documents")?;
        }
        if let Some(database) = &self.database {
            database.validate_endpoint("database")?;
        }
        if let Some(cache) = &self.cache {
            cache.validate_endpoint("cache")?;
        }
        for (name, backend) in &self.services {
            backend.validate(name)?;
        }
        Ok(())
    }
}

impl ConfigSource for Config {
    fn backend(&self, name: &str) -> Option<BackendConfig> {
        self.services.get(name).cloned()
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config = serde_yaml::from_str(&content)
        .context("Failed to parse YAML configuration")?;

    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - LAZYPOOL_DOCUMENTS (document store address)
/// - LAZYPOOL_DATABASE (database address)
/// - LAZYPOOL_CACHE (cache address)
/// - LAZYPOOL_SERVICES (comma-separated `name=host:port` pairs)
/// - LAZYPOOL_CAPACITY, LAZYPOOL_INITIAL, LAZYPOOL_CONNECT_TIMEOUT (optional bounds)
///
/// At least one backend must be set.
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut template = BackendConfig::new("");

    if let Ok(capacity) = std::env::var("LAZYPOOL_CAPACITY") {
        template.capacity = capacity
            .parse()
            .context("LAZYPOOL_CAPACITY must be a positive integer")?;
    }

    if let Ok(initial) = std::env::var("LAZYPOOL_INITIAL") {
        template.initial = initial
            .parse()
            .context("LAZYPOOL_INITIAL must be a non-negative integer")?;
    }

    if let Ok(timeout) = std::env::var("LAZYPOOL_CONNECT_TIMEOUT") {
        template.connect_timeout_secs = timeout
            .parse()
            .context("LAZYPOOL_CONNECT_TIMEOUT must be a number of seconds")?;
    }

    let backend = |var: &str| {
        std::env::var(var)
            .ok()
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .map(|address| BackendConfig {
                address,
                ..template.clone()
            })
    };

    let mut config = Config::new();
    config.documents = backend("LAZYPOOL_DOCUMENTS");
    config.database = backend("LAZYPOOL_DATABASE");
    config.cache = backend("LAZYPOOL_CACHE");

    if let Ok(services) = std::env::var("LAZYPOOL_SERVICES") {
        for entry in services.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (name, address) = entry
                .split_once('=')
                .map(|(name, address)| (name.trim(), address))
                .filter(|(name, _)| !name.is_empty())
                .with_context(|| format!("Invalid LAZYPOOL_SERVICES entry '{}', expected name=host:port", entry))?;

            config.services.insert(
                name.to_string(),
                BackendConfig {
                    address: address.trim().to_string(),
                    ..template.clone()
                },
            );
        }
    }

    if config.backends().is_empty() {
        anyhow::bail!("No backends configured; set LAZYPOOL_DOCUMENTS, LAZYPOOL_DATABASE, LAZYPOOL_CACHE or LAZYPOOL_SERVICES");
    }

    config.validate().context("Invalid configuration")?;

    Ok(config)
}

/// Load configuration from file or environment
///
/// Loads from the YAML file when a path is given, otherwise from
/// environment variables.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
documents:
  address: "127.0.0.1:27017"
  username: admin
  password: secret
  capacity: 10

database:
  address: "127.0.0.1:5432"
  database: app

services:
  user:
    address: "10.0.0.5:9000"
    initial: 5
    capacity: 5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        let documents = config.documents.as_ref().unwrap();
        assert_eq!(documents.address, "127.0.0.1:27017");
        assert_eq!(documents.username.as_deref(), Some("admin"));
        assert_eq!(documents.capacity, 10);
        assert_eq!(documents.initial, 1);

        assert_eq!(config.database.as_ref().unwrap().database.as_deref(), Some("app"));
        assert!(config.cache.is_none());

        let user = config.backend("user").unwrap();
        assert_eq!(user.initial, 5);
        assert_eq!(user.capacity, 5);
        assert!(config.backend("documents").is_none());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config: Config = serde_yaml::from_str("cache:\n  address: \"127.0.0.1:6379\"\n").unwrap();
        let cache = config.cache.unwrap();

        assert_eq!(cache.initial, 1);
        assert_eq!(cache.capacity, 10);
        assert_eq!(cache.connect_timeout(), Duration::from_secs(20));
        assert!(cache.username.is_none());
        assert!(config.services.is_empty());
    }

    #[test]
    fn test_validate_bounds() {
        let ok = BackendConfig::new("127.0.0.1:1");
        assert!(ok.validate("x").is_ok());

        let empty = BackendConfig::new("  ");
        assert!(empty.validate("x").is_err());

        let inverted = BackendConfig {
            initial: 4,
            capacity: 2,
            ..BackendConfig::new("127.0.0.1:1")
        };
        let err = inverted.validate("user").unwrap_err();
        assert!(err.to_string().contains("initial (4)"));
    }

    #[test]
    fn test_single_connection_backends_ignore_bounds() {
        let mut config = Config::new();
        config.database = Some(BackendConfig {
            initial: 5,
            capacity: 0,
            ..BackendConfig::new("127.0.0.1:5432")
        });
        config.cache = Some(BackendConfig {
            initial: 3,
            capacity: 1,
            ..BackendConfig::new("127.0.0.1:6379")
        });
        assert!(config.validate().is_ok());

        config.cache = Some(BackendConfig::new(""));
        assert!(config.validate().is_err());

        config.cache = None;
        config.documents = Some(BackendConfig {
            initial: 3,
            capacity: 1,
            ..BackendConfig::new("127.0.0.1:27017")
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("documents"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let backend = BackendConfig {
            username: Some("app".to_string()),
            password: Some("hunter2".to_string()),
            ..BackendConfig::new("127.0.0.1:5432")
        };

        let rendered = format!("{:?}", backend);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
        assert!(rendered.contains("app"));
    }

    #[test]
    fn test_backends_order() {
        let mut config = Config::new();
        config.services.insert("b".to_string(), BackendConfig::new("h:2"));
        config.services.insert("a".to_string(), BackendConfig::new("h:1"));
        config.cache = Some(BackendConfig::new("h:3"));

        let names: Vec<_> = config.backends().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["cache", "a", "b"]);
    }
}
