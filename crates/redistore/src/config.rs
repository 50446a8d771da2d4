//! Store configuration.
//!
//! Configuration is a plain struct with defaults for every field, so a
//! partial TOML file (or none at all) yields a usable store:
//!
//! ```toml
//! host = "10.0.0.5"
//! port = "6380"
//! password = "secret"
//! db_index = 2
//! max_age_secs = 3600
//! key_prefix = "session:"
//!
//! [pool]
//! max_idle = 10
//! idle_timeout_secs = 120
//! max_active = 64
//! wait = true
//! ```
//!
//! `REDISTORE_HOST`, `REDISTORE_PORT`, `REDISTORE_PASSWORD` and
//! `REDISTORE_DB` override the file when set.

use std::path::Path;
use std::time::Duration;

use redistore_pool::{DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_IDLE, DEFAULT_PORT, PoolConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Default session lifetime: 30 minutes.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Environment variable overriding [`StoreConfig::host`].
pub const ENV_HOST: &str = "REDISTORE_HOST";
/// Environment variable overriding [`StoreConfig::port`].
pub const ENV_PORT: &str = "REDISTORE_PORT";
/// Environment variable overriding [`StoreConfig::password`].
pub const ENV_PASSWORD: &str = "REDISTORE_PASSWORD";
/// Environment variable overriding [`StoreConfig::db_index`].
pub const ENV_DB: &str = "REDISTORE_DB";

/// Session store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend host.
    pub host: String,

    /// Backend port.
    pub port: String,

    /// Backend password. Empty means no authentication.
    pub password: Option<String>,

    /// Database index selected on every connection.
    pub db_index: i64,

    /// Sliding session lifetime in seconds.
    pub max_age_secs: u64,

    /// Prepended to every session id to form the backend key.
    pub key_prefix: String,

    /// Connection pool settings.
    pub pool: PoolSettings,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            password: None,
            db_index: 0,
            max_age_secs: DEFAULT_MAX_AGE.as_secs(),
            key_prefix: String::new(),
            pool: PoolSettings::default(),
        }
    }
}

/// Connection pool section of [`StoreConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum idle connections kept for reuse.
    pub max_idle: usize,

    /// Seconds an idle connection may wait before it is closed (0 = never).
    pub idle_timeout_secs: u64,

    /// Maximum connections in use at once. Unbounded when absent.
    pub max_active: Option<usize>,

    /// Wait for a free connection instead of failing when `max_active` is reached.
    pub wait: bool,

    /// Check idle connections with `PING` before reuse.
    pub test_on_borrow: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle: DEFAULT_MAX_IDLE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            max_active: None,
            wait: false,
            test_on_borrow: true,
        }
    }
}

impl StoreConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string and validate.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the backend address.
    pub fn with_address(mut self, host: impl Into<String>, port: impl Into<String>) -> Self {
        self.host = host.into();
        self.port = port.into();
        self
    }

    /// Set the backend password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Set the database index.
    pub fn with_db_index(mut self, db_index: i64) -> Self {
        self.db_index = db_index;
        self
    }

    /// Set the session lifetime.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age_secs = max_age.as_secs();
        self
    }

    /// Set the backend key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the pool settings.
    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// The session lifetime.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Check field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }
        if self.port.parse::<u16>().is_err() {
            return Err(ConfigError::invalid(
                "port",
                format!("'{}' is not a valid port", self.port),
            ));
        }
        if self.db_index < 0 {
            return Err(ConfigError::invalid("db_index", "must not be negative"));
        }
        if self.pool.max_active == Some(0) {
            return Err(ConfigError::invalid("pool.max_active", "must be at least 1"));
        }
        Ok(())
    }

    /// Apply `REDISTORE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            debug!(var = ENV_HOST, "Overriding host from environment");
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            debug!(var = ENV_PORT, "Overriding port from environment");
            self.port = port;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            debug!(var = ENV_PASSWORD, "Overriding password from environment");
            self.password = (!password.is_empty()).then_some(password);
        }
        if let Some(db) = lookup(ENV_DB) {
            self.db_index = db
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("db_index", format!("'{db}' is not an integer")))?;
            debug!(var = ENV_DB, db = self.db_index, "Overriding database from environment");
        }
        self.validate()
    }

    /// Build the connection pool configuration.
    pub fn pool_config(&self) -> PoolConfig {
        let mut config = PoolConfig::new()
            .with_host(self.host.clone())
            .with_port(self.port.clone())
            .with_db_index(self.db_index)
            .with_max_idle(self.pool.max_idle)
            .with_idle_timeout(Duration::from_secs(self.pool.idle_timeout_secs))
            .with_wait(self.pool.wait)
            .with_test_on_borrow(self.pool.test_on_borrow);

        if let Some(password) = &self.password {
            config = config.with_password(password.clone());
        }
        if let Some(max_active) = self.pool.max_active {
            config = config.with_max_active(max_active);
        }
        config
    }
}

/// Load config from a TOML file and apply environment overrides.
pub fn load_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut config = StoreConfig::from_toml_str(&contents)?;
    config.apply_env()?;
    debug!(path = %path.display(), "Loaded store config");
    Ok(config)
}
