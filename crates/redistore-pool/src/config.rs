//! Configuration for the connection pool.

use std::time::Duration;

/// Default backend host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default backend port.
pub const DEFAULT_PORT: &str = "6379";

/// Default number of idle connections kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 5;

/// Default time an idle connection may sit unused before eviction.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(240);

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Backend host name or address.
    pub host: String,

    /// Backend port, kept as text as it appears in configuration files.
    pub port: String,

    /// Password sent with `AUTH` on every new connection.
    /// Without one, new connections are checked with `PING` instead.
    pub password: Option<String>,

    /// Database selected on every new connection.
    pub db_index: i64,

    /// Maximum number of idle connections kept for reuse.
    pub max_idle: usize,

    /// Idle connections unused for longer than this are closed.
    /// Zero disables idle eviction.
    pub idle_timeout: Duration,

    /// Upper bound on connections handed out at once. `None` is unbounded.
    pub max_active: Option<usize>,

    /// When the active bound is reached, wait for a release instead of
    /// failing with [`PoolError::Exhausted`].
    ///
    /// [`PoolError::Exhausted`]: crate::PoolError::Exhausted
    pub wait: bool,

    /// Check idle connections with `PING` before handing them out.
    pub test_on_borrow: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT.to_string(),
            password: None,
            db_index: 0,
            max_idle: DEFAULT_MAX_IDLE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_active: None,
            wait: false,
            test_on_borrow: true,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// `host:port` of the backend.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Set the backend host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the backend port.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    /// Set the password. An empty password is treated as none.
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

    /// Set the maximum number of idle connections.
    pub fn with_max_idle(mut self, max: usize) -> Self {
        self.max_idle = max;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Bound the number of connections handed out at once.
    pub fn with_max_active(mut self, max: usize) -> Self {
        self.max_active = Some(max);
        self
    }

    /// Wait for a release instead of failing when the active bound is hit.
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Enable or disable the liveness check on borrow.
    pub fn with_test_on_borrow(mut self, enabled: bool) -> Self {
        self.test_on_borrow = enabled;
        self
    }
}
