//! Error types for pool and connection operations.

/// Error type for pool and connection operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The backend could not be reached, or did not answer the liveness check.
    #[error("failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    /// The backend rejected the configured password.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The backend rejected the database index.
    #[error("failed to select database {db}: {message}")]
    Select { db: i64, message: String },

    /// No connection could be obtained within the active bound.
    #[error("connection pool exhausted ({max_active} connections in use)")]
    Exhausted { max_active: usize },

    /// A command failed on an otherwise healthy connection.
    #[error("backend error: {0}")]
    Backend(String),

    /// The connection broke while a command was in flight.
    #[error("connection lost: {0}")]
    Disconnected(String),
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Create a connect error for `addr`.
    pub fn connect(addr: impl Into<String>, message: impl ToString) -> Self {
        Self::Connect {
            addr: addr.into(),
            message: message.to_string(),
        }
    }

    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a disconnected error.
    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::Disconnected(msg.into())
    }

    /// Whether no usable connection could be obtained.
    ///
    /// Pool exhaustion counts as a connect failure.
    pub fn is_connect_error(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Exhausted { .. })
    }

    /// Whether the connection that produced this error must not be reused.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

impl From<redis::RedisError> for PoolError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            Self::Disconnected(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}
