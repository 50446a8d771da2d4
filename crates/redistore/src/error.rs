//! Error types for the session store.

use redistore_codec::CodecError;
use redistore_pool::PoolError;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the session store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The backend could not be reached or a command failed.
    #[error("backend error: {0}")]
    Pool(#[from] PoolError),

    /// The store configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether no backend connection could be obtained.
    pub fn is_connect_error(&self) -> bool {
        matches!(self, Self::Pool(e) if e.is_connect_error())
    }
}

/// Errors that can occur while loading store configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or malformed.
    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}
