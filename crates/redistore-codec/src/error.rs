//! Error types for value encoding and decoding.

use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Error type for codec operations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A struct was passed by value; it must be wrapped in `Box` or `Arc`.
    #[error("type {type_name} cannot be encoded by value, pass it behind a Box or Arc")]
    TypeNotEncodable {
        /// Name of the rejected type.
        type_name: &'static str,
    },

    /// The type has not been registered and auto-registration is disabled.
    #[error("type {type_name} is not registered")]
    UnregisteredType {
        /// Name of the unregistered type.
        type_name: &'static str,
    },

    /// The type has no stable serialized form.
    #[error("unhandled type: {type_name}")]
    UnhandledType {
        /// Name of the rejected type.
        type_name: &'static str,
    },

    /// A tag is already bound to a different type (or the type to another tag).
    #[error("type tag '{tag}' conflicts with the registration of {existing}")]
    TagConflict {
        /// The requested tag.
        tag: String,
        /// The type that already owns the tag.
        existing: &'static str,
    },

    /// The value could not be serialized.
    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),

    /// The bytes are malformed, truncated, carry an unknown tag or the wrong type.
    #[error("failed to decode value: {0}")]
    Decode(String),
}

impl CodecError {
    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Whether this error happened while decoding.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}
