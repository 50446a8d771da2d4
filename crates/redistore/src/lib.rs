//! Server-side session storage on a Redis-protocol backend.
//!
//! This crate is the store a session middleware plugs in. It provides:
//! - Per-session field maps holding values of any [`Storable`] type
//! - Sliding expiry: every read or write resets the session's lifetime
//! - Pooled, health-checked backend connections
//! - TOML configuration with environment overrides
//!
//! # Example
//!
//! ```rust,ignore
//! use redistore::{RedisStore, SessionId, StoreConfig};
//!
//! let store = RedisStore::new(StoreConfig::default())?;
//! store.run().await?;
//!
//! let id = SessionId::from("f3a1c2");
//! store.set_value(&id, "name", &"alice".to_string()).await?;
//! assert_eq!(store.get_as::<String>(&id, "name").await.as_deref(), Some("alice"));
//! ```

mod config;
mod error;
mod id;
mod store;
mod traits;

pub use config::{
    DEFAULT_MAX_AGE, ENV_DB, ENV_HOST, ENV_PASSWORD, ENV_PORT, PoolSettings, StoreConfig,
    load_config,
};
pub use error::{ConfigError, Error, Result};
pub use id::SessionId;
pub use store::{RedisStore, SessionState};
pub use traits::SessionStore;

pub use redistore_codec::{Codec, CodecConfig, CodecError, Kind, Storable, TypeRegistry, Value};
pub use redistore_pool::{
    MemoryBackend, MemoryConnector, Pool, PoolConfig, PoolError, PoolStats, RedisConnector,
};
