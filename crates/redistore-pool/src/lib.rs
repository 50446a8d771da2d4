//! Pooled backend connections for redistore.
//!
//! This crate provides a bounded pool of connections to a Redis-protocol
//! key-value engine with:
//! - Handshake on creation (`AUTH` or `PING`, then `SELECT`)
//! - Liveness check before reusing an idle connection
//! - Idle timeout eviction, lazily on acquire or from a background reaper
//! - Guaranteed release through an RAII guard
//!
//! The pool is generic over a [`Connector`]; [`RedisConnector`] talks to a
//! real server and [`MemoryBackend`] emulates one in process.
//!
//! # Example
//!
//! ```rust,ignore
//! use redistore_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::default()
//!     .with_max_idle(5)
//!     .with_idle_timeout(Duration::from_secs(240));
//!
//! let pool = Pool::redis(config)?;
//! let mut conn = pool.get().await?;
//! conn.ping().await?;
//! ```

mod client;
mod config;
mod connection;
mod error;
mod idle;
mod memory;
mod pool;

pub use client::{RedisConnection, RedisConnector};
pub use config::{DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_IDLE, DEFAULT_PORT, PoolConfig};
pub use connection::{Connection, Connector};
pub use error::{PoolError, Result};
pub use idle::{IdleConnection, IdleSet};
pub use memory::{MemoryBackend, MemoryConnection, MemoryConnector};
pub use pool::{Pool, PoolStats, PooledConnection};
