//! Backend connection traits.
//!
//! The pool is decoupled from a specific transport through two traits:
//! [`Connector`] opens raw connections, and [`Connection`] issues the
//! handful of commands the session store needs. The pool performs the
//! handshake (`AUTH`/`PING`, `SELECT`) itself, so connectors only connect.

use async_trait::async_trait;

use crate::error::Result;

/// A single backend connection.
///
/// Integer replies are normalized to explicit booleans: `true` when the
/// backend reports at least one key or field affected.
#[async_trait]
pub trait Connection: Send + 'static {
    /// `AUTH password`.
    async fn auth(&mut self, password: &str) -> Result<()>;

    /// `PING`.
    async fn ping(&mut self) -> Result<()>;

    /// `SELECT index`.
    async fn select(&mut self, db: i64) -> Result<()>;

    /// `HSET key field value`.
    async fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<()>;

    /// `HGET key field`. `None` when the key or field is absent.
    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>>;

    /// `HDEL key field`. Whether the field existed.
    async fn hdel(&mut self, key: &str, field: &str) -> Result<bool>;

    /// `DEL key`. Whether the key existed.
    async fn del(&mut self, key: &str) -> Result<bool>;

    /// `EXISTS key`.
    async fn exists(&mut self, key: &str) -> Result<bool>;

    /// `EXPIRE key seconds`. Whether a timeout was set.
    async fn expire(&mut self, key: &str, seconds: i64) -> Result<bool>;
}

/// Opens connections to a backend.
///
/// Implement this to plug a transport into the pool. `connect` only
/// establishes the channel; authentication and database selection are
/// done by the pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced.
    type Conn: Connection;

    /// Open a new connection.
    async fn connect(&self) -> Result<Self::Conn>;

    /// Human-readable backend address, for logs and errors.
    fn address(&self) -> String;
}
