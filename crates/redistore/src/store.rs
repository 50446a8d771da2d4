//! Redis-backed session store.
//!
//! Each session is a backend hash keyed by field name. Values cross the
//! byte boundary through a [`Codec`], and every read or write slides the
//! session's expiry forward to the configured max age. There is no
//! in-process expiry bookkeeping: a session is live exactly as long as
//! the backend keeps its key.

use std::borrow::Cow;
use std::time::Duration;

use parking_lot::RwLock;
use redistore_codec::{Codec, Storable, TypeRegistry, Value};
use redistore_pool::{Connector, Pool, PoolStats, PooledConnection, RedisConnector};
use tracing::{debug, error, trace, warn};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::id::SessionId;

/// Whether a session currently exists in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// At least one field is set and the expiry has not elapsed.
    Live,
    /// Never written, cleared, or expired.
    Expired,
}

/// Session store over a pooled backend connection.
///
/// Generic over the [`Connector`] so tests can run against the in-process
/// backend; production code uses the default [`RedisConnector`].
pub struct RedisStore<C: Connector = RedisConnector> {
    pool: Pool<C>,
    codec: Codec,
    key_prefix: String,

    /// Store-wide sliding expiry, adjustable at runtime.
    max_age: RwLock<Duration>,
}

impl RedisStore<RedisConnector> {
    /// Create a store connected to the Redis server in `config`.
    ///
    /// No connection is opened until the first operation; call
    /// [`run`](Self::run) to check the backend at startup.
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let pool = Pool::redis(config.pool_config())?;
        Ok(Self::from_parts(&config, pool))
    }
}

impl<C: Connector> RedisStore<C> {
    /// Create a store over a custom connector.
    pub fn with_connector(config: StoreConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let pool = Pool::new(config.pool_config(), connector);
        Ok(Self::from_parts(&config, pool))
    }

    fn from_parts(config: &StoreConfig, pool: Pool<C>) -> Self {
        debug!(
            host = %config.host,
            port = %config.port,
            db = config.db_index,
            max_age_secs = config.max_age_secs,
            "Created session store"
        );
        Self {
            pool,
            codec: Codec::new(TypeRegistry::global()),
            key_prefix: config.key_prefix.clone(),
            max_age: RwLock::new(config.max_age()),
        }
    }

    /// Replace the codec, e.g. to use a private registry.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// The connection pool.
    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }

    /// Connection pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// The value codec.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// The current store-wide session lifetime.
    pub fn max_age(&self) -> Duration {
        *self.max_age.read()
    }

    /// Backend key for a session.
    fn key<'a>(&self, id: &'a SessionId) -> Cow<'a, str> {
        if self.key_prefix.is_empty() {
            Cow::Borrowed(id.as_str())
        } else {
            Cow::Owned(format!("{}{}", self.key_prefix, id))
        }
    }

    async fn conn(&self) -> Result<PooledConnection<C>> {
        Ok(self.pool.get().await?)
    }

    /// Store `value` under `key` and slide the session's expiry.
    ///
    /// Encoding happens first; a value that cannot be encoded fails the
    /// call without touching the backend.
    pub async fn set(&self, id: &SessionId, key: &str, value: &Value) -> Result<()> {
        let bytes = self.codec.encode_value(value)?;
        self.write(id, key, &bytes).await
    }

    /// Typed form of [`set`](Self::set).
    pub async fn set_value<T: Storable>(&self, id: &SessionId, key: &str, value: &T) -> Result<()> {
        let bytes = self.codec.encode(value)?;
        self.write(id, key, &bytes).await
    }

    async fn write(&self, id: &SessionId, field: &str, bytes: &[u8]) -> Result<()> {
        let key = self.key(id);
        let mut conn = self.conn().await?;
        conn.hset(&key, field, bytes).await?;
        conn.expire(&key, ttl_secs(self.max_age())).await?;
        trace!(session_id = %id, key = field, len = bytes.len(), "Set session field");
        Ok(())
    }

    /// Read the value under `key` and slide the session's expiry.
    ///
    /// Returns `None` when the field is absent, the backend fails, or the
    /// stored bytes do not decode. Failures are logged, never returned, so a
    /// single bad field cannot break the caller.
    pub async fn get(&self, id: &SessionId, key: &str) -> Option<Value> {
        let bytes = self.read(id, key).await?;
        match self.codec.decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(session_id = %id, key, error = %e, "Failed to decode session field");
                None
            }
        }
    }

    /// Typed form of [`get`](Self::get). A value of another type reads as `None`.
    pub async fn get_as<T: Storable>(&self, id: &SessionId, key: &str) -> Option<T> {
        let bytes = self.read(id, key).await?;
        match self.codec.decode_as::<T>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                error!(session_id = %id, key, error = %e, "Failed to decode session field");
                None
            }
        }
    }

    async fn read(&self, id: &SessionId, field: &str) -> Option<Vec<u8>> {
        let key = self.key(id);
        let mut conn = match self.conn().await {
            Ok(conn) => conn,
            Err(e) => {
                error!(session_id = %id, key = field, error = %e, "Failed to get backend connection");
                return None;
            }
        };

        let bytes = match conn.hget(&key, field).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(session_id = %id, key = field, error = %e, "HGET failed");
                return None;
            }
        };

        if let Err(e) = conn.expire(&key, ttl_secs(self.max_age())).await {
            warn!(session_id = %id, error = %e, "Failed to refresh session expiry");
        }

        if bytes.is_none() {
            trace!(session_id = %id, key = field, "Session field not found");
        }
        bytes
    }

    /// Delete one field. Reports whether the backend call succeeded, not
    /// whether the field existed.
    pub async fn del(&self, id: &SessionId, key: &str) -> bool {
        let result = async {
            let mut conn = self.conn().await?;
            conn.hdel(&self.key(id), key).await?;
            Ok::<_, crate::Error>(())
        }
        .await;

        log_outcome(result, id, "HDEL")
    }

    /// Delete the whole session in one call.
    pub async fn clear(&self, id: &SessionId) -> bool {
        let result = async {
            let mut conn = self.conn().await?;
            conn.del(&self.key(id)).await?;
            Ok::<_, crate::Error>(())
        }
        .await;

        log_outcome(result, id, "DEL")
    }

    /// Whether the session exists. Backend failures read as `false`.
    pub async fn exists(&self, id: &SessionId) -> bool {
        let result = async {
            let mut conn = self.conn().await?;
            Ok::<_, crate::Error>(conn.exists(&self.key(id)).await?)
        }
        .await;

        match result {
            Ok(exists) => exists,
            Err(e) => {
                warn!(session_id = %id, error = %e, "EXISTS failed");
                false
            }
        }
    }

    /// Register a new session. Always succeeds; the backend creates the
    /// session on its first write.
    pub async fn add(&self, id: &SessionId) -> bool {
        trace!(session_id = %id, "Session added");
        true
    }

    /// Current backend state of a session.
    pub async fn state(&self, id: &SessionId) -> SessionState {
        if self.exists(id).await {
            SessionState::Live
        } else {
            SessionState::Expired
        }
    }

    /// Change the store-wide session lifetime for subsequent writes and reads.
    pub fn set_max_age(&self, max_age: Duration) {
        *self.max_age.write() = max_age;
        debug!(max_age_secs = max_age.as_secs(), "Updated session max age");
    }

    /// Set the expiry of one existing session. Missing sessions are left alone.
    pub async fn set_id_max_age(&self, id: &SessionId, max_age: Duration) {
        if !self.exists(id).await {
            trace!(session_id = %id, "Session absent, expiry unchanged");
            return;
        }

        let result = async {
            let mut conn = self.conn().await?;
            conn.expire(&self.key(id), ttl_secs(max_age)).await?;
            Ok::<_, crate::Error>(())
        }
        .await;

        log_outcome(result, id, "EXPIRE");
    }

    /// Check the backend is reachable. Does not touch session data.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.ping().await?;
        Ok(())
    }

    /// Startup check: fails when the backend cannot be reached.
    pub async fn run(&self) -> Result<()> {
        self.ping().await?;
        debug!("Session store backend reachable");
        Ok(())
    }
}

impl<C: Connector> std::fmt::Debug for RedisStore<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool", &self.pool)
            .field("key_prefix", &self.key_prefix)
            .field("max_age", &self.max_age())
            .finish()
    }
}

/// Longest expiry sent to the backend: one hundred years.
///
/// Redis rejects `EXPIRE` arguments whose millisecond deadline overflows.
const MAX_TTL_SECS: i64 = 100 * 365 * 24 * 60 * 60;

/// Expiry in whole seconds, rounded up and clamped to `1..=MAX_TTL_SECS`.
///
/// `EXPIRE` with zero deletes the key, which would end a session that was
/// just written.
fn ttl_secs(max_age: Duration) -> i64 {
    let secs = max_age
        .as_secs()
        .saturating_add(u64::from(max_age.subsec_nanos() > 0));
    i64::try_from(secs).unwrap_or(i64::MAX).clamp(1, MAX_TTL_SECS)
}

fn log_outcome(result: Result<()>, id: &SessionId, command: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(session_id = %id, command, error = %e, "Backend command failed");
            false
        }
    }
}
