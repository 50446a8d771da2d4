//! Connection pool with health checks and idle eviction.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::client::RedisConnector;
use crate::config::PoolConfig;
use crate::connection::{Connection, Connector};
use crate::error::{PoolError, Result};
use crate::idle::IdleSet;

/// A connection and the last time it proved healthy.
struct Checked<T> {
    conn: T,
    validated_at: Instant,
}

impl<T> Checked<T> {
    fn now(conn: T) -> Self {
        Self {
            conn,
            validated_at: Instant::now(),
        }
    }
}

/// State shared between the pool, its guards and the reaper.
struct Shared<C: Connector> {
    connector: C,
    config: PoolConfig,

    /// Idle connections, most recently released first.
    idle: Mutex<IdleSet<Checked<C::Conn>>>,

    /// Active bound, when one is configured.
    permits: Option<Arc<Semaphore>>,

    active: AtomicUsize,
    created: AtomicU64,
    discarded: AtomicU64,
}

impl<C: Connector> Shared<C> {
    /// Open a connection and run the handshake.
    async fn open(&self) -> Result<C::Conn> {
        let mut conn = self.connector.connect().await?;

        // Errors below drop `conn`, which closes it.
        match self.config.password.as_deref() {
            Some(password) if !password.is_empty() => {
                conn.auth(password).await.map_err(|e| {
                    if e.is_fatal() {
                        PoolError::connect(self.connector.address(), e)
                    } else {
                        PoolError::Auth(e.to_string())
                    }
                })?;
            }
            _ => {
                conn.ping()
                    .await
                    .map_err(|e| PoolError::connect(self.connector.address(), e))?;
            }
        }

        conn.select(self.config.db_index)
            .await
            .map_err(|e| {
                if e.is_fatal() {
                    PoolError::connect(self.connector.address(), e)
                } else {
                    PoolError::Select {
                        db: self.config.db_index,
                        message: e.to_string(),
                    }
                }
            })?;

        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(
            addr = %self.connector.address(),
            db = self.config.db_index,
            "Opened backend connection"
        );
        Ok(conn)
    }

    /// Take an idle connection, closing any that have expired.
    fn take_idle(&self) -> Option<Checked<C::Conn>> {
        let (conn, expired) = {
            let mut idle = self.idle.lock();
            let expired = idle.drain_expired();
            (idle.pop(), expired)
        };
        self.close_all(expired, "Evicting idle connection past timeout");
        conn
    }

    /// Return a connection after use.
    ///
    /// A connection not validated within the idle timeout is closed rather
    /// than handed to a borrower that may skip the `PING`.
    fn release(&self, conn: C::Conn, validated_at: Instant, broken: bool) {
        if broken {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!("Discarding broken connection");
            return;
        }

        let timeout = self.config.idle_timeout;
        if !timeout.is_zero() && validated_at.elapsed() > timeout {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                timeout_secs = timeout.as_secs(),
                "Closing connection unvalidated past idle timeout"
            );
            return;
        }

        let mut idle = self.idle.lock();
        if idle.len() >= self.config.max_idle {
            drop(idle);
            self.discarded.fetch_add(1, Ordering::Relaxed);
            trace!(max_idle = self.config.max_idle, "Idle set full, closing connection");
            return;
        }
        idle.push(Checked { conn, validated_at });
        trace!(idle = idle.len(), "Connection returned to pool");
    }

    fn evict_idle(&self) -> usize {
        let expired = self.idle.lock().drain_expired();
        let count = expired.len();
        self.close_all(expired, "Evicting idle connection past timeout");
        count
    }

    fn close_all<T>(&self, conns: Vec<T>, reason: &str) {
        if conns.is_empty() {
            return;
        }
        self.discarded
            .fetch_add(conns.len() as u64, Ordering::Relaxed);
        debug!(count = conns.len(), "{reason}");
    }
}

/// A bounded pool of backend connections.
///
/// This pool provides:
/// - Reuse of idle connections, freshest first
/// - A `PING` check before reuse (`test_on_borrow`)
/// - Lazy idle timeout eviction on acquire, plus an optional reaper task
/// - An optional bound on connections in use, failing fast or waiting
///
/// Cloning is cheap; clones share the same connections.
pub struct Pool<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl Pool<RedisConnector> {
    /// Create a pool of connections to the Redis server in `config`.
    pub fn redis(config: PoolConfig) -> Result<Self> {
        let connector = RedisConnector::from_config(&config)?;
        Ok(Self::new(config, connector))
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool over `connector`. No connection is opened up front.
    pub fn new(config: PoolConfig, connector: C) -> Self {
        let permits = config.max_active.map(|max| Arc::new(Semaphore::new(max)));
        let shared = Shared {
            idle: Mutex::new(IdleSet::new(config.idle_timeout)),
            connector,
            config,
            permits,
            active: AtomicUsize::new(0),
            created: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Get the connector.
    pub fn connector(&self) -> &C {
        &self.shared.connector
    }

    /// Get a healthy connection, reusing an idle one when possible.
    ///
    /// The connection goes back to the pool when the returned guard is
    /// dropped, on every exit path.
    pub async fn get(&self) -> Result<PooledConnection<C>> {
        let permit = self.acquire_permit().await?;

        while let Some(mut idle) = self.shared.take_idle() {
            if self.shared.config.test_on_borrow {
                if let Err(e) = idle.conn.ping().await {
                    self.shared.discarded.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, "Idle connection failed liveness check, discarding");
                    continue;
                }
                idle.validated_at = Instant::now();
            }
            trace!("Reusing idle connection");
            return Ok(PooledConnection::new(idle, Arc::clone(&self.shared), permit));
        }

        let conn = self.shared.open().await?;
        Ok(PooledConnection::new(
            Checked::now(conn),
            Arc::clone(&self.shared),
            permit,
        ))
    }

    async fn acquire_permit(&self) -> Result<Option<OwnedSemaphorePermit>> {
        let Some(permits) = &self.shared.permits else {
            return Ok(None);
        };
        let max_active = self.shared.config.max_active.unwrap_or_default();

        let permit = if self.shared.config.wait {
            Arc::clone(permits).acquire_owned().await.ok()
        } else {
            Arc::clone(permits).try_acquire_owned().ok()
        };

        match permit {
            Some(permit) => Ok(Some(permit)),
            None => {
                warn!(max_active, "Connection pool exhausted");
                Err(PoolError::Exhausted { max_active })
            }
        }
    }

    /// Close idle connections past the idle timeout.
    ///
    /// This runs on every [`get`](Self::get) and from the reaper task,
    /// but can also be called manually.
    pub fn evict_idle(&self) -> usize {
        self.shared.evict_idle()
    }

    /// Close every idle connection.
    pub fn clear_idle(&self) -> usize {
        let conns = self.shared.idle.lock().clear();
        let count = conns.len();
        self.shared.close_all(conns, "Closing idle connection");
        count
    }

    /// Spawn a task that evicts expired idle connections every `interval`.
    ///
    /// The task holds only a weak reference and ends once every clone of
    /// the pool has been dropped.
    pub fn spawn_reaper(&self, interval: Duration) -> JoinHandle<()> {
        let shared: Weak<Shared<C>> = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    trace!("Pool dropped, stopping reaper");
                    break;
                };
                let evicted = shared.evict_idle();
                if evicted > 0 {
                    debug!(count = evicted, "Reaper evicted idle connections");
                }
            }
        })
    }

    /// Get pool statistics.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.shared.idle.lock().len(),
            active: self.shared.active.load(Ordering::Relaxed),
            created: self.shared.created.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("addr", &self.shared.connector.address())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections waiting in the idle set.
    pub idle: usize,

    /// Connections currently borrowed.
    pub active: usize,

    /// Connections opened over the pool's lifetime.
    pub created: u64,

    /// Connections closed: broken, expired, failed `PING`, or over `max_idle`.
    pub discarded: u64,
}

/// A connection borrowed from a [`Pool`].
///
/// Issues commands on the underlying connection and returns it to the pool
/// on drop. A command that fails because the connection broke marks it so
/// it is closed instead of returned.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Conn>,
    shared: Arc<Shared<C>>,
    broken: bool,

    /// When the connection was opened or last passed a liveness check.
    validated_at: Instant,

    /// Released after the connection is back in the idle set.
    _permit: Option<OwnedSemaphorePermit>,
}

impl<C: Connector> PooledConnection<C> {
    fn new(
        checked: Checked<C::Conn>,
        shared: Arc<Shared<C>>,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Self {
        shared.active.fetch_add(1, Ordering::Relaxed);
        Self {
            conn: Some(checked.conn),
            shared,
            broken: false,
            validated_at: checked.validated_at,
            _permit: permit,
        }
    }

    /// Close this connection on release instead of returning it.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    /// Whether the connection will be closed on release.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn conn(&mut self) -> Result<&mut C::Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| PoolError::disconnected("connection already released"))
    }

    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_fatal() {
                self.broken = true;
            }
        }
        result
    }

    /// `PING`.
    pub async fn ping(&mut self) -> Result<()> {
        let result = self.conn()?.ping().await;
        self.observe(result)
    }

    /// `HSET key field value`.
    pub async fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let result = self.conn()?.hset(key, field, value).await;
        self.observe(result)
    }

    /// `HGET key field`.
    pub async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let result = self.conn()?.hget(key, field).await;
        self.observe(result)
    }

    /// `HDEL key field`.
    pub async fn hdel(&mut self, key: &str, field: &str) -> Result<bool> {
        let result = self.conn()?.hdel(key, field).await;
        self.observe(result)
    }

    /// `DEL key`.
    pub async fn del(&mut self, key: &str) -> Result<bool> {
        let result = self.conn()?.del(key).await;
        self.observe(result)
    }

    /// `EXISTS key`.
    pub async fn exists(&mut self, key: &str) -> Result<bool> {
        let result = self.conn()?.exists(key).await;
        self.observe(result)
    }

    /// `EXPIRE key seconds`.
    pub async fn expire(&mut self, key: &str, seconds: i64) -> Result<bool> {
        let result = self.conn()?.expire(key, seconds).await;
        self.observe(result)
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.release(conn, self.validated_at, self.broken);
        }
        self.shared.active.fetch_sub(1, Ordering::Relaxed);
    }
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}
