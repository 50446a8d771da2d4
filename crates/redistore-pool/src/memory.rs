//! In-process backend speaking the same commands as Redis.
//!
//! [`MemoryBackend`] keeps hashes per database with real key expiry and
//! lets tests inject the failures a remote server can produce: refused
//! connections, a required password, dropped connections. Expiry runs on
//! [`tokio::time::Instant`], so tests with a paused clock are deterministic.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::connection::{Connection, Connector};
use crate::error::{PoolError, Result};

/// Number of databases a fresh backend exposes, as Redis does by default.
const DEFAULT_DATABASES: usize = 16;

const MEMORY_ADDR: &str = "memory";

/// Writes between sweeps of expired keys, for small databases.
const PURGE_INTERVAL: usize = 64;

/// Largest `EXPIRE` argument Redis accepts before its millisecond deadline
/// would overflow.
const MAX_EXPIRE_SECS: i64 = i64::MAX / 1000;

#[derive(Debug, Default)]
struct Hash {
    fields: HashMap<String, Vec<u8>>,
    expires_at: Option<Instant>,
}

impl Hash {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Database {
    keys: HashMap<String, Hash>,
    writes: usize,
}

impl Database {
    /// Look up a live key, dropping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Hash> {
        let now = Instant::now();
        if self.keys.get(key).is_some_and(|h| h.is_expired(now)) {
            self.keys.remove(key);
        }
        self.keys.get_mut(key)
    }

    /// Drop every expired key, returning how many went.
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.keys.len();
        self.keys.retain(|_, hash| !hash.is_expired(now));
        before - self.keys.len()
    }

    /// Count a write and sweep once writes catch up with the key count.
    ///
    /// Keys that expire without being read again are reclaimed here, at an
    /// amortized constant cost per write.
    fn note_write(&mut self) {
        self.writes += 1;
        if self.writes >= PURGE_INTERVAL.max(self.keys.len()) {
            self.writes = 0;
            self.purge_expired(Instant::now());
        }
    }
}

#[derive(Debug)]
struct BackendState {
    databases: Vec<Database>,
    password: Option<String>,
    refuse_connections: bool,

    /// Connections opened before the current generation are dead.
    generation: u64,
}

/// An in-process key-value backend.
///
/// Cloning shares the same data. Hand [`MemoryBackend::connector`] to a
/// pool, keep the backend to inspect state or inject failures.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
    connections_opened: Arc<AtomicU64>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend with the default number of databases.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                databases: (0..DEFAULT_DATABASES).map(|_| Database::default()).collect(),
                password: None,
                refuse_connections: false,
                generation: 0,
            })),
            connections_opened: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Require `AUTH password` before any other command.
    pub fn with_password(self, password: impl Into<String>) -> Self {
        self.state.lock().password = Some(password.into());
        self
    }

    /// Expose `count` databases.
    pub fn with_databases(self, count: usize) -> Self {
        self.state
            .lock()
            .databases
            .resize_with(count, Database::default);
        self
    }

    /// A connector opening connections to this backend.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            backend: self.clone(),
        }
    }

    /// Refuse (or accept again) new connections.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Drop every open connection, as a server restart would.
    pub fn break_connections(&self) {
        self.state.lock().generation += 1;
    }

    /// Total number of connections opened so far.
    pub fn connections_opened(&self) -> u64 {
        self.connections_opened.load(Ordering::Relaxed)
    }

    /// Whether `key` exists in database `db`.
    pub fn contains_key(&self, db: usize, key: &str) -> bool {
        let mut state = self.state.lock();
        state
            .databases
            .get_mut(db)
            .is_some_and(|d| d.live(key).is_some())
    }

    /// Number of live keys in database `db`.
    pub fn key_count(&self, db: usize) -> usize {
        let now = Instant::now();
        let state = self.state.lock();
        state.databases.get(db).map_or(0, |d| {
            d.keys.values().filter(|h| !h.is_expired(now)).count()
        })
    }

    /// Drop expired keys in every database, returning how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state.lock();
        state
            .databases
            .iter_mut()
            .map(|d| d.purge_expired(now))
            .sum()
    }

    /// Remaining time to live of `key` in database `db`.
    pub fn ttl(&self, db: usize, key: &str) -> Option<Duration> {
        let mut state = self.state.lock();
        let hash = state.databases.get_mut(db)?.live(key)?;
        hash.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Write raw bytes into a field, bypassing any encoding.
    pub fn hset_raw(&self, db: usize, key: &str, field: &str, value: impl Into<Vec<u8>>) {
        let mut state = self.state.lock();
        if let Some(database) = state.databases.get_mut(db) {
            database.live(key);
            database
                .keys
                .entry(key.to_string())
                .or_default()
                .fields
                .insert(field.to_string(), value.into());
            database.note_write();
        }
    }

    fn open(&self) -> Result<MemoryConnection> {
        let state = self.state.lock();
        if state.refuse_connections {
            return Err(PoolError::connect(MEMORY_ADDR, "connection refused"));
        }
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryConnection {
            backend: self.clone(),
            generation: state.generation,
            authenticated: false,
            db: 0,
        })
    }
}

/// Connector for a [`MemoryBackend`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    backend: MemoryBackend,
}

impl MemoryConnector {
    /// The backend this connector opens connections to.
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        self.backend.open()
    }

    fn address(&self) -> String {
        MEMORY_ADDR.to_string()
    }
}

/// A connection to a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryConnection {
    backend: MemoryBackend,
    generation: u64,
    authenticated: bool,
    db: usize,
}

impl MemoryConnection {
    /// Run `f` against the selected database after the checks a server
    /// performs on every command.
    fn with_db<R>(&self, f: impl FnOnce(&mut Database) -> R) -> Result<R> {
        let mut state = self.backend.state.lock();
        if state.generation != self.generation {
            return Err(PoolError::disconnected("connection reset by peer"));
        }
        if state.password.is_some() && !self.authenticated {
            return Err(PoolError::backend("NOAUTH Authentication required."));
        }
        let db = state
            .databases
            .get_mut(self.db)
            .ok_or_else(|| PoolError::backend("ERR DB index is out of range"))?;
        Ok(f(db))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn auth(&mut self, password: &str) -> Result<()> {
        let state = self.backend.state.lock();
        if state.generation != self.generation {
            return Err(PoolError::disconnected("connection reset by peer"));
        }
        match &state.password {
            None => Err(PoolError::backend(
                "ERR AUTH <password> called without any password configured",
            )),
            Some(expected) if expected == password => {
                self.authenticated = true;
                Ok(())
            }
            Some(_) => Err(PoolError::backend("WRONGPASS invalid password")),
        }
    }

    async fn ping(&mut self) -> Result<()> {
        self.with_db(|_| ())
    }

    async fn select(&mut self, db: i64) -> Result<()> {
        self.with_db(|_| ())?;
        let databases = self.backend.state.lock().databases.len();
        match usize::try_from(db) {
            Ok(index) if index < databases => {
                self.db = index;
                Ok(())
            }
            _ => Err(PoolError::backend("ERR DB index is out of range")),
        }
    }

    async fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        self.with_db(|db| {
            db.live(key);
            db.keys
                .entry(key.to_string())
                .or_default()
                .fields
                .insert(field.to_string(), value.to_vec());
            db.note_write();
        })
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        self.with_db(|db| db.live(key).and_then(|h| h.fields.get(field).cloned()))
    }

    async fn hdel(&mut self, key: &str, field: &str) -> Result<bool> {
        self.with_db(|db| {
            let Some(hash) = db.live(key) else {
                return false;
            };
            let removed = hash.fields.remove(field).is_some();
            if hash.fields.is_empty() {
                db.keys.remove(key);
            }
            removed
        })
    }

    async fn del(&mut self, key: &str) -> Result<bool> {
        self.with_db(|db| {
            let existed = db.live(key).is_some();
            db.keys.remove(key);
            existed
        })
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        self.with_db(|db| db.live(key).is_some())
    }

    async fn expire(&mut self, key: &str, seconds: i64) -> Result<bool> {
        self.with_db(|db| {
            if seconds > MAX_EXPIRE_SECS {
                return Err(PoolError::backend(
                    "ERR invalid expire time in 'expire' command",
                ));
            }
            let Some(hash) = db.live(key) else {
                return Ok(false);
            };
            if seconds <= 0 {
                db.keys.remove(key);
            } else {
                // Past the clock's range means no practical expiry
                hash.expires_at =
                    Instant::now().checked_add(Duration::from_secs(seconds.unsigned_abs()));
            }
            db.note_write();
            Ok(true)
        })?
    }
}
