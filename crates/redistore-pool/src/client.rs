//! Redis transport built on the `redis` crate.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::trace;

use crate::config::PoolConfig;
use crate::connection::{Connection, Connector};
use crate::error::{PoolError, Result};

/// Opens TCP connections to a Redis server.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: redis::Client,
    addr: String,
}

impl RedisConnector {
    /// Create a connector for `host:port`.
    ///
    /// No connection is made until the pool asks for one.
    pub fn new(host: &str, port: &str) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let port: u16 = port
            .parse()
            .map_err(|_| PoolError::connect(&addr, format!("invalid port '{port}'")))?;
        let client = redis::Client::open((host, port)).map_err(|e| PoolError::connect(&addr, e))?;
        Ok(Self { client, addr })
    }

    /// Create a connector from pool configuration.
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        Self::new(&config.host, &config.port)
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Conn = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection> {
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PoolError::connect(&self.addr, e))?;
        trace!(addr = %self.addr, "tcp connection established");
        Ok(RedisConnection { conn })
    }

    fn address(&self) -> String {
        self.addr.clone()
    }
}

/// A connection to a Redis server.
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConnection").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for RedisConnection {
    async fn auth(&mut self, password: &str) -> Result<()> {
        let () = redis::cmd("AUTH")
            .arg(password)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    async fn select(&mut self, db: i64) -> Result<()> {
        let () = redis::cmd("SELECT")
            .arg(db)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn hset(&mut self, key: &str, field: &str, value: &[u8]) -> Result<()> {
        let _: i64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn hget(&mut self, key: &str, field: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut self.conn)
            .await?;
        Ok(value)
    }

    async fn hdel(&mut self, key: &str, field: &str) -> Result<bool> {
        let removed: i64 = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async(&mut self.conn)
            .await?;
        Ok(removed > 0)
    }

    async fn del(&mut self, key: &str) -> Result<bool> {
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut self.conn).await?;
        Ok(removed > 0)
    }

    async fn exists(&mut self, key: &str) -> Result<bool> {
        let count: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(count > 0)
    }

    async fn expire(&mut self, key: &str, seconds: i64) -> Result<bool> {
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut self.conn)
            .await?;
        Ok(applied > 0)
    }
}
