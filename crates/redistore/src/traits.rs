//! The store contract consumed by session middleware.

use std::time::Duration;

use async_trait::async_trait;
use redistore_codec::Value;
use redistore_pool::Connector;

use crate::error::Result;
use crate::id::SessionId;
use crate::store::RedisStore;

/// Capabilities a session middleware needs from its backing store.
///
/// Object safe, so middleware can hold an `Arc<dyn SessionStore>`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a field value and slide the session's expiry.
    async fn set(&self, id: &SessionId, key: &str, value: &Value) -> Result<()>;

    /// Read a field value, or `None` when absent or unreadable.
    async fn get(&self, id: &SessionId, key: &str) -> Option<Value>;

    /// Delete one field.
    async fn del(&self, id: &SessionId, key: &str) -> bool;

    /// Delete the whole session.
    async fn clear(&self, id: &SessionId) -> bool;

    /// Whether the session exists.
    async fn exists(&self, id: &SessionId) -> bool;

    /// Register a new session.
    async fn add(&self, id: &SessionId) -> bool;

    /// Change the store-wide session lifetime.
    fn set_max_age(&self, max_age: Duration);

    /// Change the lifetime of one existing session.
    async fn set_id_max_age(&self, id: &SessionId, max_age: Duration);

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
impl<C: Connector> SessionStore for RedisStore<C> {
    async fn set(&self, id: &SessionId, key: &str, value: &Value) -> Result<()> {
        RedisStore::set(self, id, key, value).await
    }

    async fn get(&self, id: &SessionId, key: &str) -> Option<Value> {
        RedisStore::get(self, id, key).await
    }

    async fn del(&self, id: &SessionId, key: &str) -> bool {
        RedisStore::del(self, id, key).await
    }

    async fn clear(&self, id: &SessionId) -> bool {
        RedisStore::clear(self, id).await
    }

    async fn exists(&self, id: &SessionId) -> bool {
        RedisStore::exists(self, id).await
    }

    async fn add(&self, id: &SessionId) -> bool {
        RedisStore::add(self, id).await
    }

    fn set_max_age(&self, max_age: Duration) {
        RedisStore::set_max_age(self, max_age)
    }

    async fn set_id_max_age(&self, id: &SessionId, max_age: Duration) {
        RedisStore::set_id_max_age(self, id, max_age).await
    }

    async fn ping(&self) -> Result<()> {
        RedisStore::ping(self).await
    }
}
