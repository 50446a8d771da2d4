//! Integration tests for the session store.
//!
//! Most tests run against the in-process backend. The live scenario at the
//! bottom needs a Redis server at `REDISTORE_TEST_URL` (`host:port`) and is
//! skipped otherwise.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use redistore::{
    CodecError, Error, MemoryBackend, MemoryConnector, PoolSettings, RedisStore, SessionId,
    SessionStore, Storable, StoreConfig, Value,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
    roles: Vec<String>,
}

impl Storable for User {}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn memory_store(backend: &MemoryBackend, config: StoreConfig) -> RedisStore<MemoryConnector> {
    init_tracing();
    RedisStore::with_connector(config, backend.connector()).expect("valid config")
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());
    let id = SessionId::from("s1");

    store.set(&id, "name", &Value::new("alice".to_string())).await.unwrap();
    let name = store.get(&id, "name").await.unwrap();
    assert_eq!(name.downcast_ref::<String>().map(String::as_str), Some("alice"));

    assert!(store.del(&id, "name").await);
    assert!(store.get(&id, "name").await.is_none());

    store.set_value(&id, "other", &1_u8).await.unwrap();
    assert!(store.clear(&id).await);
    assert!(!store.exists(&id).await);
}

#[tokio::test]
async fn test_field_isolation() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());
    let id = SessionId::from("s1");

    store.set_value(&id, "a", &1_i64).await.unwrap();
    store.set_value(&id, "b", &2_i64).await.unwrap();

    assert_eq!(store.get_as::<i64>(&id, "a").await, Some(1));
    assert_eq!(store.get_as::<i64>(&id, "b").await, Some(2));

    // Other sessions are untouched
    assert!(store.get(&SessionId::from("s2"), "a").await.is_none());
}

#[tokio::test]
async fn test_pointer_to_struct_round_trip() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());
    let id = SessionId::from("s1");
    let user = User {
        id: 7,
        name: "alice".to_string(),
        roles: vec!["admin".to_string()],
    };

    store.set(&id, "user", &Value::new(Box::new(user.clone()))).await.unwrap();
    store.set_value(&id, "shared", &Arc::new(user.clone())).await.unwrap();

    let value = store.get(&id, "user").await.unwrap();
    let decoded = value.downcast_ref::<Box<User>>().expect("pointer type preserved");
    assert_eq!(**decoded, user);

    let shared = store.get_as::<Arc<User>>(&id, "shared").await.unwrap();
    assert_eq!(*shared, user);
}

#[tokio::test]
async fn test_collections_round_trip() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());
    let id = SessionId::from("s1");

    let mut scores = HashMap::new();
    scores.insert("math".to_string(), 91_u32);
    scores.insert("art".to_string(), 78);

    store.set_value(&id, "scores", &scores).await.unwrap();
    store.set_value(&id, "cart", &vec![3_u64, 1, 4]).await.unwrap();
    store.set_value(&id, "nothing", &None::<String>).await.unwrap();

    assert_eq!(store.get_as::<HashMap<String, u32>>(&id, "scores").await, Some(scores));
    assert_eq!(store.get_as::<Vec<u64>>(&id, "cart").await, Some(vec![3, 1, 4]));
    assert_eq!(store.get_as::<Option<String>>(&id, "nothing").await, Some(None));
}

#[tokio::test]
async fn test_struct_by_value_rejected_before_backend() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());
    let user = User {
        id: 1,
        name: "bob".to_string(),
        roles: Vec::new(),
    };

    let err = store
        .set(&SessionId::from("s1"), "user", &Value::new(user))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Codec(CodecError::TypeNotEncodable { .. })));
    assert_eq!(backend.connections_opened(), 0);
    assert_eq!(backend.key_count(0), 0);
}

#[tokio::test]
async fn test_corrupted_field_reads_absent() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());
    let id = SessionId::from("s1");

    store.set_value(&id, "good", &"fine".to_string()).await.unwrap();
    backend.hset_raw(0, "s1", "garbage", b"\x00\xffnot an envelope".to_vec());
    backend.hset_raw(0, "s1", "truncated", br#"{"t":"alloc::string::Str"#.to_vec());
    backend.hset_raw(0, "s1", "unknown", br#"{"t":"no::such::Type","v":1}"#.to_vec());

    assert!(store.get(&id, "garbage").await.is_none());
    assert!(store.get(&id, "truncated").await.is_none());
    assert!(store.get(&id, "unknown").await.is_none());

    // The rest of the session still reads
    assert_eq!(store.get_as::<String>(&id, "good").await.as_deref(), Some("fine"));
}

#[tokio::test(start_paused = true)]
async fn test_ttl_sliding() {
    let backend = MemoryBackend::new();
    let config = StoreConfig::default().with_max_age(Duration::from_secs(10));
    let store = memory_store(&backend, config);
    let id = SessionId::from("s1");

    store.set_value(&id, "n", &1_i32).await.unwrap();

    // Reading halfway through resets the window
    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(store.get_as::<i32>(&id, "n").await, Some(1));

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(store.exists(&id).await);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(!store.exists(&id).await);
    assert!(store.get(&id, "n").await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_beyond_max_idle() {
    let backend = MemoryBackend::new();
    let config = StoreConfig::default().with_pool(PoolSettings {
        max_idle: 2,
        ..PoolSettings::default()
    });
    let store = Arc::new(memory_store(&backend, config));

    let mut tasks = Vec::new();
    for i in 0..64_i64 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            let id = SessionId::from(format!("s{}", i % 8));
            let field = format!("f{i}");
            store.set_value(&id, &field, &i).await.unwrap();
            store.get_as::<i64>(&id, &field).await
        }));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), Some(i as i64));
    }

    let stats = store.pool_stats();
    assert_eq!(stats.active, 0);
    assert!(stats.idle <= 2);
    assert_eq!(backend.key_count(0), 8);
}

#[tokio::test]
async fn test_bounded_pool_waits() {
    let backend = MemoryBackend::new();
    let config = StoreConfig::default().with_pool(PoolSettings {
        max_active: Some(2),
        wait: true,
        ..PoolSettings::default()
    });
    let store = Arc::new(memory_store(&backend, config));

    let mut tasks = Vec::new();
    for i in 0..16_u32 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store.set_value(&SessionId::from("s1"), &format!("f{i}"), &i).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert!(store.pool_stats().created <= 2);
}

#[tokio::test]
async fn test_set_id_max_age_missing_session_is_noop() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());

    store
        .set_id_max_age(&SessionId::from("ghost"), Duration::from_secs(5))
        .await;

    assert_eq!(backend.key_count(0), 0);
}

#[tokio::test]
async fn test_backend_restart_recovers() {
    let backend = MemoryBackend::new();
    let store = memory_store(&backend, StoreConfig::default());
    let id = SessionId::from("s1");

    store.set_value(&id, "n", &1_i32).await.unwrap();
    backend.break_connections();

    // The stale pooled connection fails its PING and is replaced
    assert_eq!(store.get_as::<i32>(&id, "n").await, Some(1));
    assert_eq!(store.pool_stats().created, 2);
}

#[tokio::test]
async fn test_password_protected_backend() {
    let backend = MemoryBackend::new().with_password("secret");

    let store = memory_store(&backend, StoreConfig::default().with_password("wrong"));
    let err = store.ping().await.unwrap_err();
    assert!(matches!(err, Error::Pool(redistore::PoolError::Auth(_))));

    let store = memory_store(&backend, StoreConfig::default().with_password("secret"));
    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_as_dyn_session_store() {
    let backend = MemoryBackend::new();
    let store: Arc<dyn SessionStore> = Arc::new(memory_store(&backend, StoreConfig::default()));
    let id = SessionId::from("s1");

    store.set(&id, "n", &Value::new(5_i16)).await.unwrap();
    assert!(store.exists(&id).await);
    assert_eq!(
        store.get(&id, "n").await.and_then(|v| v.downcast::<i16>().ok()),
        Some(5)
    );
}

/// Parse `REDISTORE_TEST_URL` as `host:port`.
fn live_config() -> Option<StoreConfig> {
    let url = std::env::var("REDISTORE_TEST_URL").ok()?;
    let (host, port) = url.rsplit_once(':').unwrap_or((url.as_str(), "6379"));
    Some(
        StoreConfig::default()
            .with_address(host, port)
            .with_key_prefix("redistore-test:")
            .with_max_age(Duration::from_secs(60)),
    )
}

#[tokio::test]
async fn test_live_redis_scenario() {
    let Some(config) = live_config() else {
        eprintln!("Skipping test: set REDISTORE_TEST_URL=host:port to run against Redis");
        return;
    };
    init_tracing();

    let store = RedisStore::new(config).expect("valid config");
    store.run().await.expect("Redis reachable");

    let id = SessionId::from(format!("live-{}", std::process::id()));
    store.set_value(&id, "name", &"alice".to_string()).await.unwrap();
    assert_eq!(store.get_as::<String>(&id, "name").await.as_deref(), Some("alice"));
    assert!(store.exists(&id).await);

    assert!(store.del(&id, "name").await);
    assert!(store.get(&id, "name").await.is_none());

    store.set_value(&id, "n", &1_i32).await.unwrap();
    store.set_id_max_age(&id, Duration::from_secs(30)).await;
    assert!(store.clear(&id).await);
    assert!(!store.exists(&id).await);
}
