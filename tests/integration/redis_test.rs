//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis集成测试，Redis不可用时跳过

use catcache::backend::{CacheStore, RedisStore};
use catcache::client::CatalogClient;
use catcache::config::RedisConfig;
use catcache::lock::{LeaseLock, LockAttempt, RebuildLock};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

#[path = "../common/mod.rs"]
mod common;

use common::{fast_config, scenario_rows, CountingReader};

async fn redis_store() -> Option<Arc<RedisStore>> {
    common::setup_logging();
    if !common::is_redis_available().await {
        println!("Skipping Redis test: Redis not available");
        return None;
    }
    let config = RedisConfig {
        connection_string: SecretString::new(common::redis_url().into()),
        ..RedisConfig::default()
    };
    Some(Arc::new(RedisStore::new(&config).await.unwrap()))
}

fn unique_key(name: &str) -> String {
    format!("catcache:test:{}:{}", name, uuid::Uuid::new_v4())
}

#[tokio::test]
async fn test_redis_conditional_operations() {
    let Some(store) = redis_store().await else {
        return;
    };
    let key = unique_key("cas");

    assert!(store
        .set_if_absent(&key, "owner", Duration::from_secs(10))
        .await
        .unwrap());
    assert!(!store
        .set_if_absent(&key, "intruder", Duration::from_secs(10))
        .await
        .unwrap());
    assert!(!store.compare_and_delete(&key, "intruder").await.unwrap());
    assert!(store
        .compare_and_expire(&key, "owner", Duration::from_secs(20))
        .await
        .unwrap());
    assert!(store.compare_and_delete(&key, "owner").await.unwrap());
    assert!(store.get(&key).await.unwrap().is_none());
    store.ping().await.unwrap();
}

#[tokio::test]
async fn test_redis_lease_expiry() {
    let Some(store) = redis_store().await else {
        return;
    };
    let key = unique_key("expiry");
    let lock = LeaseLock::new(store.clone());

    let stale = match lock.acquire(&key, Duration::from_millis(200)).await.unwrap() {
        LockAttempt::Acquired(token) => token,
        LockAttempt::Contended => panic!("fresh key should be free"),
    };
    tokio::time::sleep(Duration::from_millis(400)).await;

    let fresh = match lock.acquire(&key, Duration::from_secs(10)).await.unwrap() {
        LockAttempt::Acquired(token) => token,
        LockAttempt::Contended => panic!("lease should have expired"),
    };
    assert!(!lock.release(&key, &stale).await.unwrap());
    assert!(lock.release(&key, &fresh).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_redis_concurrent_misses_load_once() {
    let Some(store) = redis_store().await else {
        return;
    };
    let mut config = fast_config("redis-breakdown");
    config.key_prefix = unique_key("catalog");
    let reader = Arc::new(CountingReader::with_delay(
        scenario_rows(),
        Duration::from_millis(100),
    ));
    let client = Arc::new(CatalogClient::from_config(config, store.clone(), reader.clone()));

    let callers = 20;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let client = client.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                client.get_catalog_tree().await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().contains_key("1"));
    }
    assert_eq!(reader.loads(), 1);

    client.invalidate().await.unwrap();
    assert!(store.get(&client.config().tree_key()).await.unwrap().is_none());
}
