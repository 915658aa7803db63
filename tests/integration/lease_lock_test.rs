//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 重建锁测试

use catcache::backend::{CacheStore, MemoryStore};
use catcache::lock::{BlockingLeaseLock, LeaseLock, LocalLock, LockAttempt, RebuildLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

#[path = "../common/mod.rs"]
mod common;

async fn race(lock: Arc<dyn RebuildLock>, contenders: usize, ttl: Duration) -> usize {
    let barrier = Arc::new(Barrier::new(contenders));
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let lock = lock.clone();
            let barrier = barrier.clone();
            let winners = winners.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                if let LockAttempt::Acquired(_) = lock.acquire("race:lock", ttl).await.unwrap() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }
    winners.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lease_lock_admits_single_holder() {
    common::setup_logging();
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
    let lock: Arc<dyn RebuildLock> = Arc::new(LeaseLock::new(store));

    assert_eq!(race(lock, 64, Duration::from_secs(10)).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_lock_admits_single_holder() {
    let lock: Arc<dyn RebuildLock> = Arc::new(LocalLock::new());
    assert_eq!(race(lock, 64, Duration::from_secs(10)).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocking_lock_admits_single_holder_within_wait() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
    let lock: Arc<dyn RebuildLock> = Arc::new(BlockingLeaseLock::new(
        store,
        Duration::from_millis(100),
        Duration::from_millis(10),
    ));
    assert_eq!(race(lock, 16, Duration::from_secs(10)).await, 1);
}

#[tokio::test]
async fn test_expired_holder_cannot_release_new_lease() {
    let store = Arc::new(MemoryStore::default());
    let lock = LeaseLock::new(store.clone());

    let stale = match lock.acquire("k:lock", Duration::from_millis(50)).await.unwrap() {
        LockAttempt::Acquired(token) => token,
        LockAttempt::Contended => panic!("uncontended acquire failed"),
    };
    tokio::time::sleep(Duration::from_millis(120)).await;

    let fresh = match lock.acquire("k:lock", Duration::from_secs(10)).await.unwrap() {
        LockAttempt::Acquired(token) => token,
        LockAttempt::Contended => panic!("lease should have expired"),
    };

    assert!(!lock.release("k:lock", &stale).await.unwrap());
    assert_eq!(
        store.get("k:lock").await.unwrap(),
        Some(fresh.as_str().as_bytes().to_vec())
    );
    assert!(lock.release("k:lock", &fresh).await.unwrap());
    assert!(store.get("k:lock").await.unwrap().is_none());
}

#[tokio::test]
async fn test_lease_expires_when_holder_never_releases() {
    let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::default());
    let lock = LeaseLock::new(store);

    assert!(matches!(
        lock.acquire("crash:lock", Duration::from_millis(50)).await.unwrap(),
        LockAttempt::Acquired(_)
    ));
    assert_eq!(
        lock.acquire("crash:lock", Duration::from_secs(1)).await.unwrap(),
        LockAttempt::Contended
    );

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(matches!(
        lock.acquire("crash:lock", Duration::from_secs(1)).await.unwrap(),
        LockAttempt::Acquired(_)
    ));
}

#[tokio::test]
async fn test_distinct_keys_do_not_contend() {
    let lock = LocalLock::new();
    let ttl = Duration::from_secs(1);
    assert!(matches!(lock.acquire("a", ttl).await.unwrap(), LockAttempt::Acquired(_)));
    assert!(matches!(lock.acquire("b", ttl).await.unwrap(), LockAttempt::Acquired(_)));
    assert_eq!(lock.acquire("a", ttl).await.unwrap(), LockAttempt::Contended);
}
