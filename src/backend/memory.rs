//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的共享缓存存储实现，基于Moka。
//!
//! 适用于单实例部署和测试，条件写操作通过 Moka 的按键原子计算实现，
//! 与Redis实现保持同样的原子性约定。

use super::CacheStore;
use crate::error::Result;
use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

#[derive(Clone, Debug)]
struct StoredEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl StoredEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// 按条目自身的过期时间淘汰
struct EntryExpiry;

impl Expiry<String, StoredEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(created_at))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.expires_at.saturating_duration_since(updated_at))
    }
}

/// 进程内共享缓存存储
#[derive(Clone)]
pub struct MemoryStore {
    cache: Cache<String, StoredEntry>,
}

impl MemoryStore {
    /// 创建新的进程内存储
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryExpiry)
                .build(),
        }
    }

    /// 剩余存活时间，键不存在时返回None
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.cache
            .get(key)
            .await
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let found = self
            .cache
            .get(key)
            .await
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value);
        debug!("Memory get: key={}, found={}", key, found.is_some());
        Ok(found)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        self.cache
            .insert(key.to_string(), StoredEntry::new(value, ttl))
            .await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let fresh = StoredEntry::new(value.as_bytes().to_vec(), ttl);
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(|current| {
                let now = Instant::now();
                let op = match current {
                    Some(entry) if entry.value().is_live(now) => Op::Nop,
                    _ => Op::Put(fresh),
                };
                std::future::ready(op)
            })
            .await;
        Ok(matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        ))
    }

    #[instrument(skip(self), level = "debug")]
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(|current| {
                let now = Instant::now();
                let op = match current {
                    Some(entry)
                        if entry.value().is_live(now)
                            && entry.value().value == expected.as_bytes() =>
                    {
                        Op::Remove
                    }
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        Ok(matches!(result, CompResult::Removed(_)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let result = self
            .cache
            .entry(key.to_string())
            .and_compute_with(|current| {
                let now = Instant::now();
                let op = match current {
                    Some(entry)
                        if entry.value().is_live(now)
                            && entry.value().value == expected.as_bytes() =>
                    {
                        Op::Put(StoredEntry::new(entry.into_value().value, ttl))
                    }
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        Ok(matches!(result, CompResult::ReplacedWith(_)))
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
