//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了共享缓存存储的接口，以及Redis和进程内两种实现。

pub mod memory;
pub mod redis_store;
pub mod redis_provider;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// 共享缓存存储
///
/// 所有带条件的写操作都必须在存储端原子完成，不能拆成客户端的多次往返
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// 读取缓存值，不存在或已过期返回None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 无条件覆盖写入，值与过期时间一次设置
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// 仅当键不存在时写入，值与过期时间一次设置
    ///
    /// # 返回值
    ///
    /// 键原本不存在且写入成功返回 true
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// 当前值等于 `expected` 时删除键
    ///
    /// # 返回值
    ///
    /// 值匹配并删除返回 true；键不存在或值不匹配返回 false
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// 当前值等于 `expected` 时重置过期时间（租约续期）
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool>;

    /// 删除键
    async fn delete(&self, key: &str) -> Result<()>;

    /// 检查存储是否可达
    async fn ping(&self) -> Result<()>;
}

/// 将过期时间转换为毫秒，至少为1毫秒
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}
