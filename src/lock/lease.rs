//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 基于共享缓存的租约锁。

use super::{LockAttempt, LockToken, RebuildLock};
use crate::backend::CacheStore;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// 租约锁
///
/// 获取使用 `set_if_absent` 同时写入令牌与过期时间；释放使用 `compare_and_delete`，
/// 只删除仍属于自己的租约。租约过期是持有者崩溃时的兜底。
#[derive(Clone)]
pub struct LeaseLock {
    store: Arc<dyn CacheStore>,
}

impl LeaseLock {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RebuildLock for LeaseLock {
    #[instrument(skip(self), level = "debug")]
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockAttempt> {
        let token = LockToken::generate();
        if self.store.set_if_absent(key, token.as_str(), ttl).await? {
            debug!("Lease acquired: key={}, token={}", key, token);
            Ok(LockAttempt::Acquired(token))
        } else {
            debug!("Lease contended: key={}", key);
            Ok(LockAttempt::Contended)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool> {
        let released = self.store.compare_and_delete(key, token.as_str()).await?;
        if !released {
            debug!(
                "Lease {} no longer owned by {}, release skipped",
                key, token
            );
        }
        Ok(released)
    }
}
