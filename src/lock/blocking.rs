//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 阻塞式租约锁，持有期间由看门狗自动续期。

use super::{LeaseLock, LockAttempt, LockToken, RebuildLock};
use crate::backend::CacheStore;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};

const MIN_RENEW_INTERVAL: Duration = Duration::from_millis(10);

/// 阻塞式租约锁
///
/// `acquire` 在内部轮询直到获取成功或超过 `wait`，超时返回 `Contended`。
/// 获取成功后启动看门狗，每隔 `ttl / 3` 校验令牌并续期，释放时先停止看门狗。
/// 进程崩溃时看门狗随之消失，租约仍会自然过期。
pub struct BlockingLeaseLock {
    lease: LeaseLock,
    store: Arc<dyn CacheStore>,
    wait: Duration,
    poll_interval: Duration,
    watchdogs: DashMap<String, JoinHandle<()>>,
}

impl BlockingLeaseLock {
    /// 创建阻塞式租约锁
    ///
    /// # 参数
    ///
    /// * `store` - 共享缓存存储
    /// * `wait` - 单次获取的最长等待时间
    /// * `poll_interval` - 等待期间的轮询间隔
    pub fn new(store: Arc<dyn CacheStore>, wait: Duration, poll_interval: Duration) -> Self {
        Self {
            lease: LeaseLock::new(store.clone()),
            store,
            wait,
            poll_interval,
            watchdogs: DashMap::new(),
        }
    }

    fn spawn_watchdog(&self, key: &str, token: &LockToken, ttl: Duration) {
        let store = self.store.clone();
        let key = key.to_string();
        let owner = token.as_str().to_string();
        let period = (ttl / 3).max(MIN_RENEW_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match store.compare_and_expire(&key, &owner, ttl).await {
                    Ok(true) => debug!("Lease renewed: key={}", key),
                    Ok(false) => {
                        debug!("Lease {} lost, watchdog stopping", key);
                        break;
                    }
                    Err(e) => warn!("Failed to renew lease {}: {}", key, e),
                }
            }
        });
        self.watchdogs.insert(token.as_str().to_string(), handle);
    }

    /// 当前运行的看门狗数量
    pub fn active_watchdogs(&self) -> usize {
        self.watchdogs.len()
    }
}

impl Drop for BlockingLeaseLock {
    fn drop(&mut self) {
        for entry in self.watchdogs.iter() {
            entry.value().abort();
        }
    }
}

#[async_trait]
impl RebuildLock for BlockingLeaseLock {
    #[instrument(skip(self), level = "debug")]
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockAttempt> {
        let deadline = Instant::now() + self.wait;
        loop {
            if let LockAttempt::Acquired(token) = self.lease.acquire(key, ttl).await? {
                self.spawn_watchdog(key, &token, ttl);
                return Ok(LockAttempt::Acquired(token));
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Gave up waiting for lease {} after {:?}", key, self.wait);
                return Ok(LockAttempt::Contended);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool> {
        if let Some((_, handle)) = self.watchdogs.remove(token.as_str()) {
            handle.abort();
        }
        self.lease.release(key, token).await
    }
}
