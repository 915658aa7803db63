//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 进程内重建锁。

use super::{LockAttempt, LockToken, RebuildLock};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument};

/// 进程内互斥锁
///
/// 只在当前进程内互斥，多实例部署时每个实例各自重建一次。
/// 没有崩溃兜底的需要，`ttl` 被忽略。
#[derive(Default)]
pub struct LocalLock {
    mutexes: DashMap<String, Arc<Mutex<()>>>,
    // 令牌 -> (锁键, 守卫)，释放时丢弃守卫即解锁
    held: DashMap<String, (String, OwnedMutexGuard<()>)>,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RebuildLock for LocalLock {
    #[instrument(skip(self), level = "debug")]
    async fn acquire(&self, key: &str, _ttl: Duration) -> Result<LockAttempt> {
        let mutex = self.mutexes.entry(key.to_string()).or_default().clone();
        match mutex.try_lock_owned() {
            Ok(guard) => {
                let token = LockToken::generate();
                self.held
                    .insert(token.as_str().to_string(), (key.to_string(), guard));
                debug!("Local lock acquired: key={}", key);
                Ok(LockAttempt::Acquired(token))
            }
            Err(_) => Ok(LockAttempt::Contended),
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool> {
        let released = self
            .held
            .remove_if(token.as_str(), |_, (held_key, _)| held_key == key)
            .is_some();
        Ok(released)
    }
}
