//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存重建锁。
//!
//! 三种策略实现同一个 [`RebuildLock`] 接口，编排器不关心具体策略：
//! - [`LeaseLock`]: 基于共享缓存的租约锁，竞争失败立即返回
//! - [`LocalLock`]: 进程内互斥，只在单实例部署时保证互斥
//! - [`BlockingLeaseLock`]: 在租约锁上阻塞等待，持有期间由看门狗续期

pub mod blocking;
pub mod lease;
pub mod local;

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub use blocking::BlockingLeaseLock;
pub use lease::LeaseLock;
pub use local::LocalLock;

/// 持有者令牌
///
/// 每次获取生成一个新的随机值，释放时必须出示同一个值
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LockToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockToken({})", self.0)
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 获取锁的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    /// 获取成功，持有给定令牌
    Acquired(LockToken),
    /// 锁已被其他持有者占用
    Contended,
}

/// 重建锁
#[async_trait]
pub trait RebuildLock: Send + Sync {
    /// 尝试获取锁
    ///
    /// 存储故障返回 `Err`，与正常的竞争失败 `Ok(LockAttempt::Contended)` 区分开
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<LockAttempt>;

    /// 释放锁
    ///
    /// # 返回值
    ///
    /// 令牌匹配并释放返回 true；租约已过期或被他人重新获取时返回 false，这不是错误
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool>;
}
