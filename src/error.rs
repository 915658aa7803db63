//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分类缓存的错误类型和处理机制。

use thiserror::Error;

/// 分类缓存错误类型枚举
///
/// 区分缓存存储故障、锁竞争超时、分类数据异常与数据库错误，
/// 调用方据此决定是降级回源还是直接失败
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 缓存存储操作失败
    #[error("Backend error: {0}")]
    BackendError(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Sea-ORM数据库错误
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    /// 分类数据无法组装成三级树（重复ID、自引用或父链成环）
    #[error("Invalid category tree: {0}")]
    InvalidCategoryTree(String),

    /// 等待重建锁超过最大等待时间
    #[error("Timed out after {waited_ms}ms waiting for rebuild lock '{key}'")]
    LockWaitTimeout { key: String, waited_ms: u64 },

    /// 获取锁时缓存存储持续报错，与正常的锁竞争区分开
    #[error("Rebuild lock '{key}' unavailable after {attempts} failed attempts: {source}")]
    LockUnavailable {
        key: String,
        attempts: u32,
        #[source]
        source: Box<CacheError>,
    },

    /// 退避等待期间被取消
    #[error("Rebuild aborted while waiting for '{0}'")]
    RebuildAborted(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
