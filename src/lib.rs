//! catcache - 分类树旁路缓存
//!
//! 为三级商品分类树提供旁路缓存读取，通过分布式租约锁保证缓存失效后
//! 只有一个调用方回源重建，并带有空结果缓存和过期时间抖动。

#![doc(html_root_url = "https://docs.rs/catcache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod serialization;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{CacheStore, MemoryStore, RedisStore};
pub use catalog::{
    Catalog2Node, Catalog3Node, CategoryReader, CategoryRow, CategoryTree, CategoryWriter,
    SeaOrmCategoryReader,
};
pub use client::{CachedAggregate, CatalogClient};
pub use config::{CatalogConfig, Config, LockStrategy};
pub use error::{CacheError, Result};
pub use lock::{LockAttempt, LockToken, RebuildLock};

/// catcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
