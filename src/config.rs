//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分类缓存的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;

/// 默认的分类查询语句，一次性读出全部分类
pub const DEFAULT_CATEGORY_QUERY: &str =
    "SELECT cat_id, name, parent_cid, cat_level FROM pms_category";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Redis模式枚举
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 集群模式
    Cluster,
}

/// Redis连接配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// 集群初始节点（仅集群模式）
    pub nodes: Vec<String>,
    /// Redis 密码（可选）
    pub password: Option<SecretString>,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            nodes: Vec::new(),
            password: None,
            enable_tls: false,
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
        }
    }
}

/// 重建锁策略
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LockStrategy {
    /// Redis租约锁，竞争失败立即返回，由调用方轮询
    #[default]
    Lease,
    /// 进程内互斥锁，只适用于单实例部署
    Local,
    /// 阻塞式Redis锁，带看门狗续期
    Blocking,
}

/// 分类缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CatalogConfig {
    /// 服务名称，用于日志和指标
    pub service_name: String,
    /// 缓存键前缀
    pub key_prefix: String,
    /// 分类树缓存时间（秒）
    pub data_ttl_secs: u64,
    /// 空结果标记的缓存时间（秒）
    pub empty_ttl_secs: u64,
    /// 随机附加的过期抖动上限（秒），0表示不抖动
    pub ttl_jitter_secs: u64,
    /// 租约时长（毫秒）
    pub lease_ttl_ms: u64,
    /// 竞争失败后的退避间隔（毫秒）
    pub retry_backoff_ms: u64,
    /// 单次调用等待锁的最长时间（毫秒）
    pub max_wait_ms: u64,
    /// 获取锁时允许的连续存储错误次数
    pub max_lock_errors: u32,
    /// 锁策略
    pub lock_strategy: LockStrategy,
    /// 是否压缩缓存值
    pub compress: bool,
    /// 分类查询语句
    pub category_query: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            service_name: "mall-product".to_string(),
            key_prefix: "category".to_string(),
            data_ttl_secs: 86400,
            empty_ttl_secs: 60,
            ttl_jitter_secs: 300,
            lease_ttl_ms: 30_000,
            retry_backoff_ms: 200,
            max_wait_ms: 30_000,
            max_lock_errors: 3,
            lock_strategy: LockStrategy::Lease,
            compress: false,
            category_query: DEFAULT_CATEGORY_QUERY.to_string(),
        }
    }
}

impl CatalogConfig {
    /// 分类树缓存键
    pub fn tree_key(&self) -> String {
        format!("{}:catalog_json", self.key_prefix)
    }

    /// 分类树重建锁键
    pub fn tree_lock_key(&self) -> String {
        format!("{}:catalog_json:lock", self.key_prefix)
    }

    /// 一级分类缓存键
    pub fn level1_key(&self) -> String {
        format!("{}:level1", self.key_prefix)
    }

    /// 一级分类重建锁键
    pub fn level1_lock_key(&self) -> String {
        format!("{}:level1:lock", self.key_prefix)
    }

    pub fn data_ttl(&self) -> Duration {
        Duration::from_secs(self.data_ttl_secs)
    }

    pub fn empty_ttl(&self) -> Duration {
        Duration::from_secs(self.empty_ttl_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))?;
        config.validate().map_err(CacheError::ConfigError)?;
        Ok(config)
    }

    /// 从TOML文件加载配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有值都在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = self.config_version {
            if version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        let redis = &self.redis;
        if !(100..=30000).contains(&redis.connection_timeout_ms) {
            return Err("redis connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }
        if !(100..=60000).contains(&redis.command_timeout_ms) {
            return Err("redis command_timeout_ms must be between 100 and 60000 ms".to_string());
        }
        if redis.mode == RedisMode::Cluster && redis.nodes.is_empty() {
            return Err("redis cluster mode requires at least one node".to_string());
        }

        let catalog = &self.catalog;
        if catalog.key_prefix.is_empty() {
            return Err("catalog key_prefix cannot be empty".to_string());
        }
        if catalog.key_prefix.chars().any(char::is_whitespace) {
            return Err(format!(
                "catalog key_prefix '{}' cannot contain whitespace",
                catalog.key_prefix
            ));
        }
        if catalog.data_ttl_secs == 0 {
            return Err("catalog data_ttl_secs cannot be zero".to_string());
        }
        if catalog.data_ttl_secs > 86400 * 30 {
            return Err("catalog data_ttl_secs cannot exceed 30 days (2592000 seconds)".to_string());
        }
        if catalog.empty_ttl_secs == 0 {
            return Err("catalog empty_ttl_secs cannot be zero".to_string());
        }
        if catalog.empty_ttl_secs > catalog.data_ttl_secs {
            return Err(format!(
                "catalog empty_ttl_secs ({}) must be <= data_ttl_secs ({})",
                catalog.empty_ttl_secs, catalog.data_ttl_secs
            ));
        }
        if catalog.lease_ttl_ms < 100 {
            return Err("catalog lease_ttl_ms must be at least 100 ms".to_string());
        }
        if catalog.retry_backoff_ms == 0 {
            return Err("catalog retry_backoff_ms cannot be zero".to_string());
        }
        if catalog.max_wait_ms < catalog.retry_backoff_ms {
            return Err(format!(
                "catalog max_wait_ms ({}) must be >= retry_backoff_ms ({})",
                catalog.max_wait_ms, catalog.retry_backoff_ms
            ));
        }
        if catalog.max_lock_errors == 0 {
            return Err("catalog max_lock_errors cannot be zero".to_string());
        }
        if catalog.category_query.trim().is_empty() {
            return Err("catalog category_query cannot be empty".to_string());
        }

        Ok(())
    }
}
