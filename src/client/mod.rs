//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分类缓存客户端。
//!
//! 客户端按旁路缓存模式读取分类数据：命中直接返回；未命中时只有拿到重建锁的
//! 调用方查询数据库并回写缓存，其余调用方退避后重新读取缓存。

use crate::backend::{CacheStore, RedisStore};
use crate::catalog::{self, CategoryReader, CategoryRow, CategoryTree, SeaOrmCategoryReader};
use crate::config::{CatalogConfig, Config, LockStrategy};
use crate::error::{CacheError, Result};
use crate::lock::{BlockingLeaseLock, LeaseLock, LocalLock, LockAttempt, LockToken, RebuildLock};
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{Serializer, SerializerEnum};
use rand::Rng;
use sea_orm::DatabaseConnection;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// 空结果标记
///
/// 不是合法的JSON也不是gzip数据，不会与正常缓存值混淆
const EMPTY_MARKER: &[u8] = b"__catcache_empty__";

/// 可缓存的聚合值
///
/// 空值以空标记缓存，读到空标记时返回 `Default`
pub trait CachedAggregate: Serialize + DeserializeOwned + Default + Send + Sync {
    /// 是否为空结果
    fn is_empty_aggregate(&self) -> bool;
}

impl CachedAggregate for CategoryTree {
    fn is_empty_aggregate(&self) -> bool {
        self.is_empty()
    }
}

impl CachedAggregate for Vec<CategoryRow> {
    fn is_empty_aggregate(&self) -> bool {
        self.is_empty()
    }
}

/// 分类缓存客户端
pub struct CatalogClient {
    config: CatalogConfig,
    store: Arc<dyn CacheStore>,
    lock: Arc<dyn RebuildLock>,
    reader: Arc<dyn CategoryReader>,
    serializer: SerializerEnum,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("service_name", &self.config.service_name)
            .field("key_prefix", &self.config.key_prefix)
            .field("lock_strategy", &self.config.lock_strategy)
            .finish()
    }
}

impl CatalogClient {
    /// 使用指定的重建锁创建客户端
    pub fn new(
        config: CatalogConfig,
        store: Arc<dyn CacheStore>,
        lock: Arc<dyn RebuildLock>,
        reader: Arc<dyn CategoryReader>,
    ) -> Self {
        Self {
            serializer: SerializerEnum::json(config.compress),
            config,
            store,
            lock,
            reader,
            shutdown: CancellationToken::new(),
        }
    }

    /// 按配置中的锁策略创建客户端
    pub fn from_config(
        config: CatalogConfig,
        store: Arc<dyn CacheStore>,
        reader: Arc<dyn CategoryReader>,
    ) -> Self {
        let lock = Self::lock_for(&config, store.clone());
        Self::new(config, store, lock, reader)
    }

    /// 连接Redis并基于Sea-ORM连接创建客户端
    #[instrument(skip(config, db), level = "info")]
    pub async fn connect(config: &Config, db: DatabaseConnection) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;
        let store: Arc<dyn CacheStore> = Arc::new(RedisStore::new(&config.redis).await?);
        let reader: Arc<dyn CategoryReader> = Arc::new(SeaOrmCategoryReader::new(
            db,
            config.catalog.category_query.clone(),
        ));
        info!(
            "Catalog client connected, service={}, strategy={:?}",
            config.catalog.service_name, config.catalog.lock_strategy
        );
        Ok(Self::from_config(config.catalog.clone(), store, reader))
    }

    fn lock_for(config: &CatalogConfig, store: Arc<dyn CacheStore>) -> Arc<dyn RebuildLock> {
        match config.lock_strategy {
            LockStrategy::Lease => Arc::new(LeaseLock::new(store)),
            LockStrategy::Local => Arc::new(LocalLock::new()),
            LockStrategy::Blocking => Arc::new(BlockingLeaseLock::new(
                store,
                config.max_wait(),
                config.retry_backoff(),
            )),
        }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// 读取三级分类树
    #[instrument(skip(self), level = "debug", fields(service = %self.config.service_name))]
    pub async fn get_catalog_tree(&self) -> Result<CategoryTree> {
        let reader = self.reader.clone();
        self.load_through(
            &self.config.tree_key(),
            &self.config.tree_lock_key(),
            move || {
                let reader = reader.clone();
                async move {
                    let rows = reader.load_all_category_rows().await?;
                    catalog::tree::build(&rows)
                }
            },
        )
        .await
    }

    /// 读取全部一级分类
    #[instrument(skip(self), level = "debug", fields(service = %self.config.service_name))]
    pub async fn get_level1_categories(&self) -> Result<Vec<CategoryRow>> {
        let reader = self.reader.clone();
        self.load_through(
            &self.config.level1_key(),
            &self.config.level1_lock_key(),
            move || {
                let reader = reader.clone();
                async move {
                    let rows = reader.load_all_category_rows().await?;
                    Ok(catalog::tree::level1(&rows))
                }
            },
        )
        .await
    }

    /// 查询分类从一级到自身的完整ID路径，不经过缓存
    #[instrument(skip(self), level = "debug")]
    pub async fn catalog_path(&self, cat_id: i64) -> Result<Vec<i64>> {
        let rows = self.reader.load_all_category_rows().await?;
        catalog::tree::catalog_path(&rows, cat_id)
    }

    /// 清除所有分类缓存
    ///
    /// 分类数据变更后调用，下一次读取会重建
    #[instrument(skip(self), level = "info", fields(service = %self.config.service_name))]
    pub async fn invalidate(&self) -> Result<()> {
        for key in [self.config.tree_key(), self.config.level1_key()] {
            if let Err(e) = self.store.delete(&key).await {
                error!("Failed to invalidate {}: {}", key, e);
                GLOBAL_METRICS.record_request(&self.config.service_name, "Cache", "invalidate", "error");
                return Err(e);
            }
        }
        GLOBAL_METRICS.record_request(&self.config.service_name, "Cache", "invalidate", "success");
        info!("Category cache invalidated");
        Ok(())
    }

    /// 关闭客户端，正在退避等待的调用立即返回 `RebuildAborted`
    pub fn shutdown(&self) {
        info!("Shutting down catalog client {}", self.config.service_name);
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 旁路缓存读取
    ///
    /// 先读缓存；未命中时竞争 `lock_key`，拿到锁的调用方执行 `rebuild`
    /// 并回写 `data_key`，竞争失败的调用方按 `retry_backoff` 退避后重新读取，
    /// 直到命中、超过 `max_wait` 或被关闭。
    ///
    /// 缓存读取失败时直接调用 `rebuild` 返回结果，本次不回写缓存。
    pub async fn load_through<T, F, Fut>(
        &self,
        data_key: &str,
        lock_key: &str,
        rebuild: F,
    ) -> Result<T>
    where
        T: CachedAggregate,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let service = self.config.service_name.as_str();
        let started = Instant::now();
        let backoff = self.config.retry_backoff();
        let mut lock_errors: u32 = 0;

        loop {
            match self.read_cached::<T>(data_key).await {
                Ok(Some(value)) => {
                    GLOBAL_METRICS.record_request(service, "Cache", "get", "hit");
                    return Ok(value);
                }
                Ok(None) => {
                    GLOBAL_METRICS.record_request(service, "Cache", "get", "miss");
                }
                Err(e) => {
                    warn!(
                        "Cache read failed for {}, loading from database without caching: {}",
                        data_key, e
                    );
                    GLOBAL_METRICS.record_request(service, "Cache", "get", "error");
                    return self.timed_rebuild(&rebuild).await;
                }
            }

            match self.lock.acquire(lock_key, self.config.lease_ttl()).await {
                Ok(LockAttempt::Acquired(token)) => {
                    GLOBAL_METRICS.record_request(service, "Lock", "acquire", "acquired");
                    let outcome = self.rebuild_and_publish(data_key, &rebuild).await;
                    self.release_quietly(lock_key, &token).await;
                    return outcome;
                }
                Ok(LockAttempt::Contended) => {
                    GLOBAL_METRICS.record_request(service, "Lock", "acquire", "contended");
                    debug!("Rebuild lock {} held elsewhere, backing off", lock_key);
                    lock_errors = 0;
                }
                Err(e) => {
                    GLOBAL_METRICS.record_request(service, "Lock", "acquire", "error");
                    lock_errors += 1;
                    warn!(
                        "Failed to acquire rebuild lock {} ({}/{}): {}",
                        lock_key, lock_errors, self.config.max_lock_errors, e
                    );
                    if lock_errors >= self.config.max_lock_errors {
                        return Err(CacheError::LockUnavailable {
                            key: lock_key.to_string(),
                            attempts: lock_errors,
                            source: Box::new(e),
                        });
                    }
                }
            }

            if started.elapsed() + backoff > self.config.max_wait() {
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                warn!("Gave up waiting for {} after {}ms", lock_key, waited_ms);
                return Err(CacheError::LockWaitTimeout {
                    key: lock_key.to_string(),
                    waited_ms,
                });
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Err(CacheError::RebuildAborted(data_key.to_string()));
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }
    }

    /// 持锁重建：二次检查缓存，仍未命中才查询数据库并回写
    async fn rebuild_and_publish<T, F, Fut>(&self, data_key: &str, rebuild: &F) -> Result<T>
    where
        T: CachedAggregate,
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        match self.read_cached::<T>(data_key).await {
            Ok(Some(value)) => {
                debug!("{} was rebuilt by the previous holder", data_key);
                return Ok(value);
            }
            Ok(None) => {}
            Err(e) => warn!("Double-check read of {} failed: {}", data_key, e),
        }

        let value = self.timed_rebuild(rebuild).await?;
        self.publish(data_key, &value).await;
        Ok(value)
    }

    async fn timed_rebuild<T, F, Fut>(&self, rebuild: &F) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        let service = self.config.service_name.as_str();
        let started = Instant::now();
        GLOBAL_METRICS.record_request(service, "DB", "load", "attempt");
        let result = rebuild().await;
        GLOBAL_METRICS.record_duration(service, "DB", "load", started.elapsed().as_secs_f64());
        match &result {
            Ok(_) => GLOBAL_METRICS.record_request(service, "DB", "load", "success"),
            Err(e) => {
                error!("Category rebuild failed: {}", e);
                GLOBAL_METRICS.record_request(service, "DB", "load", "error");
            }
        }
        result
    }

    /// 读取并解码缓存值
    ///
    /// 只有存储故障返回 `Err`；无法解码的条目视为未命中，由重建覆盖
    async fn read_cached<T: CachedAggregate>(&self, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        if bytes == EMPTY_MARKER {
            debug!("Empty marker hit for {}", key);
            return Ok(Some(T::default()));
        }
        match self.serializer.deserialize(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// 回写缓存，失败只记录告警
    async fn publish<T: CachedAggregate>(&self, key: &str, value: &T) {
        let service = self.config.service_name.as_str();
        let (bytes, ttl) = if value.is_empty_aggregate() {
            (EMPTY_MARKER.to_vec(), self.config.empty_ttl())
        } else {
            match self.serializer.serialize(value) {
                Ok(bytes) => (bytes, self.jittered_data_ttl()),
                Err(e) => {
                    warn!("Failed to serialize {}: {}", key, e);
                    GLOBAL_METRICS.record_request(service, "Cache", "set", "error");
                    return;
                }
            }
        };

        match self.store.set(key, bytes, ttl).await {
            Ok(()) => {
                debug!("Published {} with ttl {:?}", key, ttl);
                GLOBAL_METRICS.record_request(service, "Cache", "set", "success");
            }
            Err(e) => {
                warn!("Failed to publish {}: {}", key, e);
                GLOBAL_METRICS.record_request(service, "Cache", "set", "error");
            }
        }
    }

    fn jittered_data_ttl(&self) -> Duration {
        let base = self.config.data_ttl();
        if self.config.ttl_jitter_secs == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.config.ttl_jitter_secs);
        base + Duration::from_secs(jitter)
    }

    async fn release_quietly(&self, lock_key: &str, token: &LockToken) {
        match self.lock.release(lock_key, token).await {
            Ok(true) => {
                GLOBAL_METRICS.record_request(&self.config.service_name, "Lock", "release", "released");
            }
            Ok(false) => {
                debug!("Lease {} expired before release", lock_key);
                GLOBAL_METRICS.record_request(&self.config.service_name, "Lock", "release", "expired");
            }
            Err(e) => {
                warn!("Failed to release rebuild lock {}: {}", lock_key, e);
                GLOBAL_METRICS.record_request(&self.config.service_name, "Lock", "release", "error");
            }
        }
    }
}
