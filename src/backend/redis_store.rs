//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的共享缓存存储实现。

use super::redis_provider::{DefaultRedisProvider, RedisProvider};
use super::{ttl_millis, CacheStore};
use crate::config::{RedisConfig, RedisMode};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, cluster_async::ClusterConnection, FromRedisValue, Script};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

const COMPARE_AND_DELETE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

const COMPARE_AND_EXPIRE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
else
    return 0
end
"#;

#[derive(Clone)]
enum Connection {
    Standalone(ConnectionManager),
    Cluster(ClusterConnection),
}

/// Redis共享缓存存储
///
/// 单机模式使用 `ConnectionManager` 自动重连，集群模式使用集群连接。
/// 每条命令都受 `command_timeout_ms` 约束。
#[derive(Clone)]
pub struct RedisStore {
    conn: Connection,
    command_timeout: Duration,
    compare_and_delete: Arc<Script>,
    compare_and_expire: Arc<Script>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.conn {
            Connection::Standalone(_) => write!(f, "RedisStore::Standalone"),
            Connection::Cluster(_) => write!(f, "RedisStore::Cluster"),
        }
    }
}

impl RedisStore {
    /// 根据配置连接Redis
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        Self::new_with_provider(config, Arc::new(DefaultRedisProvider)).await
    }

    /// 使用指定的连接提供者连接Redis
    #[instrument(skip(config, provider), level = "info", fields(mode = ?config.mode))]
    pub async fn new_with_provider(
        config: &RedisConfig,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        debug!("Initializing RedisStore with mode: {:?}", config.mode);
        let conn = match config.mode {
            RedisMode::Standalone => {
                Connection::Standalone(provider.connect_standalone(config).await?)
            }
            RedisMode::Cluster => Connection::Cluster(provider.connect_cluster(config).await?),
        };
        Ok(Self {
            conn,
            command_timeout: Duration::from_millis(config.command_timeout_ms),
            compare_and_delete: Arc::new(Script::new(COMPARE_AND_DELETE)),
            compare_and_expire: Arc::new(Script::new(COMPARE_AND_EXPIRE)),
        })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::Timeout(format!(
                "Redis {} timed out after {}ms",
                op,
                self.command_timeout.as_millis()
            ))),
        }
    }

    async fn query<T: FromRedisValue>(&self, op: &str, cmd: &redis::Cmd) -> Result<T> {
        match &self.conn {
            Connection::Standalone(manager) => {
                let mut conn = manager.clone();
                self.bounded(op, cmd.query_async(&mut conn)).await
            }
            Connection::Cluster(cluster) => {
                let mut conn = cluster.clone();
                self.bounded(op, cmd.query_async(&mut conn)).await
            }
        }
    }

    async fn invoke<T: FromRedisValue>(
        &self,
        op: &str,
        script: &Script,
        key: &str,
        args: &[String],
    ) -> Result<T> {
        let mut invocation = script.key(key);
        for arg in args {
            invocation.arg(arg);
        }
        match &self.conn {
            Connection::Standalone(manager) => {
                let mut conn = manager.clone();
                self.bounded(op, invocation.invoke_async(&mut conn)).await
            }
            Connection::Cluster(cluster) => {
                let mut conn = cluster.clone();
                self.bounded(op, invocation.invoke_async(&mut conn)).await
            }
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let _: () = self
            .query(
                "SET",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("PX")
                    .arg(ttl_millis(ttl)),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let result: Option<String> = self
            .query(
                "SET NX",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl)),
            )
            .await?;
        debug!("SET NX result: key={}, acquired={}", key, result.is_some());
        Ok(result.is_some())
    }

    #[instrument(skip(self), level = "debug")]
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let removed: i64 = self
            .invoke(
                "compare_and_delete",
                &self.compare_and_delete,
                key,
                &[expected.to_string()],
            )
            .await?;
        Ok(removed == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let renewed: i64 = self
            .invoke(
                "compare_and_expire",
                &self.compare_and_expire,
                key,
                &[expected.to_string(), ttl_millis(ttl).to_string()],
            )
            .await?;
        Ok(renewed == 1)
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        let _: i64 = self.query("DEL", redis::cmd("DEL").arg(key)).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let _: String = self.query("PING", &redis::cmd("PING")).await?;
        Ok(())
    }
}
