//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis连接提供者接口和默认实现。

use crate::{
    config::RedisConfig,
    error::{CacheError, Result},
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, cluster_async::ClusterConnection, Client};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};

/// Redis连接提供者
///
/// 抽象出建立连接的过程，测试中可替换为指向不可达地址的实现
#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn connect_standalone(&self, config: &RedisConfig) -> Result<ConnectionManager>;
    async fn connect_cluster(&self, config: &RedisConfig) -> Result<ClusterConnection>;
}

pub struct DefaultRedisProvider;

impl DefaultRedisProvider {
    fn standalone_url(config: &RedisConfig) -> String {
        let url = config.connection_string.expose_secret();
        if config.enable_tls && !url.starts_with("rediss://") {
            url.replace("redis://", "rediss://")
        } else {
            url.to_string()
        }
    }
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn connect_standalone(&self, config: &RedisConfig) -> Result<ConnectionManager> {
        let client = Client::open(Self::standalone_url(config).as_str())?;
        match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => Ok(res?),
            Err(_) => Err(CacheError::Timeout(format!(
                "Redis connection timed out after {}ms",
                config.connection_timeout_ms
            ))),
        }
    }

    async fn connect_cluster(&self, config: &RedisConfig) -> Result<ClusterConnection> {
        if config.nodes.is_empty() {
            return Err(CacheError::ConfigError(
                "Cluster mode requires at least one node".to_string(),
            ));
        }

        let mut builder = redis::cluster::ClusterClient::builder(config.nodes.clone());
        if let Some(password) = &config.password {
            builder = builder.password(password.expose_secret().to_string());
        }
        let client = builder.build()?;

        timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_async_connection(),
        )
        .await
        .map_err(|_| {
            CacheError::Timeout(format!(
                "Redis cluster connection timed out after {}ms",
                config.connection_timeout_ms
            ))
        })?
        .map_err(CacheError::from)
    }
}
