//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分类数据读取
//!
//! 缓存未命中时一次性读出全部分类行，由树构建器在内存中组装，避免逐级查询

use super::CategoryRow;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, Statement};
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// 分类读取器
#[async_trait]
pub trait CategoryReader: Send + Sync {
    /// 一次查询读出全部分类行
    async fn load_all_category_rows(&self) -> Result<Vec<CategoryRow>>;
}

#[derive(Debug, FromQueryResult)]
struct CategoryRecord {
    cat_id: i64,
    name: String,
    parent_cid: i64,
    cat_level: i32,
}

impl From<CategoryRecord> for CategoryRow {
    fn from(record: CategoryRecord) -> Self {
        CategoryRow {
            cat_id: record.cat_id,
            name: record.name,
            parent_cid: record.parent_cid,
            cat_level: record.cat_level,
        }
    }
}

/// 基于Sea-ORM的分类读取器
///
/// 查询语句需要返回 `cat_id, name, parent_cid, cat_level` 四列
pub struct SeaOrmCategoryReader {
    db: DatabaseConnection,
    query: String,
    timeout: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for SeaOrmCategoryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeaOrmCategoryReader")
            .field("query", &self.query)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl SeaOrmCategoryReader {
    /// 创建分类读取器
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    /// * `query` - 分类查询语句
    pub fn new(db: DatabaseConnection, query: impl Into<String>) -> Self {
        Self {
            db,
            query: query.into(),
            timeout: Duration::from_secs(5),
            max_retries: 2,
        }
    }

    /// 设置单次查询超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 设置失败后的重试次数
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    async fn query_once(&self) -> Result<Vec<CategoryRow>> {
        let statement = Statement::from_string(self.db.get_database_backend(), self.query.clone());
        let load = CategoryRecord::find_by_statement(statement).all(&self.db);
        match tokio::time::timeout(self.timeout, load).await {
            Ok(records) => Ok(records?.into_iter().map(CategoryRow::from).collect()),
            Err(_) => Err(CacheError::Timeout(format!(
                "category query timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl CategoryReader for SeaOrmCategoryReader {
    #[instrument(skip(self), level = "info")]
    async fn load_all_category_rows(&self) -> Result<Vec<CategoryRow>> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} for category query", attempt);
            }

            match self.query_once().await {
                Ok(rows) => {
                    info!("Loaded {} category rows from database", rows.len());
                    return Ok(rows);
                }
                Err(e) => {
                    error!("Failed to load category rows: {}", e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        // 指数退避重试
                        let backoff_ms = 100 * 2_u64.pow(attempt);
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            CacheError::Timeout("all category query attempts failed".to_string())
        }))
    }
}
