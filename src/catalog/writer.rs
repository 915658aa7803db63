//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 分类数据写入
//!
//! 每次修改在同一事务内先写库、再清除分类缓存、最后提交；
//! 清除缓存失败时事务回滚，修改不会生效

use crate::client::CatalogClient;
use crate::error::{CacheError, Result};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DbBackend, Statement, TransactionTrait, Value,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// 分类写入器
pub struct CategoryWriter {
    db: DatabaseConnection,
    table: String,
    catalog: Arc<CatalogClient>,
}

impl CategoryWriter {
    /// 创建分类写入器，表名默认为 `pms_category`
    pub fn new(db: DatabaseConnection, catalog: Arc<CatalogClient>) -> Self {
        Self {
            db,
            table: "pms_category".to_string(),
            catalog,
        }
    }

    /// 指定分类表名
    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid {
            return Err(CacheError::ConfigError(format!(
                "invalid category table name '{}'",
                table
            )));
        }
        self.table = table;
        Ok(self)
    }

    fn placeholder(backend: DbBackend, index: usize) -> String {
        match backend {
            DbBackend::Postgres => format!("${}", index),
            _ => "?".to_string(),
        }
    }

    /// 修改分类名称
    ///
    /// # 返回值
    ///
    /// 受影响的行数
    #[instrument(skip(self, name), level = "info")]
    pub async fn update_name(&self, cat_id: i64, name: &str) -> Result<u64> {
        let backend = self.db.get_database_backend();
        let sql = format!(
            "UPDATE {} SET name = {} WHERE cat_id = {}",
            self.table,
            Self::placeholder(backend, 1),
            Self::placeholder(backend, 2)
        );
        let statement = Statement::from_sql_and_values(
            backend,
            sql,
            [Value::from(name.to_string()), Value::from(cat_id)],
        );
        self.write_and_invalidate(statement).await
    }

    /// 批量删除分类
    #[instrument(skip(self), level = "info", fields(count = ids.len()))]
    pub async fn remove_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let backend = self.db.get_database_backend();
        let placeholders = (1..=ids.len())
            .map(|i| Self::placeholder(backend, i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM {} WHERE cat_id IN ({})",
            self.table, placeholders
        );
        let statement =
            Statement::from_sql_and_values(backend, sql, ids.iter().map(|id| Value::from(*id)));
        self.write_and_invalidate(statement).await
    }

    async fn write_and_invalidate(&self, statement: Statement) -> Result<u64> {
        let txn = self.db.begin().await?;
        let affected = txn.execute(statement).await?.rows_affected();
        // 出错时 txn 被丢弃即回滚
        self.catalog.invalidate().await?;
        txn.commit().await?;
        info!("Category write committed, {} rows affected", affected);
        Ok(affected)
    }
}
