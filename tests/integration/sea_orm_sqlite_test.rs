//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! SeaORM SQLite测试：分类读取与写入后失效

use catcache::backend::{CacheStore, MemoryStore};
use catcache::catalog::{CategoryReader, CategoryWriter, SeaOrmCategoryReader};
use catcache::client::CatalogClient;
use catcache::config::DEFAULT_CATEGORY_QUERY;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[path = "../common/mod.rs"]
mod common;

use common::{fast_config, FlakyStore};

async fn setup_database() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    db.execute_unprepared(
        "CREATE TABLE pms_category (
            cat_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            parent_cid INTEGER NOT NULL,
            cat_level INTEGER NOT NULL
        )",
    )
    .await
    .unwrap();
    db.execute_unprepared(
        "INSERT INTO pms_category (cat_id, name, parent_cid, cat_level) VALUES
            (1, 'Electronics', 0, 1),
            (2, 'Phones', 1, 2),
            (3, 'SmartPhones', 2, 3),
            (4, 'Books', 0, 1)",
    )
    .await
    .unwrap();
    db
}

async fn category_name(db: &DatabaseConnection, cat_id: i64) -> Option<String> {
    let row = db
        .query_one(Statement::from_string(
            db.get_database_backend(),
            format!("SELECT name FROM pms_category WHERE cat_id = {}", cat_id),
        ))
        .await
        .unwrap()?;
    Some(row.try_get::<String>("", "name").unwrap())
}

#[tokio::test]
async fn test_reader_loads_all_rows() {
    common::setup_logging();
    let db = setup_database().await;
    let reader = SeaOrmCategoryReader::new(db, DEFAULT_CATEGORY_QUERY);

    let rows = reader.load_all_category_rows().await.unwrap();
    assert_eq!(rows.len(), 4);
    let phones = rows.iter().find(|row| row.cat_id == 2).unwrap();
    assert_eq!(phones.name, "Phones");
    assert_eq!(phones.parent_cid, 1);
    assert_eq!(phones.cat_level, 2);
}

#[tokio::test]
async fn test_reader_reports_bad_query() {
    let db = setup_database().await;
    let reader = SeaOrmCategoryReader::new(db, "SELECT cat_id FROM missing_table")
        .with_max_retries(1)
        .with_timeout(Duration::from_secs(1));

    assert!(reader.load_all_category_rows().await.is_err());
}

#[tokio::test]
async fn test_writer_invalidates_inside_transaction() {
    let db = setup_database().await;
    let store = Arc::new(MemoryStore::default());
    let reader = Arc::new(SeaOrmCategoryReader::new(db.clone(), DEFAULT_CATEGORY_QUERY));
    let client = Arc::new(CatalogClient::from_config(
        fast_config("writer"),
        store.clone(),
        reader,
    ));

    let before = client.get_catalog_tree().await.unwrap();
    assert_eq!(before["1"][0].name, "Phones");
    assert!(store.get(&client.config().tree_key()).await.unwrap().is_some());

    let writer = CategoryWriter::new(db.clone(), client.clone());
    assert_eq!(writer.update_name(2, "Mobile Phones").await.unwrap(), 1);

    assert!(store.get(&client.config().tree_key()).await.unwrap().is_none());
    assert_eq!(category_name(&db, 2).await.as_deref(), Some("Mobile Phones"));

    let after = client.get_catalog_tree().await.unwrap();
    assert_eq!(after["1"][0].name, "Mobile Phones");
}

#[tokio::test]
async fn test_writer_removes_categories() {
    let db = setup_database().await;
    let store = Arc::new(MemoryStore::default());
    let reader = Arc::new(SeaOrmCategoryReader::new(db.clone(), DEFAULT_CATEGORY_QUERY));
    let client = Arc::new(CatalogClient::from_config(
        fast_config("writer-remove"),
        store.clone(),
        reader,
    ));
    assert_eq!(client.get_level1_categories().await.unwrap().len(), 2);

    let writer = CategoryWriter::new(db.clone(), client.clone());
    assert_eq!(writer.remove_by_ids(&[4]).await.unwrap(), 1);
    assert_eq!(writer.remove_by_ids(&[]).await.unwrap(), 0);

    let level1 = client.get_level1_categories().await.unwrap();
    assert_eq!(level1.len(), 1);
    assert_eq!(level1[0].name, "Electronics");
}

#[tokio::test]
async fn test_writer_rolls_back_when_invalidation_fails() {
    let db = setup_database().await;
    let store = Arc::new(FlakyStore::new());
    let reader = Arc::new(SeaOrmCategoryReader::new(db.clone(), DEFAULT_CATEGORY_QUERY));
    let client = Arc::new(CatalogClient::from_config(
        fast_config("writer-rollback"),
        store.clone(),
        reader,
    ));
    client.get_catalog_tree().await.unwrap();

    store.fail_delete.store(true, Ordering::SeqCst);
    let writer = CategoryWriter::new(db.clone(), client.clone());
    assert!(writer.update_name(2, "Mobile Phones").await.is_err());

    assert_eq!(category_name(&db, 2).await.as_deref(), Some("Phones"));
    assert!(store.get(&client.config().tree_key()).await.unwrap().is_some());
}

#[tokio::test]
async fn test_writer_rejects_unsafe_table_name() {
    let db = setup_database().await;
    let reader = Arc::new(SeaOrmCategoryReader::new(db.clone(), DEFAULT_CATEGORY_QUERY));
    let client = Arc::new(CatalogClient::from_config(
        fast_config("writer-table"),
        Arc::new(MemoryStore::default()),
        reader,
    ));

    assert!(CategoryWriter::new(db.clone(), client.clone())
        .with_table("pms_category; DROP TABLE x")
        .is_err());
    assert!(CategoryWriter::new(db, client)
        .with_table("pms_category")
        .is_ok());
}
