//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 商品分类领域：分类行、三级分类树、数据库读写。

pub mod reader;
pub mod tree;
pub mod writer;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use reader::{CategoryReader, SeaOrmCategoryReader};
pub use writer::CategoryWriter;

/// 一级分类的父ID
pub const ROOT_PARENT_ID: i64 = 0;

/// 分类表中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub cat_id: i64,
    pub name: String,
    pub parent_cid: i64,
    pub cat_level: i32,
}

impl CategoryRow {
    pub fn new(cat_id: i64, name: impl Into<String>, parent_cid: i64, cat_level: i32) -> Self {
        Self {
            cat_id,
            name: name.into(),
            parent_cid,
            cat_level,
        }
    }
}

/// 二级分类节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog2Node {
    pub parent_id: String,
    pub name: String,
    pub id: String,
    pub catalog3: Vec<Catalog3Node>,
}

/// 三级分类节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog3Node {
    pub id: String,
    pub name: String,
    pub parent_id: String,
}

/// 三级分类树
///
/// 一级分类ID到其二级分类列表的有序映射，顺序与快照中一级分类的顺序一致
pub type CategoryTree = IndexMap<String, Vec<Catalog2Node>>;
