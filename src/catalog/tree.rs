//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 由分类行快照组装三级分类树。

use super::{Catalog2Node, Catalog3Node, CategoryRow, CategoryTree, ROOT_PARENT_ID};
use crate::error::{CacheError, Result};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// 按父ID分组的子行索引，组内保持快照顺序
struct ChildIndex<'a> {
    children: HashMap<i64, Vec<&'a CategoryRow>>,
}

impl<'a> ChildIndex<'a> {
    fn new(rows: &'a [CategoryRow]) -> Self {
        let mut children: HashMap<i64, Vec<&'a CategoryRow>> = HashMap::new();
        for row in rows {
            children.entry(row.parent_cid).or_default().push(row);
        }
        Self { children }
    }

    fn of(&self, parent: i64) -> &[&'a CategoryRow] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// 检查快照能否组成一棵树：ID不重复，不存在自引用或成环的父链
fn validate(rows: &[CategoryRow]) -> Result<HashMap<i64, &CategoryRow>> {
    let mut by_id = HashMap::with_capacity(rows.len());
    for row in rows {
        if row.cat_id == ROOT_PARENT_ID {
            return Err(CacheError::InvalidCategoryTree(format!(
                "category '{}' uses the reserved root id {}",
                row.name, ROOT_PARENT_ID
            )));
        }
        if row.cat_id == row.parent_cid {
            return Err(CacheError::InvalidCategoryTree(format!(
                "category {} is its own parent",
                row.cat_id
            )));
        }
        if by_id.insert(row.cat_id, row).is_some() {
            return Err(CacheError::InvalidCategoryTree(format!(
                "duplicate category id {}",
                row.cat_id
            )));
        }
    }

    // 已确认能走到根或断链的ID
    let mut settled: HashSet<i64> = HashSet::with_capacity(rows.len());
    for row in rows {
        let mut trail = Vec::new();
        let mut on_trail = HashSet::new();
        let mut current = row.cat_id;
        loop {
            if current == ROOT_PARENT_ID || settled.contains(&current) {
                break;
            }
            if !on_trail.insert(current) {
                return Err(CacheError::InvalidCategoryTree(format!(
                    "cycle in parent links at category {}",
                    current
                )));
            }
            trail.push(current);
            match by_id.get(&current) {
                Some(node) => current = node.parent_cid,
                None => break,
            }
        }
        settled.extend(trail);
    }

    Ok(by_id)
}

/// 组装三级分类树
///
/// 父ID为0的行是一级分类；二、三级按父ID挂接，列表保持快照中的相对顺序。
/// 没有子分类的一级分类映射到空列表而不是缺失。
/// 父分类不在快照中的行会被跳过。
///
/// # 错误
///
/// ID重复、自引用或父链成环时返回 [`CacheError::InvalidCategoryTree`]
pub fn build(rows: &[CategoryRow]) -> Result<CategoryTree> {
    let by_id = validate(rows)?;

    for row in rows {
        if row.parent_cid != ROOT_PARENT_ID && !by_id.contains_key(&row.parent_cid) {
            warn!(
                "Skipping orphan category {} ('{}'): parent {} not found",
                row.cat_id, row.name, row.parent_cid
            );
        }
    }

    let index = ChildIndex::new(rows);
    let mut tree = CategoryTree::new();
    for l1 in index.of(ROOT_PARENT_ID) {
        let l1_id = l1.cat_id.to_string();
        let catalog2 = index
            .of(l1.cat_id)
            .iter()
            .map(|l2| {
                let l2_id = l2.cat_id.to_string();
                let catalog3 = index
                    .of(l2.cat_id)
                    .iter()
                    .map(|l3| Catalog3Node {
                        id: l3.cat_id.to_string(),
                        name: l3.name.clone(),
                        parent_id: l2_id.clone(),
                    })
                    .collect();
                Catalog2Node {
                    parent_id: l1_id.clone(),
                    name: l2.name.clone(),
                    id: l2_id,
                    catalog3,
                }
            })
            .collect();
        tree.insert(l1_id, catalog2);
    }
    Ok(tree)
}

/// 一级分类列表，保持快照顺序
pub fn level1(rows: &[CategoryRow]) -> Vec<CategoryRow> {
    rows.iter()
        .filter(|row| row.parent_cid == ROOT_PARENT_ID)
        .cloned()
        .collect()
}

/// 分类的完整路径
///
/// 返回从一级分类到 `cat_id` 的ID序列，例如 `[1, 11, 111]`
pub fn catalog_path(rows: &[CategoryRow], cat_id: i64) -> Result<Vec<i64>> {
    let by_id = validate(rows)?;
    if !by_id.contains_key(&cat_id) {
        return Err(CacheError::InvalidCategoryTree(format!(
            "unknown category id {}",
            cat_id
        )));
    }

    let mut path = Vec::new();
    let mut current = cat_id;
    while current != ROOT_PARENT_ID {
        path.push(current);
        match by_id.get(&current) {
            Some(row) => current = row.parent_cid,
            None => {
                return Err(CacheError::InvalidCategoryTree(format!(
                    "category {} has a missing ancestor {}",
                    cat_id, current
                )))
            }
        }
    }
    path.reverse();
    Ok(path)
}
