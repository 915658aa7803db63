//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分类缓存的指标收集功能。

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{span, Level};

/// 指标收集器
///
/// 记录缓存命中、锁竞争、数据库回源等计数和耗时
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 请求总数统计
    /// key: "service:layer:op:result"
    pub requests_total: Arc<Mutex<HashMap<String, u64>>>,
    /// 操作耗时（累积时间和次数，用于计算平均值）
    /// key: "service:layer:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<Mutex<HashMap<String, (f64, u64)>>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Metrics {
    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `service` - 服务名称
    /// * `layer` - 组件（Cache/Lock/DB）
    /// * `op` - 操作类型（get/set/acquire/release/load/invalidate）
    /// * `result` - 操作结果（hit/miss/acquired/contended/success/error 等）
    pub fn record_request(&self, service: &str, layer: &str, op: &str, result: &str) {
        let span = span!(Level::TRACE, "catalog_request", service, layer, op, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}:{}", service, layer, op, result);
        *guard(&self.requests_total).entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, service: &str, layer: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}:{}", service, layer, op);
        let mut map = guard(&self.operation_duration);
        let entry = map.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 读取某个请求计数
    pub fn request_count(&self, service: &str, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}:{}", service, layer, op, result);
        guard(&self.requests_total).get(&key).copied().unwrap_or(0)
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为文本，用于监控系统采集
pub fn get_metrics_string() -> String {
    let metrics = &GLOBAL_METRICS;
    let reqs = guard(&metrics.requests_total);
    let dur = guard(&metrics.operation_duration);

    let mut output = String::new();
    for (k, v) in reqs.iter() {
        output.push_str(&format!("catalog_requests_total{{labels=\"{}\"}} {}\n", k, v));
    }
    for (k, (total, count)) in dur.iter() {
        let parts: Vec<&str> = k.split(':').collect();
        if parts.len() == 3 {
            output.push_str(&format!(
                "catalog_operation_duration_seconds_sum{{service=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                parts[0], parts[1], parts[2], total
            ));
            output.push_str(&format!(
                "catalog_operation_duration_seconds_count{{service=\"{}\", layer=\"{}\", operation=\"{}\"}} {}\n",
                parts[0], parts[1], parts[2], count
            ));
        }
    }
    output
}
