//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::Serializer;
use crate::error::{CacheError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
///
/// 分类树按JSON文档缓存，可选gzip压缩
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    compress: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { compress: false }
    }

    /// 创建启用压缩的JSON序列化器
    pub fn with_compression() -> Self {
        Self { compress: true }
    }

    #[cfg(feature = "flate2")]
    fn encode(&self, json: Vec<u8>) -> Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        if !self.compress {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(&json)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| CacheError::Serialization(e.to_string()))
    }

    #[cfg(not(feature = "flate2"))]
    fn encode(&self, json: Vec<u8>) -> Result<Vec<u8>> {
        Ok(json)
    }

    #[cfg(feature = "flate2")]
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        if !self.compress {
            return Ok(data.to_vec());
        }
        let mut decoded = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut decoded)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        Ok(decoded)
    }

    #[cfg(not(feature = "flate2"))]
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.encode(json)
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        let json = self.decode(data)?;
        serde_json::from_slice(&json).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}
