//! 配置模块，负责加载JSON配置文件

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CachePolicy;
use crate::schema::TableSchema;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// 未设置 `RUST_LOG` 时使用的默认 `EnvFilter` 指令
    pub log_level: String,
    /// 过滤条件编译时针对的表
    pub table: TableSchema,
    pub cache: CachePolicy,
    /// 分页查询的每页行数
    pub page_size: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            table: TableSchema::users(),
            cache: CachePolicy::default(),
            page_size: 10,
        }
    }
}

impl FilterConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let display = path_ref.display().to_string();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(display));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }
}
