//! # 数据库配置

use crate::error::{PlatformError, Result};
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库URL
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout: u64,
    /// 获取连接超时时间（秒）
    pub acquire_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/vidgen.db?mode=rwc".to_string(),
            max_connections: 10,
            connect_timeout: 30,
            acquire_timeout: 30,
        }
    }
}

impl DatabaseConfig {
    /// 确保数据库目录存在（仅对SQLite文件数据库）
    pub fn ensure_database_path(&self) -> Result<()> {
        if !self.is_sqlite() || self.is_memory_database() {
            return Ok(());
        }

        let path_str = self
            .url
            .strip_prefix("sqlite://")
            .unwrap_or(&self.url)
            .split('?')
            .next()
            .unwrap_or_default();
        let db_path = Path::new(path_str);

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PlatformError::config_with_source(
                    format!("无法创建数据库目录: {}", parent.display()),
                    e,
                )
            })?;

            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "create_db_dir",
                &format!("创建数据库目录: {}", parent.display())
            );
        }

        Ok(())
    }

    /// 获取准备好的数据库连接字符串
    pub fn get_connection_url(&self) -> Result<String> {
        self.ensure_database_path()?;
        Ok(self.url.clone())
    }

    #[must_use]
    pub fn is_memory_database(&self) -> bool {
        self.url.contains(":memory:")
    }

    #[must_use]
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }
}
