//! # 配置管理器
//!
//! 统一的配置加载接口：TOML 文件 + 环境变量覆盖 + 校验

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::AppConfig;
use crate::error::{PlatformError, Result};
use crate::{
    ldebug, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "VIDGEN_CONFIG_PATH";

/// 支持的环境变量覆盖
const ENV_OVERRIDES: [&str; 3] = [
    "VIDGEN_DATABASE_URL",
    "VIDGEN_SERVER_PORT",
    "VIDGEN_LOG_LEVEL",
];

/// 配置管理器
pub struct ConfigManager {
    /// 配置文件路径；`None` 表示使用内置默认配置
    config_path: Option<PathBuf>,
    /// 当前配置
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    /// 创建配置管理器
    ///
    /// 优先使用 `VIDGEN_CONFIG_PATH`；否则读取 `config/config.{RUST_ENV}.toml`，
    /// 该默认文件不存在时回退到内置默认配置。
    pub async fn new() -> Result<Self> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Self::from_file(path).await;
        }

        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        let default_path = PathBuf::from(format!("config/config.{env_name}.toml"));
        if default_path.exists() {
            return Self::from_file(default_path).await;
        }

        lwarn!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_fallback",
            &format!("配置文件不存在: {}，使用内置默认配置", default_path.display())
        );
        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        validate(&config)?;

        Ok(Self {
            config_path: None,
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 从指定文件创建配置管理器
    pub async fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config = Self::load(&config_path)?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_loaded",
            &format!("配置加载完成: {}", config_path.display()),
            port = config.server.port
        );

        Ok(Self {
            config_path: Some(config_path),
            config: Arc::new(RwLock::new(config)),
        })
    }

    /// 获取当前配置
    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// 重新读取配置文件
    pub async fn reload(&self) -> Result<AppConfig> {
        let Some(path) = &self.config_path else {
            return Err(PlatformError::config("当前使用内置默认配置，无法重载"));
        };

        let config = Self::load(path)?;
        *self.config.write().await = config.clone();
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_reloaded",
            "手动重载配置成功"
        );
        Ok(config)
    }

    fn load(path: &Path) -> Result<AppConfig> {
        let mut config = load_config_file(path)?;
        apply_env_overrides(&mut config, |key| env::var(key).ok())?;
        validate(&config)?;
        Ok(config)
    }
}

/// 读取并解析配置文件
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    crate::ensure_config!(path.exists(), "配置文件不存在: {}", path.display());

    let content = std::fs::read_to_string(path).map_err(|e| {
        PlatformError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
    })?;

    toml::from_str(&content).map_err(|e| {
        PlatformError::config_with_source(
            format!("TOML解析失败 - 配置文件: {}", path.display()),
            e,
        )
    })
}

/// 应用环境变量覆盖
///
/// `lookup` 便于在测试中替换真实环境变量。
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for key in ENV_OVERRIDES {
        let Some(value) = lookup(key) else {
            continue;
        };

        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "env_override",
            &format!("应用环境变量覆盖: {key}")
        );

        match key {
            "VIDGEN_DATABASE_URL" => config.database.url = value,
            "VIDGEN_SERVER_PORT" => {
                config.server.port = value.parse().map_err(|e| {
                    PlatformError::config_with_source(format!("无效的端口号: {value}"), e)
                })?;
            }
            "VIDGEN_LOG_LEVEL" => config.log_level = Some(value),
            _ => {}
        }
    }
    Ok(())
}

fn validate(config: &AppConfig) -> Result<()> {
    config
        .validate()
        .map_err(|reason| PlatformError::config(format!("配置校验失败: {reason}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_from_file_partial_config_uses_defaults() {
        let file = write_config(
            r#"
            [server]
            port = 7070

            [database]
            url = "sqlite::memory:"

            [pools.cartesia]
            default_units_limit = 5000
            error_threshold = 5
            "#,
        );

        let manager = ConfigManager::from_file(file.path()).await.unwrap();
        let config = manager.get_config().await;

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.pools.cartesia.default_units_limit, 5000);
        assert_eq!(config.pools.zyphra.error_threshold, 3);
        assert!(config.rotation.rotation_enabled);
    }

    #[tokio::test]
    async fn test_rejects_zero_error_threshold() {
        let file = write_config(
            r"
            [pools.zyphra]
            default_units_limit = 100
            error_threshold = 0
            ",
        );

        let err = ConfigManager::from_file(file.path())
            .await
            .err()
            .expect("zero threshold must be rejected");
        assert!(err.to_string().contains("error_threshold"));
    }

    #[tokio::test]
    async fn test_missing_file_is_config_error() {
        let err = ConfigManager::from_file("/nonexistent/vidgen.toml")
            .await
            .err()
            .expect("missing file must fail");
        assert!(matches!(err, PlatformError::Config { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("VIDGEN_DATABASE_URL", "sqlite::memory:"),
            ("VIDGEN_SERVER_PORT", "8088"),
            ("VIDGEN_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(ToString::to_string)).unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = AppConfig::default();
        let result = apply_env_overrides(&mut config, |key| {
            (key == "VIDGEN_SERVER_PORT").then(|| "not-a-port".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_default_tool_routing() {
        let config = AppConfig::default();
        assert_eq!(
            config.generation.provider_for_tool("voice"),
            Some(crate::key_pool::Provider::Zyphra)
        );
        assert_eq!(config.generation.provider_for_tool("unknown"), None);
        assert!(config.validate().is_ok());
    }
}
