//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::key_pool::{Provider, RotationSettings};
use crate::plans::tools;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 管理/生成 HTTP 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: super::DatabaseConfig,
    /// 各服务商密钥池策略
    #[serde(default)]
    pub pools: PoolsConfig,
    /// 生成任务配置
    #[serde(default)]
    pub generation: GenerationConfig,
    /// 首次启动时写入的轮换设置
    #[serde(default)]
    pub rotation: RotationSettings,
    /// 日志级别（命令行参数优先）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    /// 普通请求超时（秒），SSE 流不受此限制
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9090,
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            request_timeout: 30,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// 单个密钥池的策略配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolPolicyConfig {
    /// 新增密钥的默认额度
    pub default_units_limit: u64,
    /// 连续错误达到该值后密钥不可用
    pub error_threshold: u32,
}

/// 所有密钥池的策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    /// 分钟
    pub zyphra: PoolPolicyConfig,
    /// 字符
    pub cartesia: PoolPolicyConfig,
    /// 字符
    pub inworld: PoolPolicyConfig,
    /// 请求
    pub flow_cookie: PoolPolicyConfig,
    /// 请求，不做自动停用
    pub bearer_token: PoolPolicyConfig,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            zyphra: PoolPolicyConfig {
                default_units_limit: 100,
                error_threshold: 3,
            },
            cartesia: PoolPolicyConfig {
                default_units_limit: 20_000,
                error_threshold: 3,
            },
            inworld: PoolPolicyConfig {
                default_units_limit: 50_000,
                error_threshold: 3,
            },
            flow_cookie: PoolPolicyConfig {
                default_units_limit: 100,
                error_threshold: 3,
            },
            bearer_token: PoolPolicyConfig {
                default_units_limit: 1_000_000,
                error_threshold: 3,
            },
        }
    }
}

impl PoolsConfig {
    #[must_use]
    pub const fn for_provider(&self, provider: Provider) -> &PoolPolicyConfig {
        match provider {
            Provider::Zyphra => &self.zyphra,
            Provider::Cartesia => &self.cartesia,
            Provider::Inworld => &self.inworld,
            Provider::FlowCookie => &self.flow_cookie,
            Provider::BearerToken => &self.bearer_token,
        }
    }
}

/// 生成任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// 外部生成服务地址
    pub endpoint: String,
    /// 单次服务商调用超时（秒）
    pub provider_timeout_seconds: u64,
    /// 单个条目最多尝试的密钥数
    pub max_attempts_per_item: u32,
    /// 工具到密钥池的路由
    pub tool_providers: HashMap<String, Provider>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let tool_providers = [
            (tools::VIDEO, Provider::FlowCookie),
            (tools::BULK, Provider::BearerToken),
            (tools::VOICE, Provider::Zyphra),
            (tools::NARRATION, Provider::Cartesia),
            (tools::CHARACTER, Provider::Inworld),
            (tools::IMAGE, Provider::FlowCookie),
            (tools::SCRIPT, Provider::BearerToken),
        ]
        .into_iter()
        .map(|(tool, provider)| (tool.to_string(), provider))
        .collect();

        Self {
            endpoint: "http://127.0.0.1:8081/v1/generate".to_string(),
            provider_timeout_seconds: 120,
            max_attempts_per_item: 2,
            tool_providers,
        }
    }
}

impl GenerationConfig {
    /// 查找工具对应的密钥池
    #[must_use]
    pub fn provider_for_tool(&self, tool: &str) -> Option<Provider> {
        self.tool_providers.get(tool).copied()
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be greater than 0".to_string());
        }
        if self.server.request_timeout == 0 {
            return Err("server.request_timeout must be greater than 0".to_string());
        }
        if self.database.url.trim().is_empty() {
            return Err("database.url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("database.max_connections must be greater than 0".to_string());
        }

        for provider in Provider::ALL {
            let policy = self.pools.for_provider(provider);
            if policy.default_units_limit == 0 {
                return Err(format!(
                    "pools.{provider}.default_units_limit must be greater than 0"
                ));
            }
            if policy.error_threshold == 0 {
                return Err(format!(
                    "pools.{provider}.error_threshold must be greater than 0"
                ));
            }
        }

        if self.generation.provider_timeout_seconds == 0 {
            return Err("generation.provider_timeout_seconds must be greater than 0".to_string());
        }
        if self.generation.max_attempts_per_item == 0 {
            return Err("generation.max_attempts_per_item must be greater than 0".to_string());
        }

        self.rotation.validate().map_err(|e| e.public_message())
    }
}
