use thiserror::Error;

use crate::key_pool::Provider;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyPoolError {
    /// 池中没有可用且容量足够的密钥
    #[error("{} service is temporarily unavailable. Please try again later.", .provider.display_name())]
    PoolExhausted { provider: Provider },

    #[error("密钥已存在于 {provider} 池中: {masked_secret}")]
    DuplicateKey {
        provider: Provider,
        masked_secret: String,
    },

    #[error("{provider} 池中找不到ID为 {key_id} 的密钥")]
    KeyNotFound { provider: Provider, key_id: i32 },

    /// 条件更新被拒绝：提交后会超出额度或密钥已停用
    #[error("密钥 {key_id} 剩余额度不足，无法记录 {units} 单位用量")]
    CapacityExceeded { key_id: i32, units: u64 },

    #[error("无效的密钥内容: {reason}")]
    InvalidSecret { reason: String },

    #[error("未知的服务商: {0}")]
    UnknownProvider(String),
}

impl KeyPoolError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::PoolExhausted { .. } => "POOL_EXHAUSTED",
            Self::DuplicateKey { .. } => "DUPLICATE_KEY",
            Self::KeyNotFound { .. } => "KEY_NOT_FOUND",
            Self::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            Self::InvalidSecret { .. } => "INVALID_SECRET",
            Self::UnknownProvider(_) => "UNKNOWN_PROVIDER",
        }
    }
}
