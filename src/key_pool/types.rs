//! # 密钥池类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::config::PoolPolicyConfig;
use crate::error::KeyPoolError;

/// 密钥池所属服务商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Zyphra,
    Cartesia,
    Inworld,
    FlowCookie,
    BearerToken,
}

impl Provider {
    pub const ALL: [Self; 5] = [
        Self::Zyphra,
        Self::Cartesia,
        Self::Inworld,
        Self::FlowCookie,
        Self::BearerToken,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Zyphra => "zyphra",
            Self::Cartesia => "cartesia",
            Self::Inworld => "inworld",
            Self::FlowCookie => "flow_cookie",
            Self::BearerToken => "bearer_token",
        }
    }

    /// 面向用户的服务名
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Zyphra => "Zyphra",
            Self::Cartesia => "Cartesia",
            Self::Inworld => "Inworld",
            Self::FlowCookie => "Video",
            Self::BearerToken => "Bulk video",
        }
    }

    /// 用量单位
    #[must_use]
    pub const fn unit(&self) -> UnitKind {
        match self {
            Self::Zyphra => UnitKind::Minutes,
            Self::Cartesia | Self::Inworld => UnitKind::Characters,
            Self::FlowCookie | Self::BearerToken => UnitKind::Requests,
        }
    }

    /// 是否按额度和错误阈值自动停用
    #[must_use]
    pub const fn auto_disables(&self) -> bool {
        !matches!(self, Self::BearerToken)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = KeyPoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == normalized)
            .ok_or_else(|| KeyPoolError::UnknownProvider(s.to_string()))
    }
}

/// 用量单位种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Minutes,
    Characters,
    Requests,
}

impl UnitKind {
    /// 估算一次生成需要预占的用量
    ///
    /// 分钟按约 900 字符/分钟的朗读速度向上取整。
    #[must_use]
    pub fn estimate_for_prompt(&self, prompt: &str) -> u64 {
        let chars = u64::try_from(prompt.chars().count()).unwrap_or(u64::MAX).max(1);
        match self {
            Self::Characters => chars,
            Self::Minutes => chars.div_ceil(CHARACTERS_PER_MINUTE),
            Self::Requests => 1,
        }
    }
}

const CHARACTERS_PER_MINUTE: u64 = 900;

/// 类型层面的用量单位
pub trait UsageUnit: Send + Sync + 'static {
    const KIND: UnitKind;
}

#[derive(Debug, Clone, Copy)]
pub struct Minutes;
#[derive(Debug, Clone, Copy)]
pub struct Characters;
#[derive(Debug, Clone, Copy)]
pub struct Requests;

impl UsageUnit for Minutes {
    const KIND: UnitKind = UnitKind::Minutes;
}
impl UsageUnit for Characters {
    const KIND: UnitKind = UnitKind::Characters;
}
impl UsageUnit for Requests {
    const KIND: UnitKind = UnitKind::Requests;
}

/// 带单位的用量，防止不同池之间混用数值
pub struct Quantity<U> {
    value: u64,
    _unit: PhantomData<fn() -> U>,
}

impl<U: UsageUnit> Quantity<U> {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self {
            value,
            _unit: PhantomData,
        }
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.value
    }
}

impl<U> Clone for Quantity<U> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<U> Copy for Quantity<U> {}

impl<U> PartialEq for Quantity<U> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<U> Eq for Quantity<U> {}

impl<U: UsageUnit> fmt::Debug for Quantity<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Quantity({} {:?})", self.value, U::KIND)
    }
}

/// 自动停用策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoDisable {
    /// 额度用尽或错误数达到阈值后不可用
    OnThreshold { error_threshold: u32 },
    /// 仅 `is_active` 决定可用性
    Never,
}

/// 密钥池策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolPolicy {
    pub provider: Provider,
    pub unit: UnitKind,
    pub default_units_limit: u64,
    pub auto_disable: AutoDisable,
}

impl PoolPolicy {
    #[must_use]
    pub const fn for_provider(provider: Provider, config: &PoolPolicyConfig) -> Self {
        let auto_disable = if provider.auto_disables() {
            AutoDisable::OnThreshold {
                error_threshold: config.error_threshold,
            }
        } else {
            AutoDisable::Never
        };
        Self {
            provider,
            unit: provider.unit(),
            default_units_limit: config.default_units_limit,
            auto_disable,
        }
    }

    /// 是否在预占时校验额度
    #[must_use]
    pub const fn enforces_limits(&self) -> bool {
        matches!(self.auto_disable, AutoDisable::OnThreshold { .. })
    }

    /// 预占时需要满足的错误数上限，不自动停用的池返回 `None`
    #[must_use]
    pub const fn error_threshold(&self) -> Option<u32> {
        match self.auto_disable {
            AutoDisable::OnThreshold { error_threshold } => Some(error_threshold),
            AutoDisable::Never => None,
        }
    }

    /// 推导密钥状态
    #[must_use]
    pub const fn key_state(&self, key: &ProviderKey) -> KeyState {
        if !key.is_active {
            return KeyState::Disabled;
        }
        match self.auto_disable {
            AutoDisable::Never => KeyState::Usable,
            AutoDisable::OnThreshold { error_threshold } => {
                if key.units_used >= key.units_limit {
                    KeyState::Exhausted {
                        cause: ExhaustionCause::UsageLimit,
                    }
                } else if key.error_count >= error_threshold {
                    KeyState::Exhausted {
                        cause: ExhaustionCause::ErrorThreshold,
                    }
                } else {
                    KeyState::Usable
                }
            }
        }
    }

    #[must_use]
    pub const fn is_usable(&self, key: &ProviderKey) -> bool {
        matches!(self.key_state(key), KeyState::Usable)
    }

    /// 密钥是否可以承接 `units` 的用量
    #[must_use]
    pub const fn has_capacity(&self, key: &ProviderKey, units: u64) -> bool {
        !self.enforces_limits() || key.remaining_units() >= units
    }
}

/// 不可用原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionCause {
    UsageLimit,
    ErrorThreshold,
}

/// 管理视图中的密钥状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum KeyState {
    Usable,
    Exhausted { cause: ExhaustionCause },
    Disabled,
}

/// 服务商密钥
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderKey {
    pub id: i32,
    pub provider: Provider,
    pub label: String,
    pub secret: String,
    pub secret_fingerprint: String,
    pub is_active: bool,
    pub units_used: u64,
    pub units_limit: u64,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub created_at: DateTime<Utc>,
}

impl ProviderKey {
    #[must_use]
    pub const fn remaining_units(&self) -> u64 {
        self.units_limit.saturating_sub(self.units_used)
    }

    #[must_use]
    pub fn masked_secret(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl fmt::Debug for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderKey")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("label", &self.label)
            .field("secret", &self.masked_secret())
            .field("is_active", &self.is_active)
            .field("units_used", &self.units_used)
            .field("units_limit", &self.units_limit)
            .field("error_count", &self.error_count)
            .field("request_count", &self.request_count)
            .finish_non_exhaustive()
    }
}

/// 新增密钥参数
#[derive(Clone)]
pub struct NewProviderKey {
    pub provider: Provider,
    pub label: String,
    pub secret: String,
    pub units_limit: u64,
}

impl NewProviderKey {
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.secret)
    }
}

/// 管理端展示的密钥视图，不包含明文
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyView {
    pub id: i32,
    pub provider: Provider,
    pub label: String,
    pub masked_secret: String,
    pub is_active: bool,
    pub unit: UnitKind,
    pub units_used: u64,
    pub units_limit: u64,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub request_count: u64,
    pub state: KeyState,
    pub created_at: DateTime<Utc>,
}

impl KeyView {
    #[must_use]
    pub fn new(key: &ProviderKey, policy: &PoolPolicy) -> Self {
        Self {
            id: key.id,
            provider: key.provider,
            label: key.label.clone(),
            masked_secret: key.masked_secret(),
            is_active: key.is_active,
            unit: policy.unit,
            units_used: key.units_used,
            units_limit: key.units_limit,
            error_count: key.error_count,
            last_error: key.last_error.clone(),
            last_used_at: key.last_used_at,
            request_count: key.request_count,
            state: policy.key_state(key),
            created_at: key.created_at,
        }
    }
}

/// 池统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub usable: usize,
    pub exhausted: usize,
    pub disabled: usize,
    pub units_used: u64,
    pub units_capacity: u64,
    pub request_count: u64,
}

/// 批量导入中单条的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkAddOutcome {
    Added { key_id: i32 },
    Duplicate,
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkAddItem {
    pub index: usize,
    pub masked_secret: String,
    #[serde(flatten)]
    pub outcome: BulkAddOutcome,
}

/// 批量导入报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkAddReport {
    pub added: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub items: Vec<BulkAddItem>,
}

impl BulkAddReport {
    pub fn push(&mut self, index: usize, masked_secret: String, outcome: BulkAddOutcome) {
        match outcome {
            BulkAddOutcome::Added { .. } => self.added += 1,
            BulkAddOutcome::Duplicate => self.duplicates += 1,
            BulkAddOutcome::Invalid { .. } => self.invalid += 1,
        }
        self.items.push(BulkAddItem {
            index,
            masked_secret,
            outcome,
        });
    }
}

/// 密钥指纹：去除首尾空白后的 SHA-256 十六进制
#[must_use]
pub fn fingerprint(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.trim().as_bytes()))
}

/// 密钥脱敏显示
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.trim().chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}
