//! # 密钥存储接口
//!
//! 所有写操作都限定在 `(provider, key_id)` 上，避免跨池误改。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::{NewProviderKey, Provider, ProviderKey};
use crate::error::Result;

#[async_trait]
pub trait KeyStore: Send + Sync {
    /// 列出池内全部密钥，按 id 升序
    async fn list(&self, provider: Provider) -> Result<Vec<ProviderKey>>;

    async fn get(&self, provider: Provider, key_id: i32) -> Result<Option<ProviderKey>>;

    /// 新增密钥；同池内指纹重复时返回 `KeyPoolError::DuplicateKey`
    async fn insert(&self, new_key: NewProviderKey) -> Result<ProviderKey>;

    /// 条件预占：满足全部条件时原子增加用量
    ///
    /// 条件为密钥启用；`enforce_limit` 时 `units_used + units <= units_limit`；
    /// `error_threshold` 为 `Some` 时 `error_count < error_threshold`。
    /// 返回 `false` 表示条件不满足，未做任何修改。
    async fn try_reserve(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        enforce_limit: bool,
        error_threshold: Option<u32>,
    ) -> Result<bool>;

    /// 结算一次失败的使用：归还预占用量（最低减到 0）、更新 `last_used_at`
    /// 与 `request_count`、累加错误计数并记录最近错误，在一次更新内完成
    async fn settle_failure(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        at: DateTime<Utc>,
        message: &str,
    ) -> Result<Option<ProviderKey>>;

    /// 记录一次使用：更新 `last_used_at` 并累加 `request_count`
    async fn mark_used(&self, provider: Provider, key_id: i32, at: DateTime<Utc>) -> Result<()>;

    /// 累加错误计数并记录最近错误，返回更新后的密钥
    async fn record_error(
        &self,
        provider: Provider,
        key_id: i32,
        message: &str,
    ) -> Result<Option<ProviderKey>>;

    async fn set_active(
        &self,
        provider: Provider,
        key_id: i32,
        active: bool,
    ) -> Result<Option<ProviderKey>>;

    async fn set_units_limit(
        &self,
        provider: Provider,
        key_id: i32,
        units_limit: u64,
    ) -> Result<Option<ProviderKey>>;

    /// 清零用量、错误计数与最近错误，保留 `is_active`
    async fn reset_counters(&self, provider: Provider, key_id: i32)
    -> Result<Option<ProviderKey>>;

    async fn remove(&self, provider: Provider, key_id: i32) -> Result<bool>;

    async fn remove_all(&self, provider: Provider) -> Result<u64>;

    /// 清零池内所有密钥的 `request_count`
    async fn reset_request_counts(&self, provider: Provider) -> Result<u64>;
}
