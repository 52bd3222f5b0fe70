//! # 密钥租约
//!
//! 选择器预占成功后返回的租约。`complete` 记录使用，`fail` 归还预占并记录错误；
//! 未调用任何一个就被丢弃时，预占的用量保留。

use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use super::store::KeyStore;
use super::types::{KeyView, PoolPolicy, Provider, ProviderKey, mask_secret};
use crate::error::Result;
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

pub struct KeyLease {
    store: Arc<dyn KeyStore>,
    policy: PoolPolicy,
    key_id: i32,
    label: String,
    secret: String,
    units: u64,
    settled: bool,
}

impl KeyLease {
    pub(crate) fn new(
        store: Arc<dyn KeyStore>,
        policy: PoolPolicy,
        key: &ProviderKey,
        units: u64,
    ) -> Self {
        Self {
            store,
            policy,
            key_id: key.id,
            label: key.label.clone(),
            secret: key.secret.clone(),
            units,
            settled: false,
        }
    }

    #[must_use]
    pub const fn key_id(&self) -> i32 {
        self.key_id
    }

    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.policy.provider
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 调用服务商时使用的凭据
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    #[must_use]
    pub const fn units(&self) -> u64 {
        self.units
    }

    /// 调用成功：预占转为正式用量，并记录使用时间
    pub async fn complete(mut self) -> Result<()> {
        self.settled = true;
        self.store
            .mark_used(self.policy.provider, self.key_id, Utc::now())
            .await
    }

    /// 调用失败：归还预占用量并累加错误计数
    ///
    /// 返回更新后的视图；密钥已被删除时返回 `None`。
    pub async fn fail(mut self, message: &str) -> Result<Option<KeyView>> {
        self.settled = true;
        let provider = self.policy.provider;

        let updated = self
            .store
            .settle_failure(provider, self.key_id, self.units, Utc::now(), message)
            .await?;

        if let Some(key) = &updated {
            if !self.policy.is_usable(key) {
                lwarn!(
                    "system",
                    LogStage::Usage,
                    LogComponent::UsageRecorder,
                    "key_auto_disabled",
                    &format!("密钥 {} 达到错误阈值，暂停使用", key.masked_secret()),
                    provider = %provider,
                    key_id = key.id,
                    error_count = key.error_count
                );
            }
        }

        Ok(updated.map(|key| KeyView::new(&key, &self.policy)))
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        if !self.settled {
            ldebug!(
                "system",
                LogStage::Usage,
                LogComponent::UsageRecorder,
                "lease_abandoned",
                "租约未提交结果即被丢弃，预占用量保留",
                provider = %self.policy.provider,
                key_id = self.key_id,
                units = self.units
            );
        }
    }
}

impl fmt::Debug for KeyLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyLease")
            .field("provider", &self.policy.provider)
            .field("key_id", &self.key_id)
            .field("label", &self.label)
            .field("secret", &mask_secret(&self.secret))
            .field("units", &self.units)
            .field("settled", &self.settled)
            .finish()
    }
}
