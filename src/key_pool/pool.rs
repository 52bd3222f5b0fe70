//! # 通用密钥池
//!
//! `KeyPool<U>` 按用量单位参数化，每个服务商一个实例；自动停用行为由 [`PoolPolicy`] 决定。

use async_trait::async_trait;
use chrono::Utc;
use std::marker::PhantomData;
use std::sync::Arc;

use super::lease::KeyLease;
use super::rotation_settings::{RotationPreference, SettingsStore};
use super::selector::RotationSelector;
use super::store::KeyStore;
use super::types::{
    BulkAddOutcome, BulkAddReport, KeyState, KeyView, NewProviderKey, PoolPolicy, PoolStats,
    Provider, Quantity, UnitKind, UsageUnit, mask_secret,
};
use crate::config::PoolPolicyConfig;
use crate::error::{KeyPoolError, PlatformError, Result};
use crate::{
    linfo, lwarn,
    logging::{LogComponent, LogStage},
};

const MAX_SECRET_LEN: usize = 8192;
const MAX_LABEL_LEN: usize = 128;

fn validate_secret(secret: &str) -> std::result::Result<&str, KeyPoolError> {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return Err(KeyPoolError::InvalidSecret {
            reason: "密钥不能为空".to_string(),
        });
    }
    if trimmed.len() > MAX_SECRET_LEN {
        return Err(KeyPoolError::InvalidSecret {
            reason: format!("密钥长度不能超过 {MAX_SECRET_LEN} 字节"),
        });
    }
    if trimmed.chars().any(char::is_control) {
        return Err(KeyPoolError::InvalidSecret {
            reason: "密钥不能包含控制字符".to_string(),
        });
    }
    Ok(trimmed)
}

pub struct KeyPool<U: UsageUnit> {
    policy: PoolPolicy,
    store: Arc<dyn KeyStore>,
    selector: RotationSelector,
    settings: Option<Arc<dyn SettingsStore>>,
    _unit: PhantomData<fn() -> U>,
}

impl<U: UsageUnit> KeyPool<U> {
    #[must_use]
    pub fn new(provider: Provider, config: &PoolPolicyConfig, store: Arc<dyn KeyStore>) -> Self {
        debug_assert_eq!(provider.unit(), U::KIND);
        let policy = PoolPolicy::for_provider(provider, config);
        Self {
            policy,
            selector: RotationSelector::new(Arc::clone(&store), policy),
            store,
            settings: None,
            _unit: PhantomData,
        }
    }

    /// 关联轮换设置，用于 Bearer Token 池的选择偏好
    #[must_use]
    pub fn with_rotation_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub const fn provider(&self) -> Provider {
        self.policy.provider
    }

    #[must_use]
    pub const fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    fn not_found(&self, key_id: i32) -> PlatformError {
        KeyPoolError::KeyNotFound {
            provider: self.policy.provider,
            key_id,
        }
        .into()
    }

    fn view(&self, key: &super::types::ProviderKey) -> KeyView {
        KeyView::new(key, &self.policy)
    }

    pub async fn add(&self, secret: &str, label: Option<&str>) -> Result<KeyView> {
        self.add_with_limit(secret, label, None).await
    }

    /// 新增密钥，`units_limit` 为空时使用池的默认额度
    pub async fn add_with_limit(
        &self,
        secret: &str,
        label: Option<&str>,
        units_limit: Option<Quantity<U>>,
    ) -> Result<KeyView> {
        let secret = validate_secret(secret)?;
        let label = label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map_or_else(|| mask_secret(secret), |label| label.chars().take(MAX_LABEL_LEN).collect());

        let key = self
            .store
            .insert(NewProviderKey {
                provider: self.policy.provider,
                label,
                secret: secret.to_string(),
                units_limit: units_limit.map_or(self.policy.default_units_limit, Quantity::get),
            })
            .await?;

        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::KeyPool,
            "key_added",
            &format!("新增密钥 {}", key.masked_secret()),
            provider = %self.policy.provider,
            key_id = key.id
        );
        Ok(self.view(&key))
    }

    /// 批量新增，逐条处理并返回每条的结果
    pub async fn bulk_add(&self, secrets: &[String]) -> Result<BulkAddReport> {
        let mut report = BulkAddReport::default();

        for (index, raw) in secrets.iter().enumerate() {
            let masked = mask_secret(raw);
            let outcome = match self.add(raw, None).await {
                Ok(view) => BulkAddOutcome::Added { key_id: view.id },
                Err(PlatformError::KeyPool(KeyPoolError::DuplicateKey { .. })) => {
                    BulkAddOutcome::Duplicate
                }
                Err(PlatformError::KeyPool(err @ KeyPoolError::InvalidSecret { .. })) => {
                    BulkAddOutcome::Invalid {
                        reason: err.to_string(),
                    }
                }
                Err(err) => {
                    lwarn!(
                        "system",
                        LogStage::Admin,
                        LogComponent::KeyPool,
                        "bulk_add_item_failed",
                        &format!("批量导入第 {index} 条失败: {err}"),
                        provider = %self.policy.provider
                    );
                    BulkAddOutcome::Invalid {
                        reason: err.public_message(),
                    }
                }
            };
            report.push(index, masked, outcome);
        }

        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::KeyPool,
            "bulk_add",
            &format!(
                "批量导入完成: 新增 {}, 重复 {}, 无效 {}",
                report.added, report.duplicates, report.invalid
            ),
            provider = %self.policy.provider
        );
        Ok(report)
    }

    pub async fn list(&self) -> Result<Vec<KeyView>> {
        let keys = self.store.list(self.policy.provider).await?;
        Ok(keys.iter().map(|key| self.view(key)).collect())
    }

    pub async fn stats(&self) -> Result<PoolStats> {
        let keys = self.store.list(self.policy.provider).await?;
        let mut stats = PoolStats {
            total: keys.len(),
            ..PoolStats::default()
        };

        for key in &keys {
            match self.policy.key_state(key) {
                KeyState::Usable => stats.usable += 1,
                KeyState::Exhausted { .. } => stats.exhausted += 1,
                KeyState::Disabled => stats.disabled += 1,
            }
            stats.units_used = stats.units_used.saturating_add(key.units_used);
            stats.units_capacity = stats.units_capacity.saturating_add(key.units_limit);
            stats.request_count = stats.request_count.saturating_add(key.request_count);
        }
        Ok(stats)
    }

    pub async fn toggle_active(&self, key_id: i32, active: bool) -> Result<KeyView> {
        let key = self
            .store
            .set_active(self.policy.provider, key_id, active)
            .await?
            .ok_or_else(|| self.not_found(key_id))?;

        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::KeyPool,
            "key_toggled",
            &format!("密钥 {key_id} 启用状态: {active}"),
            provider = %self.policy.provider,
            key_id = key_id
        );
        Ok(self.view(&key))
    }

    /// 清零用量与错误，保留启用状态
    pub async fn reset(&self, key_id: i32) -> Result<KeyView> {
        let key = self
            .store
            .reset_counters(self.policy.provider, key_id)
            .await?
            .ok_or_else(|| self.not_found(key_id))?;

        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::KeyPool,
            "key_reset",
            &format!("密钥 {key_id} 用量已重置"),
            provider = %self.policy.provider,
            key_id = key_id
        );
        Ok(self.view(&key))
    }

    pub async fn set_units_limit(&self, key_id: i32, units_limit: Quantity<U>) -> Result<KeyView> {
        let key = self
            .store
            .set_units_limit(self.policy.provider, key_id, units_limit.get())
            .await?
            .ok_or_else(|| self.not_found(key_id))?;
        Ok(self.view(&key))
    }

    pub async fn remove(&self, key_id: i32) -> Result<()> {
        if !self.store.remove(self.policy.provider, key_id).await? {
            return Err(self.not_found(key_id));
        }
        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::KeyPool,
            "key_removed",
            &format!("密钥 {key_id} 已删除"),
            provider = %self.policy.provider,
            key_id = key_id
        );
        Ok(())
    }

    pub async fn remove_all(&self) -> Result<u64> {
        let removed = self.store.remove_all(self.policy.provider).await?;
        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::KeyPool,
            "keys_removed",
            &format!("已清空 {removed} 个密钥"),
            provider = %self.policy.provider
        );
        Ok(removed)
    }

    async fn preference(&self) -> Result<RotationPreference> {
        match (&self.settings, self.policy.provider) {
            (Some(settings), Provider::BearerToken) => Ok(settings.load().await?.preference()),
            _ => Ok(RotationPreference::Balanced),
        }
    }

    /// 选择密钥并预占用量
    pub async fn acquire(&self, units: Quantity<U>) -> Result<KeyLease> {
        self.acquire_excluding(units, &[]).await
    }

    /// 选择密钥时跳过 `exclude` 中的密钥（同一条目已失败过的）
    pub async fn acquire_excluding(&self, units: Quantity<U>, exclude: &[i32]) -> Result<KeyLease> {
        let preference = self.preference().await?;
        self.selector
            .acquire_excluding(units.get(), preference, exclude)
            .await
    }

    /// 直接记录一次成功使用（不经过租约）
    pub async fn record_success(&self, key_id: i32, units: Quantity<U>) -> Result<()> {
        let provider = self.policy.provider;
        let committed = self
            .store
            .try_reserve(provider, key_id, units.get(), self.policy.enforces_limits(), None)
            .await?;

        if !committed {
            return match self.store.get(provider, key_id).await? {
                None => Err(self.not_found(key_id)),
                Some(_) => Err(KeyPoolError::CapacityExceeded {
                    key_id,
                    units: units.get(),
                }
                .into()),
            };
        }
        self.store.mark_used(provider, key_id, Utc::now()).await
    }

    /// 记录一次失败，错误数达到阈值后密钥自动不可用
    pub async fn record_failure(&self, key_id: i32, message: &str) -> Result<KeyView> {
        let key = self
            .store
            .record_error(self.policy.provider, key_id, message)
            .await?
            .ok_or_else(|| self.not_found(key_id))?;
        Ok(self.view(&key))
    }
}

/// 按服务商擦除单位类型后的统一接口，供管理端和生成任务使用
#[async_trait]
pub trait ManagedPool: Send + Sync {
    fn provider(&self) -> Provider;

    fn unit(&self) -> UnitKind;

    async fn add_key(
        &self,
        secret: &str,
        label: Option<&str>,
        units_limit: Option<u64>,
    ) -> Result<KeyView>;

    async fn bulk_add_keys(&self, secrets: &[String]) -> Result<BulkAddReport>;

    async fn list_keys(&self) -> Result<Vec<KeyView>>;

    async fn pool_stats(&self) -> Result<PoolStats>;

    async fn toggle_key(&self, key_id: i32, active: bool) -> Result<KeyView>;

    async fn reset_key(&self, key_id: i32) -> Result<KeyView>;

    async fn set_key_limit(&self, key_id: i32, units_limit: u64) -> Result<KeyView>;

    async fn remove_key(&self, key_id: i32) -> Result<()>;

    async fn remove_all_keys(&self) -> Result<u64>;

    async fn acquire_units(&self, units: u64, exclude: &[i32]) -> Result<KeyLease>;
}

#[async_trait]
impl<U: UsageUnit> ManagedPool for KeyPool<U> {
    fn provider(&self) -> Provider {
        self.policy.provider
    }

    fn unit(&self) -> UnitKind {
        U::KIND
    }

    async fn add_key(
        &self,
        secret: &str,
        label: Option<&str>,
        units_limit: Option<u64>,
    ) -> Result<KeyView> {
        self.add_with_limit(secret, label, units_limit.map(Quantity::new))
            .await
    }

    async fn bulk_add_keys(&self, secrets: &[String]) -> Result<BulkAddReport> {
        self.bulk_add(secrets).await
    }

    async fn list_keys(&self) -> Result<Vec<KeyView>> {
        self.list().await
    }

    async fn pool_stats(&self) -> Result<PoolStats> {
        self.stats().await
    }

    async fn toggle_key(&self, key_id: i32, active: bool) -> Result<KeyView> {
        self.toggle_active(key_id, active).await
    }

    async fn reset_key(&self, key_id: i32) -> Result<KeyView> {
        self.reset(key_id).await
    }

    async fn set_key_limit(&self, key_id: i32, units_limit: u64) -> Result<KeyView> {
        self.set_units_limit(key_id, Quantity::new(units_limit)).await
    }

    async fn remove_key(&self, key_id: i32) -> Result<()> {
        self.remove(key_id).await
    }

    async fn remove_all_keys(&self) -> Result<u64> {
        self.remove_all().await
    }

    async fn acquire_units(&self, units: u64, exclude: &[i32]) -> Result<KeyLease> {
        self.acquire_excluding(Quantity::new(units), exclude).await
    }
}
