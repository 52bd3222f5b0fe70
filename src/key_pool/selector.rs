//! # 密钥轮换选择器
//!
//! 选择本身是纯函数：对池的快照排序得到候选列表；随后逐个尝试条件预占。
//! 不保存任何轮换游标，并发安全完全依赖存储层的条件更新。

use std::cmp::Ordering;
use std::sync::Arc;

use super::lease::KeyLease;
use super::rotation_settings::RotationPreference;
use super::store::KeyStore;
use super::types::{PoolPolicy, ProviderKey};
use crate::error::{KeyPoolError, Result};
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

/// 重新读取快照的最大次数
pub const MAX_RESERVE_ATTEMPTS: usize = 8;

/// 用量占比比较：`a.used / a.limit` 对 `b.used / b.limit`，交叉相乘避免浮点误差
fn compare_relative_usage(a: &ProviderKey, b: &ProviderKey, policy: &PoolPolicy) -> Ordering {
    if !policy.enforces_limits() {
        return a.units_used.cmp(&b.units_used);
    }
    let lhs = u128::from(a.units_used) * u128::from(b.units_limit);
    let rhs = u128::from(b.units_used) * u128::from(a.units_limit);
    lhs.cmp(&rhs)
}

/// 对池快照排序，返回可承接 `units` 的候选密钥
#[must_use]
pub fn rank_candidates<'a>(
    keys: &'a [ProviderKey],
    policy: &PoolPolicy,
    units: u64,
    preference: RotationPreference,
) -> Vec<&'a ProviderKey> {
    let mut candidates: Vec<&ProviderKey> = keys
        .iter()
        .filter(|key| key.provider == policy.provider)
        .filter(|key| policy.is_usable(key) && policy.has_capacity(key, units))
        .collect();

    match preference {
        RotationPreference::Sticky => candidates.sort_by_key(|key| key.id),
        RotationPreference::Balanced => candidates.sort_by(|a, b| balanced_order(a, b, policy)),
        RotationPreference::Rotate { soft_request_cap } => candidates.sort_by(|a, b| {
            let a_capped = a.request_count >= soft_request_cap;
            let b_capped = b.request_count >= soft_request_cap;
            a_capped
                .cmp(&b_capped)
                .then_with(|| balanced_order(a, b, policy))
        }),
    }
    candidates
}

fn balanced_order(a: &ProviderKey, b: &ProviderKey, policy: &PoolPolicy) -> Ordering {
    compare_relative_usage(a, b, policy)
        // None 排在最前：从未使用过的密钥优先
        .then_with(|| a.last_used_at.cmp(&b.last_used_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// 选择并预占一把密钥
pub struct RotationSelector {
    store: Arc<dyn KeyStore>,
    policy: PoolPolicy,
}

impl RotationSelector {
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>, policy: PoolPolicy) -> Self {
        Self { store, policy }
    }

    /// 选择候选并原子预占 `units`
    ///
    /// 同一快照内依次尝试所有候选；全部失败时重新读取快照，最多
    /// [`MAX_RESERVE_ATTEMPTS`] 次，之后返回 `PoolExhausted`。
    pub async fn acquire(&self, units: u64, preference: RotationPreference) -> Result<KeyLease> {
        self.acquire_excluding(units, preference, &[]).await
    }

    /// 同 [`Self::acquire`]，跳过 `exclude` 中的密钥
    pub async fn acquire_excluding(
        &self,
        units: u64,
        preference: RotationPreference,
        exclude: &[i32],
    ) -> Result<KeyLease> {
        let provider = self.policy.provider;

        for attempt in 1..=MAX_RESERVE_ATTEMPTS {
            let snapshot = self.store.list(provider).await?;
            let candidates: Vec<&ProviderKey> =
                rank_candidates(&snapshot, &self.policy, units, preference)
                    .into_iter()
                    .filter(|key| !exclude.contains(&key.id))
                    .collect();
            if candidates.is_empty() {
                break;
            }

            for key in candidates {
                let reserved = self
                    .store
                    .try_reserve(
                        provider,
                        key.id,
                        units,
                        self.policy.enforces_limits(),
                        self.policy.error_threshold(),
                    )
                    .await?;
                if reserved {
                    ldebug!(
                        "system",
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "key_reserved",
                        &format!("预占密钥 {} ({units} 单位)", key.masked_secret()),
                        provider = %provider,
                        key_id = key.id,
                        attempt = attempt
                    );
                    return Ok(KeyLease::new(
                        Arc::clone(&self.store),
                        self.policy,
                        key,
                        units,
                    ));
                }
            }

            ldebug!(
                "system",
                LogStage::Scheduling,
                LogComponent::Selector,
                "reserve_race_lost",
                "候选密钥均已被并发占用，重新读取快照",
                provider = %provider,
                attempt = attempt
            );
        }

        lwarn!(
            "system",
            LogStage::Scheduling,
            LogComponent::Selector,
            "pool_exhausted",
            &format!("{provider} 池没有可用密钥"),
            provider = %provider,
            units = units
        );
        Err(KeyPoolError::PoolExhausted { provider }.into())
    }
}
