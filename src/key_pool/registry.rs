//! # 密钥池注册表
//!
//! 每个服务商一个池实例，共享同一个存储。

use std::sync::Arc;

use super::pool::{KeyPool, ManagedPool};
use super::rotation_settings::SettingsStore;
use super::store::KeyStore;
use super::types::{Characters, Minutes, PoolStats, Provider, Requests};
use crate::config::PoolsConfig;
use crate::error::Result;

pub type ZyphraPool = KeyPool<Minutes>;
pub type CartesiaPool = KeyPool<Characters>;
pub type InworldPool = KeyPool<Characters>;
pub type FlowCookiePool = KeyPool<Requests>;
pub type BearerTokenPool = KeyPool<Requests>;

pub struct PoolRegistry {
    zyphra: Arc<ZyphraPool>,
    cartesia: Arc<CartesiaPool>,
    inworld: Arc<InworldPool>,
    flow_cookie: Arc<FlowCookiePool>,
    bearer_token: Arc<BearerTokenPool>,
}

impl PoolRegistry {
    #[must_use]
    pub fn new(
        store: &Arc<dyn KeyStore>,
        settings: Arc<dyn SettingsStore>,
        config: &PoolsConfig,
    ) -> Self {
        Self {
            zyphra: Arc::new(KeyPool::new(
                Provider::Zyphra,
                &config.zyphra,
                Arc::clone(store),
            )),
            cartesia: Arc::new(KeyPool::new(
                Provider::Cartesia,
                &config.cartesia,
                Arc::clone(store),
            )),
            inworld: Arc::new(KeyPool::new(
                Provider::Inworld,
                &config.inworld,
                Arc::clone(store),
            )),
            flow_cookie: Arc::new(KeyPool::new(
                Provider::FlowCookie,
                &config.flow_cookie,
                Arc::clone(store),
            )),
            bearer_token: Arc::new(
                KeyPool::new(
                    Provider::BearerToken,
                    &config.bearer_token,
                    Arc::clone(store),
                )
                .with_rotation_settings(settings),
            ),
        }
    }

    #[must_use]
    pub fn get(&self, provider: Provider) -> Arc<dyn ManagedPool> {
        match provider {
            Provider::Zyphra => self.zyphra.clone(),
            Provider::Cartesia => self.cartesia.clone(),
            Provider::Inworld => self.inworld.clone(),
            Provider::FlowCookie => self.flow_cookie.clone(),
            Provider::BearerToken => self.bearer_token.clone(),
        }
    }

    #[must_use]
    pub fn zyphra(&self) -> &ZyphraPool {
        &self.zyphra
    }

    #[must_use]
    pub fn cartesia(&self) -> &CartesiaPool {
        &self.cartesia
    }

    #[must_use]
    pub fn inworld(&self) -> &InworldPool {
        &self.inworld
    }

    #[must_use]
    pub fn flow_cookie(&self) -> &FlowCookiePool {
        &self.flow_cookie
    }

    #[must_use]
    pub fn bearer_token(&self) -> &BearerTokenPool {
        &self.bearer_token
    }

    /// 所有池的统计
    pub async fn stats_all(&self) -> Result<Vec<(Provider, PoolStats)>> {
        let mut all = Vec::with_capacity(Provider::ALL.len());
        for provider in Provider::ALL {
            all.push((provider, self.get(provider).pool_stats().await?));
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_pool::{MemoryKeyStore, MemorySettingsStore, Quantity, RotationSettings, UnitKind};

    fn registry() -> PoolRegistry {
        let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
        PoolRegistry::new(
            &store,
            Arc::new(MemorySettingsStore::new(RotationSettings::default())),
            &PoolsConfig::default(),
        )
    }

    #[test]
    fn test_pools_carry_their_units() {
        let registry = registry();
        assert_eq!(registry.get(Provider::Zyphra).unit(), UnitKind::Minutes);
        assert_eq!(registry.get(Provider::Inworld).unit(), UnitKind::Characters);
        assert_eq!(registry.get(Provider::BearerToken).unit(), UnitKind::Requests);
        assert!(!registry.bearer_token().policy().enforces_limits());
    }

    #[tokio::test]
    async fn test_pools_are_partitioned() {
        let registry = registry();
        registry.zyphra().add("shared-secret-value-1", None).await.unwrap();
        registry.cartesia().add("shared-secret-value-1", None).await.unwrap();

        assert!(registry.inworld().acquire(Quantity::new(1)).await.is_err());
        let stats = registry.stats_all().await.unwrap();
        let totals: Vec<usize> = stats.iter().map(|(_, stats)| stats.total).collect();
        assert_eq!(totals, vec![1, 1, 0, 0, 0]);
    }
}
