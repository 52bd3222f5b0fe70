//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例，便于在测试中注入替身实现。

use std::sync::Arc;
use std::time::Duration;

use super::resources::AppResources;
use crate::config::AppConfig;
use crate::entitlement::{DbUserStore, UserStore};
use crate::error::Result;
use crate::generation::{BulkGenerationService, GenerationProvider, HttpGenerationProvider};
use crate::key_pool::{DbKeyStore, DbSettingsStore, KeyStore, PoolRegistry, SettingsStore};
use sea_orm::DatabaseConnection;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub users: Arc<dyn UserStore>,
    pub keys: Arc<dyn KeyStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub pools: Arc<PoolRegistry>,
    pub generation: Arc<BulkGenerationService>,
}

impl AppContext {
    /// 使用 HTTP 生成服务构建上下文
    pub fn from_resources(resources: &AppResources) -> Result<Self> {
        let config = resources.config();
        let provider = HttpGenerationProvider::new(
            config.generation.endpoint.clone(),
            Duration::from_secs(config.generation.provider_timeout_seconds),
        )?;
        Ok(Self::with_provider(resources, Arc::new(provider)))
    }

    /// 使用指定的生成服务构建上下文，存储全部落库
    #[must_use]
    pub fn with_provider(
        resources: &AppResources,
        provider: Arc<dyn GenerationProvider>,
    ) -> Self {
        let config = resources.config();
        let db = resources.database();

        let users: Arc<dyn UserStore> = Arc::new(DbUserStore::new(Arc::clone(&db)));
        let keys: Arc<dyn KeyStore> = Arc::new(DbKeyStore::new(Arc::clone(&db)));
        let settings: Arc<dyn SettingsStore> =
            Arc::new(DbSettingsStore::new(Arc::clone(&db), config.rotation));
        let pools = Arc::new(PoolRegistry::new(&keys, Arc::clone(&settings), &config.pools));
        let generation = Arc::new(BulkGenerationService::new(
            Arc::clone(&users),
            Arc::clone(&pools),
            Arc::clone(&settings),
            provider,
            config.generation.clone(),
        ));

        Self {
            config,
            db,
            users,
            keys,
            settings,
            pools,
            generation,
        }
    }
}
