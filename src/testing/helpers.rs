//! # 测试辅助函数

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

use crate::config::PoolsConfig;
use crate::error::Result;
use crate::key_pool::{KeyStore, MemoryKeyStore, MemorySettingsStore, PoolRegistry, RotationSettings};

/// 创建已迁移的内存数据库
///
/// 内存库的每个连接都是独立数据库，所以连接池限制为 1。
pub async fn create_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// 使用内存存储的密钥池注册表
#[must_use]
pub fn memory_registry(pools: &PoolsConfig) -> (Arc<PoolRegistry>, Arc<MemorySettingsStore>) {
    let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
    let settings = Arc::new(MemorySettingsStore::new(RotationSettings::default()));
    let registry = PoolRegistry::new(&store, settings.clone(), pools);
    (Arc::new(registry), settings)
}

