use crate::config::AppConfig;
use crate::database;
use crate::error::Result;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// 应用基础资源：配置与数据库连接
pub struct AppResources {
    config: Arc<AppConfig>,
    database: Arc<DatabaseConnection>,
}

impl AppResources {
    /// 连接数据库、执行迁移并写入默认轮换设置
    pub async fn initialize(config: AppConfig) -> Result<Arc<Self>> {
        let db = database::init_database(&config.database).await?;
        database::run_migrations(&db).await?;
        database::ensure_rotation_settings(&db, config.rotation).await?;
        Ok(Self::build(Arc::new(config), Arc::new(db)))
    }

    /// 根据已有的配置与数据库连接构建资源层
    #[must_use]
    pub fn build(config: Arc<AppConfig>, database: Arc<DatabaseConnection>) -> Arc<Self> {
        Arc::new(Self { config, database })
    }

    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    #[must_use]
    pub fn database(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.database)
    }
}
