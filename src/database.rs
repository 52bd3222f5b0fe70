//! # 数据库模块
//!
//! 数据库连接和迁移管理

use entity::rotation_settings;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{Context, Result};
use crate::key_pool::RotationSettings;
use crate::{
    ldebug, lerror, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let url = config.get_connection_url()?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "connect",
        &format!("正在连接数据库: {}", url.chars().take(50).collect::<String>())
    );

    let mut options = ConnectOptions::new(url);
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .context("数据库连接失败")?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "connected",
        "数据库连接成功"
    );
    Ok(db)
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    let pending = ::migration::Migrator::get_pending_migrations(db).await?;
    if pending.is_empty() {
        ldebug!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "migrations_up_to_date",
            "所有迁移都已应用"
        );
        return Ok(());
    }

    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "run_migrations",
        &format!("开始运行 {} 个数据库迁移", pending.len())
    );
    if let Err(err) = ::migration::Migrator::up(db, None).await {
        lerror!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "migration_failed",
            &format!("数据库迁移失败: {err}")
        );
        return Err(err.into());
    }
    Ok(())
}

/// 确保轮换设置单例行存在，缺失时写入默认值
pub async fn ensure_rotation_settings(
    db: &DatabaseConnection,
    defaults: RotationSettings,
) -> Result<()> {
    let existing = rotation_settings::Entity::find_by_id(rotation_settings::SINGLETON_ID)
        .one(db)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let defaults = match defaults.validate() {
        Ok(()) => defaults,
        Err(reason) => {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "invalid_rotation_defaults",
                &format!("配置中的轮换设置无效，改用内置默认值: {reason}")
            );
            RotationSettings::default()
        }
    };

    let to_db = |value: u32| i32::try_from(value).unwrap_or(i32::MAX);
    rotation_settings::ActiveModel {
        id: Set(rotation_settings::SINGLETON_ID),
        rotation_enabled: Set(defaults.rotation_enabled),
        rotation_interval_minutes: Set(to_db(defaults.rotation_interval_minutes)),
        max_requests_per_token: Set(to_db(defaults.max_requests_per_token)),
        videos_per_batch: Set(to_db(defaults.videos_per_batch)),
        batch_delay_seconds: Set(to_db(defaults.batch_delay_seconds)),
        updated_at: Set(chrono::Utc::now().naive_utc()),
    }
    .insert(db)
    .await?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "rotation_settings_seeded",
        "已写入默认轮换设置"
    );
    Ok(())
}
