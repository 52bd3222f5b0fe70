//! # 令牌轮换设置
//!
//! 全局单例，控制 Bearer Token 池的轮换方式与批量节奏。

use async_trait::async_trait;
use chrono::Utc;
use entity::rotation_settings;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ensure_valid;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationSettings {
    pub rotation_enabled: bool,
    pub rotation_interval_minutes: u32,
    /// 单个令牌在一个轮换窗口内的软上限
    pub max_requests_per_token: u32,
    pub videos_per_batch: u32,
    pub batch_delay_seconds: u32,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            rotation_enabled: true,
            rotation_interval_minutes: 60,
            max_requests_per_token: 100,
            videos_per_batch: 5,
            batch_delay_seconds: 20,
        }
    }
}

impl RotationSettings {
    pub fn validate(&self) -> Result<()> {
        ensure_valid!(
            (1..=1440).contains(&self.rotation_interval_minutes),
            "rotation_interval_minutes",
            "轮换间隔必须在 1 到 1440 分钟之间"
        );
        ensure_valid!(
            self.max_requests_per_token > 0,
            "max_requests_per_token",
            "单令牌请求上限必须大于0"
        );
        ensure_valid!(
            (1..=100).contains(&self.videos_per_batch),
            "videos_per_batch",
            "每批视频数必须在 1 到 100 之间"
        );
        ensure_valid!(
            self.batch_delay_seconds <= 3600,
            "batch_delay_seconds",
            "批次间隔不能超过 3600 秒"
        );
        Ok(())
    }

    /// 选择器使用的轮换偏好
    #[must_use]
    pub const fn preference(&self) -> RotationPreference {
        if self.rotation_enabled {
            RotationPreference::Rotate {
                soft_request_cap: self.max_requests_per_token as u64,
            }
        } else {
            RotationPreference::Sticky
        }
    }

    fn from_model(model: &rotation_settings::Model) -> Self {
        let to_u32 = |value: i32| u32::try_from(value).unwrap_or(0);
        Self {
            rotation_enabled: model.rotation_enabled,
            rotation_interval_minutes: to_u32(model.rotation_interval_minutes),
            max_requests_per_token: to_u32(model.max_requests_per_token),
            videos_per_batch: to_u32(model.videos_per_batch),
            batch_delay_seconds: to_u32(model.batch_delay_seconds),
        }
    }
}

/// Bearer Token 池的选择偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPreference {
    /// 按用量均衡轮换
    Balanced,
    /// 始终使用 id 最小的可用令牌
    Sticky,
    /// 均衡轮换，达到软上限的令牌排在后面
    Rotate { soft_request_cap: u64 },
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<RotationSettings>;

    /// 校验后保存，返回保存后的设置
    async fn save(&self, settings: RotationSettings) -> Result<RotationSettings>;
}

pub struct DbSettingsStore {
    db: Arc<DatabaseConnection>,
    defaults: RotationSettings,
}

impl DbSettingsStore {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>, defaults: RotationSettings) -> Self {
        Self { db, defaults }
    }
}

fn to_db(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[async_trait]
impl SettingsStore for DbSettingsStore {
    async fn load(&self) -> Result<RotationSettings> {
        let model = rotation_settings::Entity::find_by_id(rotation_settings::SINGLETON_ID)
            .one(&*self.db)
            .await?;
        Ok(model.map_or(self.defaults, |model| RotationSettings::from_model(&model)))
    }

    async fn save(&self, settings: RotationSettings) -> Result<RotationSettings> {
        settings.validate()?;

        let existing = rotation_settings::Entity::find_by_id(rotation_settings::SINGLETON_ID)
            .one(&*self.db)
            .await?;
        let now = Utc::now().naive_utc();

        let saved = if let Some(model) = existing {
            let mut active: rotation_settings::ActiveModel = model.into();
            active.rotation_enabled = Set(settings.rotation_enabled);
            active.rotation_interval_minutes = Set(to_db(settings.rotation_interval_minutes));
            active.max_requests_per_token = Set(to_db(settings.max_requests_per_token));
            active.videos_per_batch = Set(to_db(settings.videos_per_batch));
            active.batch_delay_seconds = Set(to_db(settings.batch_delay_seconds));
            active.updated_at = Set(now);
            active.update(&*self.db).await?
        } else {
            rotation_settings::ActiveModel {
                id: Set(rotation_settings::SINGLETON_ID),
                rotation_enabled: Set(settings.rotation_enabled),
                rotation_interval_minutes: Set(to_db(settings.rotation_interval_minutes)),
                max_requests_per_token: Set(to_db(settings.max_requests_per_token)),
                videos_per_batch: Set(to_db(settings.videos_per_batch)),
                batch_delay_seconds: Set(to_db(settings.batch_delay_seconds)),
                updated_at: Set(now),
            }
            .insert(&*self.db)
            .await?
        };

        Ok(RotationSettings::from_model(&saved))
    }
}

/// 内存实现，用于不落库的场景
pub struct MemorySettingsStore {
    settings: RwLock<RotationSettings>,
}

impl MemorySettingsStore {
    #[must_use]
    pub fn new(settings: RotationSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<RotationSettings> {
        Ok(*self.settings.read().await)
    }

    async fn save(&self, settings: RotationSettings) -> Result<RotationSettings> {
        settings.validate()?;
        *self.settings.write().await = settings;
        Ok(settings)
    }
}
