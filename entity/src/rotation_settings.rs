//! # 令牌轮换设置实体定义
//!
//! 全局单行配置，主键固定为 1

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 单例行的主键
pub const SINGLETON_ID: i32 = 1;

/// 轮换设置实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "rotation_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub rotation_enabled: bool,
    pub rotation_interval_minutes: i32,
    pub max_requests_per_token: i32,
    pub videos_per_batch: i32,
    pub batch_delay_seconds: i32,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
