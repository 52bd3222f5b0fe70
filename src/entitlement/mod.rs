//! # 权限与配额模块
//!
//! 用户快照、套餐权限判定与用户存储

mod evaluator;
mod store;

pub use evaluator::{
    Remaining, ToolAccess, authorize_generation, authorize_generation_at, can_access_tool,
    can_access_tool_at, check_tool_access_at, effective_bulk_limits, get_remaining_videos,
    has_reached_daily_limit, is_plan_expired, is_plan_expired_at,
};
pub use store::{DbUserStore, NewUser, UserStore};

use chrono::{DateTime, Utc};
use entity::users;
use serde::{Deserialize, Serialize};

/// 套餐状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Expired,
    Cancelled,
}

impl PlanStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// 权限判定使用的用户只读快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSnapshot {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    /// 原始套餐字符串，可能是无法识别的值
    pub plan_type: String,
    pub plan_status: String,
    pub plan_expiry: Option<DateTime<Utc>>,
    pub daily_video_count: u32,
}

impl UserSnapshot {
    #[must_use]
    pub fn plan_status(&self) -> Option<PlanStatus> {
        PlanStatus::parse(&self.plan_status)
    }
}

impl From<users::Model> for UserSnapshot {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            is_admin: model.is_admin,
            plan_type: model.plan_type,
            plan_status: model.plan_status,
            plan_expiry: model.plan_expiry.map(|t| t.and_utc()),
            daily_video_count: u32::try_from(model.daily_video_count).unwrap_or(0),
        }
    }
}
