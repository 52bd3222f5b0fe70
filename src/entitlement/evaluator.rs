//! # 套餐权限判定
//!
//! 全部为纯函数，`*_at` 版本显式接收判定时间，其余版本使用当前时钟。

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::UserSnapshot;
use crate::error::EntitlementError;
use crate::plans::{BulkGenerationLimits, PlanConfig, PlanType, get_plan_config, plan_config};

/// 今日剩余可生成数量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Unlimited,
    Count(u32),
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unlimited => serializer.serialize_str("unlimited"),
            Self::Count(count) => serializer.serialize_u32(*count),
        }
    }
}

/// 工具访问判定结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolAccess {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<Result<(), EntitlementError>> for ToolAccess {
    fn from(result: Result<(), EntitlementError>) -> Self {
        match result {
            Ok(()) => Self {
                allowed: true,
                reason: None,
            },
            Err(err) => Self {
                allowed: false,
                reason: Some(err.to_string()),
            },
        }
    }
}

fn is_free(user: &UserSnapshot) -> bool {
    PlanType::parse(&user.plan_type) == Some(PlanType::Free)
}

/// 套餐是否已过期
///
/// 管理员与免费套餐永不过期；未设置到期时间的付费套餐同样视为不过期。
#[must_use]
pub fn is_plan_expired_at(user: &UserSnapshot, now: DateTime<Utc>) -> bool {
    if user.is_admin || is_free(user) {
        return false;
    }
    user.plan_expiry.is_some_and(|expiry| now > expiry)
}

#[must_use]
pub fn is_plan_expired(user: &UserSnapshot) -> bool {
    is_plan_expired_at(user, Utc::now())
}

/// 是否已达到每日生成上限
///
/// 无法识别的套餐按已达上限处理。
#[must_use]
pub fn has_reached_daily_limit(user: &UserSnapshot) -> bool {
    if user.is_admin {
        return false;
    }
    get_plan_config(&user.plan_type).is_none_or(|plan| user.daily_video_count >= plan.daily_limit)
}

/// 今日剩余可生成数量（展示用）
#[must_use]
pub fn get_remaining_videos(user: &UserSnapshot) -> Remaining {
    if user.is_admin {
        return Remaining::Unlimited;
    }
    match get_plan_config(&user.plan_type) {
        None => Remaining::Count(0),
        Some(plan) if plan.display_unlimited => Remaining::Unlimited,
        Some(plan) => Remaining::Count(plan.daily_limit.saturating_sub(user.daily_video_count)),
    }
}

/// 工具访问判定，返回具体拒绝原因
///
/// 判定顺序：管理员 → 过期 → 套餐解析 → 工具白名单。
pub fn check_tool_access_at(
    user: &UserSnapshot,
    tool: &str,
    now: DateTime<Utc>,
) -> Result<(), EntitlementError> {
    if user.is_admin {
        return Ok(());
    }
    if is_plan_expired_at(user, now) {
        return Err(EntitlementError::PlanExpired);
    }
    let plan = get_plan_config(&user.plan_type).ok_or_else(|| EntitlementError::InvalidPlan {
        plan_type: user.plan_type.clone(),
    })?;
    if !plan.allows_tool(tool) {
        return Err(EntitlementError::ToolNotAllowed {
            plan_name: plan.name.to_string(),
            tool: tool.to_string(),
        });
    }
    Ok(())
}

#[must_use]
pub fn can_access_tool_at(user: &UserSnapshot, tool: &str, now: DateTime<Utc>) -> ToolAccess {
    check_tool_access_at(user, tool, now).into()
}

#[must_use]
pub fn can_access_tool(user: &UserSnapshot, tool: &str) -> ToolAccess {
    can_access_tool_at(user, tool, Utc::now())
}

/// 生成前的完整校验：工具权限 + 每日上限
pub fn authorize_generation_at(
    user: &UserSnapshot,
    tool: &str,
    now: DateTime<Utc>,
) -> Result<(), EntitlementError> {
    check_tool_access_at(user, tool, now)?;
    if has_reached_daily_limit(user) {
        let limit = get_plan_config(&user.plan_type).map_or(0, |plan| plan.daily_limit);
        return Err(EntitlementError::DailyLimitReached { limit });
    }
    Ok(())
}

pub fn authorize_generation(user: &UserSnapshot, tool: &str) -> Result<(), EntitlementError> {
    authorize_generation_at(user, tool, Utc::now())
}

/// 用户可用的批量生成限制
///
/// 管理员的套餐无法解析时使用最高档套餐的限制。
#[must_use]
pub fn effective_bulk_limits(user: &UserSnapshot) -> Option<BulkGenerationLimits> {
    let resolved: Option<&'static PlanConfig> = get_plan_config(&user.plan_type);
    match resolved {
        Some(plan) if !user.is_admin || plan.bulk_generation.max_prompts > 0 => {
            Some(plan.bulk_generation)
        }
        _ if user.is_admin => Some(plan_config(PlanType::Enterprise).bulk_generation),
        _ => None,
    }
}
