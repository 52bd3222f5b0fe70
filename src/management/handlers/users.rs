//! # 用户套餐处理器

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entitlement::{
    Remaining, ToolAccess, UserSnapshot, can_access_tool_at, effective_bulk_limits,
    get_remaining_videos, has_reached_daily_limit, is_plan_expired_at,
};
use crate::error::{PlatformError, Result};
use crate::management::{response, server::AppState};
use crate::plans::{BulkGenerationLimits, PlanType, get_plan_config};

#[derive(Debug, Deserialize)]
pub struct EntitlementQuery {
    pub tool: Option<String>,
}

/// 用户权限视图
#[derive(Debug, Serialize)]
pub struct EntitlementView {
    pub user_id: i32,
    pub plan_type: String,
    pub plan_name: Option<&'static str>,
    pub plan_status: String,
    pub plan_expiry: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub daily_video_count: u32,
    pub daily_limit: Option<u32>,
    pub has_reached_daily_limit: bool,
    pub remaining_videos: Remaining,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulk_limits: Option<BulkGenerationLimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_access: Option<ToolAccess>,
}

impl EntitlementView {
    fn build(user: &UserSnapshot, tool: Option<&str>, now: DateTime<Utc>) -> Self {
        let plan = get_plan_config(&user.plan_type);
        Self {
            user_id: user.id,
            plan_type: user.plan_type.clone(),
            plan_name: plan.map(|plan| plan.name),
            plan_status: user.plan_status.clone(),
            plan_expiry: user.plan_expiry,
            is_expired: is_plan_expired_at(user, now),
            daily_video_count: user.daily_video_count,
            daily_limit: plan.map(|plan| plan.daily_limit),
            has_reached_daily_limit: has_reached_daily_limit(user),
            remaining_videos: get_remaining_videos(user),
            bulk_limits: effective_bulk_limits(user),
            tool_access: tool.map(|tool| can_access_tool_at(user, tool, now)),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RenewRequest {
    pub days: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    pub plan_type: String,
    pub days: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub reset: u64,
}

pub async fn get_entitlement(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
    Query(query): Query<EntitlementQuery>,
) -> Result<Response> {
    let user = state.users.load(user_id).await?;
    let tool = query.tool.as_deref().map(str::trim).filter(|tool| !tool.is_empty());
    Ok(response::success(EntitlementView::build(
        &user,
        tool,
        Utc::now(),
    )))
}

pub async fn renew_plan(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
    Json(request): Json<RenewRequest>,
) -> Result<Response> {
    let user = state
        .users
        .renew_plan(user_id, request.days, Utc::now())
        .await?;
    Ok(response::success_with_message(user, "套餐已续期"))
}

pub async fn change_plan(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
    Json(request): Json<ChangePlanRequest>,
) -> Result<Response> {
    let plan_type = PlanType::parse(&request.plan_type).ok_or_else(|| {
        PlatformError::validation(
            format!("无效的套餐类型: {}", request.plan_type),
            Some("plan_type".to_string()),
        )
    })?;
    let user = state
        .users
        .change_plan(user_id, plan_type, request.days, Utc::now())
        .await?;
    Ok(response::success_with_message(user, "套餐已更换"))
}

pub async fn remove_plan(
    State(state): State<AppState>,
    Path(user_id): Path<i32>,
) -> Result<Response> {
    let user = state.users.remove_plan(user_id).await?;
    Ok(response::success_with_message(user, "套餐已取消"))
}

/// 供外部每日任务调用
pub async fn reset_daily_counts(State(state): State<AppState>) -> Result<Response> {
    let reset = state.users.reset_daily_counts().await?;
    Ok(response::success(ResetResponse { reset }))
}
