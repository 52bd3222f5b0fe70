//! # 用户存储
//!
//! 套餐变更与每日计数的持久化。计数自增在数据库层原子完成。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use entity::users;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    sea_query::Expr,
};
use std::sync::Arc;

use super::{PlanStatus, UserSnapshot};
use crate::error::{PlatformError, Result};
use crate::plans::PlanType;
use crate::{
    ensure_valid, linfo,
    logging::{LogComponent, LogStage},
};

/// 新建用户参数
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub is_admin: bool,
    pub plan_type: String,
    pub plan_expiry: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn load(&self, user_id: i32) -> Result<UserSnapshot>;

    /// 原子自增每日计数，返回自增后的值
    async fn increment_daily_count(&self, user_id: i32) -> Result<u32>;

    /// 续期：从 max(now, 当前到期时间) 起延长 `days` 天，并将状态置为 active
    async fn renew_plan(&self, user_id: i32, days: u32, now: DateTime<Utc>)
    -> Result<UserSnapshot>;

    /// 更换套餐；`days` 为空时保留原到期时间
    async fn change_plan(
        &self,
        user_id: i32,
        plan_type: PlanType,
        days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<UserSnapshot>;

    /// 取消套餐：回到 free，状态 cancelled，清空到期时间
    async fn remove_plan(&self, user_id: i32) -> Result<UserSnapshot>;

    /// 清零所有用户的每日计数，返回影响行数
    async fn reset_daily_counts(&self) -> Result<u64>;
}

/// 基于 sea-orm 的用户存储
pub struct DbUserStore {
    db: Arc<DatabaseConnection>,
}

impl DbUserStore {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 创建用户
    pub async fn create(&self, new_user: NewUser) -> Result<UserSnapshot> {
        ensure_valid!(
            !new_user.username.trim().is_empty(),
            "username",
            "用户名不能为空"
        );

        let now = Utc::now().naive_utc();
        let model = users::ActiveModel {
            username: Set(new_user.username.trim().to_string()),
            is_admin: Set(new_user.is_admin),
            plan_type: Set(new_user.plan_type),
            plan_status: Set(PlanStatus::Active.as_str().to_string()),
            plan_expiry: Set(new_user.plan_expiry.map(|t| t.naive_utc())),
            daily_video_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        Ok(model.into())
    }

    async fn find_model(&self, user_id: i32) -> Result<users::Model> {
        users::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| PlatformError::not_found("User", user_id.to_string()))
    }
}

fn extend_expiry(current: Option<DateTime<Utc>>, days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    let base = current.filter(|expiry| *expiry > now).unwrap_or(now);
    base + Duration::days(i64::from(days))
}

#[async_trait]
impl UserStore for DbUserStore {
    async fn load(&self, user_id: i32) -> Result<UserSnapshot> {
        self.find_model(user_id).await.map(Into::into)
    }

    async fn increment_daily_count(&self, user_id: i32) -> Result<u32> {
        let result = users::Entity::update_many()
            .col_expr(
                users::Column::DailyVideoCount,
                Expr::col(users::Column::DailyVideoCount).add(1),
            )
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(users::Column::Id.eq(user_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(PlatformError::not_found("User", user_id.to_string()));
        }

        Ok(self.load(user_id).await?.daily_video_count)
    }

    async fn renew_plan(
        &self,
        user_id: i32,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<UserSnapshot> {
        ensure_valid!(days > 0, "days", "续期天数必须大于0");

        let model = self.find_model(user_id).await?;
        let current: UserSnapshot = model.clone().into();
        if PlanType::parse(&current.plan_type) == Some(PlanType::Free) {
            return Err(crate::business_error!("用户 {} 为免费套餐，无法续期", user_id));
        }
        let expiry = extend_expiry(current.plan_expiry, days, now);

        let mut active: users::ActiveModel = model.into();
        active.plan_expiry = Set(Some(expiry.naive_utc()));
        active.plan_status = Set(PlanStatus::Active.as_str().to_string());
        active.updated_at = Set(now.naive_utc());
        let updated = active.update(&*self.db).await?;

        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::Entitlement,
            "renew_plan",
            &format!("用户 {user_id} 套餐续期 {days} 天"),
            user_id = user_id,
            plan_expiry = %expiry
        );
        Ok(updated.into())
    }

    async fn change_plan(
        &self,
        user_id: i32,
        plan_type: PlanType,
        days: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<UserSnapshot> {
        if let Some(days) = days {
            ensure_valid!(days > 0, "days", "套餐天数必须大于0");
        }

        let model = self.find_model(user_id).await?;
        let mut active: users::ActiveModel = model.into();
        active.plan_type = Set(plan_type.as_str().to_string());
        active.plan_status = Set(PlanStatus::Active.as_str().to_string());
        if let Some(days) = days {
            let expiry = now + Duration::days(i64::from(days));
            active.plan_expiry = Set(Some(expiry.naive_utc()));
        }
        active.updated_at = Set(now.naive_utc());
        let updated = active.update(&*self.db).await?;

        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::Entitlement,
            "change_plan",
            &format!("用户 {user_id} 切换套餐为 {plan_type}"),
            user_id = user_id
        );
        Ok(updated.into())
    }

    async fn remove_plan(&self, user_id: i32) -> Result<UserSnapshot> {
        let model = self.find_model(user_id).await?;
        let mut active: users::ActiveModel = model.into();
        active.plan_type = Set(PlanType::Free.as_str().to_string());
        active.plan_status = Set(PlanStatus::Cancelled.as_str().to_string());
        active.plan_expiry = Set(None);
        active.updated_at = Set(Utc::now().naive_utc());
        let updated = active.update(&*self.db).await?;

        linfo!(
            "system",
            LogStage::Admin,
            LogComponent::Entitlement,
            "remove_plan",
            &format!("用户 {user_id} 套餐已取消"),
            user_id = user_id
        );
        Ok(updated.into())
    }

    async fn reset_daily_counts(&self) -> Result<u64> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::DailyVideoCount, Expr::value(0))
            .filter(users::Column::DailyVideoCount.gt(0))
            .exec(&*self.db)
            .await?;

        linfo!(
            "system",
            LogStage::Background,
            LogComponent::Entitlement,
            "reset_daily_counts",
            &format!("已重置 {} 个用户的每日计数", result.rows_affected)
        );
        Ok(result.rows_affected)
    }
}
