//! # 测试 Mock 对象

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use mockall::mock;

use crate::entitlement::{PlanStatus, UserSnapshot, UserStore};
use crate::error::PlatformError;
use crate::generation::{GeneratedAsset, GenerationProvider};
use crate::key_pool::ProviderCallError;
use crate::plans::PlanType;

mock! {
    pub Generator {}

    #[async_trait]
    impl GenerationProvider for Generator {
        async fn generate(
            &self,
            tool: &str,
            secret: &str,
            prompt: &str,
        ) -> Result<GeneratedAsset, ProviderCallError>;
    }
}

/// 总是成功的生成器，产物地址包含提示词
#[must_use]
pub fn succeeding_generator() -> MockGenerator {
    let mut generator = MockGenerator::new();
    generator.expect_generate().returning(|tool, _, prompt| {
        Ok(GeneratedAsset {
            asset_url: format!("https://cdn.test/{tool}/{}", prompt.len()),
        })
    });
    generator
}

/// 内存用户存储，供不依赖数据库的服务测试使用
#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<i32, UserSnapshot>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn with_users(users: impl IntoIterator<Item = UserSnapshot>) -> Self {
        let store = Self::default();
        for user in users {
            store.users.insert(user.id, user);
        }
        store
    }

    fn update(
        &self,
        user_id: i32,
        apply: impl FnOnce(&mut UserSnapshot),
    ) -> crate::error::Result<UserSnapshot> {
        let mut entry = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PlatformError::not_found("User", user_id.to_string()))?;
        apply(entry.value_mut());
        Ok(entry.value().clone())
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn load(&self, user_id: i32) -> crate::error::Result<UserSnapshot> {
        self.users
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlatformError::not_found("User", user_id.to_string()))
    }

    async fn increment_daily_count(&self, user_id: i32) -> crate::error::Result<u32> {
        self.update(user_id, |user| user.daily_video_count += 1)
            .map(|user| user.daily_video_count)
    }

    async fn renew_plan(
        &self,
        user_id: i32,
        days: u32,
        now: DateTime<Utc>,
    ) -> crate::error::Result<UserSnapshot> {
        self.update(user_id, |user| {
            let base = user.plan_expiry.filter(|expiry| *expiry > now).unwrap_or(now);
            user.plan_expiry = Some(base + Duration::days(i64::from(days)));
            user.plan_status = PlanStatus::Active.as_str().to_string();
        })
    }

    async fn change_plan(
        &self,
        user_id: i32,
        plan_type: PlanType,
        days: Option<u32>,
        now: DateTime<Utc>,
    ) -> crate::error::Result<UserSnapshot> {
        self.update(user_id, |user| {
            user.plan_type = plan_type.as_str().to_string();
            user.plan_status = PlanStatus::Active.as_str().to_string();
            if let Some(days) = days {
                user.plan_expiry = Some(now + Duration::days(i64::from(days)));
            }
        })
    }

    async fn remove_plan(&self, user_id: i32) -> crate::error::Result<UserSnapshot> {
        self.update(user_id, |user| {
            user.plan_type = PlanType::Free.as_str().to_string();
            user.plan_status = PlanStatus::Cancelled.as_str().to_string();
            user.plan_expiry = None;
        })
    }

    async fn reset_daily_counts(&self) -> crate::error::Result<u64> {
        let mut reset = 0;
        for mut entry in self.users.iter_mut() {
            if entry.daily_video_count > 0 {
                entry.daily_video_count = 0;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
