//! # 测试数据 Fixtures

use chrono::{DateTime, TimeZone, Utc};

use crate::entitlement::UserSnapshot;

/// 用户测试数据构建器
#[derive(Debug, Clone)]
pub struct UserFixture {
    pub username: String,
    pub is_admin: bool,
    pub plan_type: String,
    pub plan_status: String,
    pub plan_expiry: Option<DateTime<Utc>>,
    pub daily_video_count: u32,
}

impl Default for UserFixture {
    fn default() -> Self {
        Self {
            username: "test_user".to_string(),
            is_admin: false,
            plan_type: "scale".to_string(),
            plan_status: "active".to_string(),
            plan_expiry: None,
            daily_video_count: 0,
        }
    }
}

impl UserFixture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    #[must_use]
    pub const fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    #[must_use]
    pub fn plan(mut self, plan_type: &str) -> Self {
        self.plan_type = plan_type.to_string();
        self
    }

    #[must_use]
    pub const fn expiring(mut self, expiry: DateTime<Utc>) -> Self {
        self.plan_expiry = Some(expiry);
        self
    }

    #[must_use]
    pub const fn used(mut self, daily_video_count: u32) -> Self {
        self.daily_video_count = daily_video_count;
        self
    }

    #[must_use]
    pub fn snapshot(self, id: i32) -> UserSnapshot {
        UserSnapshot {
            id,
            username: self.username,
            is_admin: self.is_admin,
            plan_type: self.plan_type,
            plan_status: self.plan_status,
            plan_expiry: self.plan_expiry,
            daily_video_count: self.daily_video_count,
        }
    }
}

/// 远期到期时间
#[must_use]
pub fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()
}

/// 已过去的到期时间
#[must_use]
pub fn long_ago() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

