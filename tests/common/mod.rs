//! 集成测试公共工具
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::users;
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryFilter,
    sea_query::Expr,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use vidgen::app::{AppContext, AppResources};
use vidgen::config::AppConfig;
use vidgen::database::ensure_rotation_settings;
use vidgen::entitlement::{DbUserStore, NewUser, UserSnapshot, UserStore};
use vidgen::generation::{GeneratedAsset, GenerationProvider};
use vidgen::error::PlatformError;
use vidgen::key_pool::{
    KeyStore, NewProviderKey, Provider, ProviderCallError, ProviderKey, RotationSettings,
};
use vidgen::plans::PlanType;

/// 已迁移的单连接内存库
pub async fn setup_test_db() -> Arc<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("connect test db");
    Migrator::up(&db, None)
        .await
        .expect("run migrations");
    Arc::new(db)
}

/// 按脚本返回结果的生成服务
///
/// 凭据在 `failing_secrets` 中的调用返回 429，其余返回资源地址。
#[derive(Default)]
pub struct ScriptedProvider {
    failing_secrets: Mutex<HashSet<String>>,
    calls: AtomicUsize,
    seen_secrets: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn fail_with(&self, secret: &str) {
        self.failing_secrets.lock().await.insert(secret.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn seen_secrets(&self) -> Vec<String> {
        self.seen_secrets.lock().await.clone()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(
        &self,
        tool: &str,
        secret: &str,
        _prompt: &str,
    ) -> Result<GeneratedAsset, ProviderCallError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_secrets.lock().await.push(secret.to_string());
        if self.failing_secrets.lock().await.contains(secret) {
            return Err(ProviderCallError::Rejected {
                status: Some(429),
                message: "quota exceeded".to_string(),
            });
        }
        Ok(GeneratedAsset {
            asset_url: format!("https://cdn.test/{tool}/{call}.mp4"),
        })
    }
}

/// 测试用应用上下文
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub context: Arc<AppContext>,
    pub provider: Arc<ScriptedProvider>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_rotation(RotationSettings::default()).await
    }

    pub async fn with_rotation(rotation: RotationSettings) -> Self {
        let db = setup_test_db().await;
        ensure_rotation_settings(&db, rotation)
            .await
            .expect("seed rotation settings");
        let config = AppConfig {
            rotation,
            ..AppConfig::default()
        };
        let resources = AppResources::build(Arc::new(config), Arc::clone(&db));
        let provider = ScriptedProvider::new();
        let context = Arc::new(AppContext::with_provider(&resources, provider.clone()));
        Self {
            db,
            context,
            provider,
        }
    }

    /// 写入用户并设置每日计数
    pub async fn user(
        &self,
        username: &str,
        plan_type: &str,
        plan_expiry: Option<DateTime<Utc>>,
        daily_video_count: u32,
    ) -> UserSnapshot {
        let store = DbUserStore::new(Arc::clone(&self.db));
        let user = store
            .create(NewUser {
                username: username.to_string(),
                is_admin: false,
                plan_type: plan_type.to_string(),
                plan_expiry,
            })
            .await
            .expect("create user");
        users::Entity::update_many()
            .col_expr(
                users::Column::DailyVideoCount,
                Expr::value(i32::try_from(daily_video_count).expect("count fits")),
            )
            .filter(users::Column::Id.eq(user.id))
            .exec(&*self.db)
            .await
            .expect("set daily count");
        store.load(user.id).await.expect("reload user")
    }

    pub async fn admin(&self, username: &str) -> UserSnapshot {
        DbUserStore::new(Arc::clone(&self.db))
            .create(NewUser {
                username: username.to_string(),
                is_admin: true,
                plan_type: "free".to_string(),
                plan_expiry: None,
            })
            .await
            .expect("create admin")
    }

    pub async fn reload(&self, user_id: i32) -> UserSnapshot {
        self.context.users.load(user_id).await.expect("reload user")
    }
}

pub fn far_future() -> DateTime<Utc> {
    "2099-01-01T00:00:00Z".parse().expect("valid timestamp")
}

pub fn long_ago() -> DateTime<Utc> {
    "2020-01-01T00:00:00Z".parse().expect("valid timestamp")
}

/// 只支持读取与计数的内存用户存储，配合暂停时钟使用
#[derive(Default)]
pub struct CountingUsers {
    users: Mutex<std::collections::HashMap<i32, UserSnapshot>>,
}

impl CountingUsers {
    pub async fn with_user(user: UserSnapshot) -> Arc<Self> {
        let store = Arc::new(Self::default());
        store.users.lock().await.insert(user.id, user);
        store
    }
}

#[async_trait]
impl UserStore for CountingUsers {
    async fn load(&self, user_id: i32) -> vidgen::Result<UserSnapshot> {
        self.users
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PlatformError::not_found("User", user_id.to_string()))
    }

    async fn increment_daily_count(&self, user_id: i32) -> vidgen::Result<u32> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(&user_id)
            .ok_or_else(|| PlatformError::not_found("User", user_id.to_string()))?;
        user.daily_video_count += 1;
        Ok(user.daily_video_count)
    }

    async fn renew_plan(&self, _: i32, _: u32, _: DateTime<Utc>) -> vidgen::Result<UserSnapshot> {
        Err(PlatformError::business("unsupported in tests"))
    }

    async fn change_plan(
        &self,
        _: i32,
        _: PlanType,
        _: Option<u32>,
        _: DateTime<Utc>,
    ) -> vidgen::Result<UserSnapshot> {
        Err(PlatformError::business("unsupported in tests"))
    }

    async fn remove_plan(&self, _: i32) -> vidgen::Result<UserSnapshot> {
        Err(PlatformError::business("unsupported in tests"))
    }

    async fn reset_daily_counts(&self) -> vidgen::Result<u64> {
        Ok(0)
    }
}

pub fn snapshot(id: i32, plan_type: &str, daily_video_count: u32) -> UserSnapshot {
    UserSnapshot {
        id,
        username: format!("user-{id}"),
        is_admin: false,
        plan_type: plan_type.to_string(),
        plan_status: "active".to_string(),
        plan_expiry: Some(far_future()),
        daily_video_count,
    }
}

impl CountingUsers {
    pub async fn load_count(&self, user_id: i32) -> u32 {
        self.users
            .lock()
            .await
            .get(&user_id)
            .map_or(0, |user| user.daily_video_count)
    }
}

/// 在预占前插入一次失败记录的密钥存储
///
/// 模拟另一个请求在选择器读取快照之后、条件预占之前记下错误。
pub struct ErrorBeforeReserve {
    inner: Arc<dyn KeyStore>,
    pending: AtomicUsize,
}

impl ErrorBeforeReserve {
    pub fn new(inner: Arc<dyn KeyStore>, injections: usize) -> Self {
        Self {
            inner,
            pending: AtomicUsize::new(injections),
        }
    }

    pub fn remaining_injections(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyStore for ErrorBeforeReserve {
    async fn list(&self, provider: Provider) -> vidgen::Result<Vec<ProviderKey>> {
        self.inner.list(provider).await
    }

    async fn get(&self, provider: Provider, key_id: i32) -> vidgen::Result<Option<ProviderKey>> {
        self.inner.get(provider, key_id).await
    }

    async fn insert(&self, new_key: NewProviderKey) -> vidgen::Result<ProviderKey> {
        self.inner.insert(new_key).await
    }

    async fn try_reserve(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        enforce_limit: bool,
        error_threshold: Option<u32>,
    ) -> vidgen::Result<bool> {
        let inject = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if inject {
            self.inner
                .record_error(provider, key_id, "concurrent HTTP 500")
                .await?;
        }
        self.inner
            .try_reserve(provider, key_id, units, enforce_limit, error_threshold)
            .await
    }

    async fn settle_failure(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        at: DateTime<Utc>,
        message: &str,
    ) -> vidgen::Result<Option<ProviderKey>> {
        self.inner
            .settle_failure(provider, key_id, units, at, message)
            .await
    }

    async fn mark_used(
        &self,
        provider: Provider,
        key_id: i32,
        at: DateTime<Utc>,
    ) -> vidgen::Result<()> {
        self.inner.mark_used(provider, key_id, at).await
    }

    async fn record_error(
        &self,
        provider: Provider,
        key_id: i32,
        message: &str,
    ) -> vidgen::Result<Option<ProviderKey>> {
        self.inner.record_error(provider, key_id, message).await
    }

    async fn set_active(
        &self,
        provider: Provider,
        key_id: i32,
        active: bool,
    ) -> vidgen::Result<Option<ProviderKey>> {
        self.inner.set_active(provider, key_id, active).await
    }

    async fn set_units_limit(
        &self,
        provider: Provider,
        key_id: i32,
        units_limit: u64,
    ) -> vidgen::Result<Option<ProviderKey>> {
        self.inner.set_units_limit(provider, key_id, units_limit).await
    }

    async fn reset_counters(
        &self,
        provider: Provider,
        key_id: i32,
    ) -> vidgen::Result<Option<ProviderKey>> {
        self.inner.reset_counters(provider, key_id).await
    }

    async fn remove(&self, provider: Provider, key_id: i32) -> vidgen::Result<bool> {
        self.inner.remove(provider, key_id).await
    }

    async fn remove_all(&self, provider: Provider) -> vidgen::Result<u64> {
        self.inner.remove_all(provider).await
    }

    async fn reset_request_counts(&self, provider: Provider) -> vidgen::Result<u64> {
        self.inner.reset_request_counts(provider).await
    }
}
