//! # 数据库密钥存储
//!
//! 预占与计数都使用单条带条件的 `UPDATE` 语句，以 `rows_affected` 判断是否成功。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entity::provider_keys;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr, sea_query::Expr,
};
use std::sync::Arc;

use super::store::KeyStore;
use super::types::{NewProviderKey, Provider, ProviderKey, mask_secret};
use crate::error::{KeyPoolError, Result};
use crate::{
    lwarn,
    logging::{LogComponent, LogStage},
};

pub struct DbKeyStore {
    db: Arc<DatabaseConnection>,
}

impl DbKeyStore {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn to_domain(model: provider_keys::Model, provider: Provider) -> ProviderKey {
        ProviderKey {
            id: model.id,
            provider,
            label: model.label,
            secret: model.secret,
            secret_fingerprint: model.secret_fingerprint,
            is_active: model.is_active,
            units_used: u64::try_from(model.units_used).unwrap_or(0),
            units_limit: u64::try_from(model.units_limit).unwrap_or(0),
            error_count: u32::try_from(model.error_count).unwrap_or(0),
            last_error: model.last_error,
            last_used_at: model.last_used_at.map(|t| t.and_utc()),
            request_count: u64::try_from(model.request_count).unwrap_or(0),
            created_at: model.created_at.and_utc(),
        }
    }

    /// 执行按 `(provider, id)` 限定的更新，并返回更新后的记录
    async fn update_and_fetch(
        &self,
        provider: Provider,
        key_id: i32,
        update: sea_orm::UpdateMany<provider_keys::Entity>,
    ) -> Result<Option<ProviderKey>> {
        let result = update
            .col_expr(
                provider_keys::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(provider_keys::Column::Id.eq(key_id))
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Ok(None);
        }
        self.get(provider, key_id).await
    }
}

fn to_db_units(units: u64) -> i64 {
    i64::try_from(units).unwrap_or(i64::MAX)
}

#[async_trait]
impl KeyStore for DbKeyStore {
    async fn list(&self, provider: Provider) -> Result<Vec<ProviderKey>> {
        let models = provider_keys::Entity::find()
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .order_by_asc(provider_keys::Column::Id)
            .all(&*self.db)
            .await?;

        Ok(models
            .into_iter()
            .map(|model| Self::to_domain(model, provider))
            .collect())
    }

    async fn get(&self, provider: Provider, key_id: i32) -> Result<Option<ProviderKey>> {
        let model = provider_keys::Entity::find_by_id(key_id)
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .one(&*self.db)
            .await?;
        Ok(model.map(|model| Self::to_domain(model, provider)))
    }

    async fn insert(&self, new_key: NewProviderKey) -> Result<ProviderKey> {
        let provider = new_key.provider;
        let fingerprint = new_key.fingerprint();
        let duplicate = || KeyPoolError::DuplicateKey {
            provider,
            masked_secret: mask_secret(&new_key.secret),
        };

        let existing = provider_keys::Entity::find()
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .filter(provider_keys::Column::SecretFingerprint.eq(fingerprint.as_str()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(duplicate().into());
        }

        let now = Utc::now().naive_utc();
        let model = provider_keys::ActiveModel {
            provider: Set(provider.as_str().to_string()),
            label: Set(new_key.label.clone()),
            secret: Set(new_key.secret.trim().to_string()),
            secret_fingerprint: Set(fingerprint),
            is_active: Set(true),
            units_used: Set(0),
            units_limit: Set(to_db_units(new_key.units_limit)),
            error_count: Set(0),
            last_error: Set(None),
            last_used_at: Set(None),
            request_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        match model.insert(&*self.db).await {
            Ok(model) => Ok(Self::to_domain(model, provider)),
            // 并发插入同一密钥时由唯一索引兜底
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(duplicate().into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn try_reserve(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        enforce_limit: bool,
        error_threshold: Option<u32>,
    ) -> Result<bool> {
        let units = to_db_units(units);
        let mut update = provider_keys::Entity::update_many()
            .col_expr(
                provider_keys::Column::UnitsUsed,
                Expr::col(provider_keys::Column::UnitsUsed).add(units),
            )
            .col_expr(
                provider_keys::Column::UpdatedAt,
                Expr::value(Utc::now().naive_utc()),
            )
            .filter(provider_keys::Column::Id.eq(key_id))
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .filter(provider_keys::Column::IsActive.eq(true));

        if enforce_limit {
            update = update.filter(
                Expr::col(provider_keys::Column::UnitsUsed)
                    .lte(Expr::col(provider_keys::Column::UnitsLimit).sub(units)),
            );
        }
        if let Some(threshold) = error_threshold {
            let threshold = i32::try_from(threshold).unwrap_or(i32::MAX);
            update = update.filter(provider_keys::Column::ErrorCount.lt(threshold));
        }

        let result = update.exec(&*self.db).await?;
        Ok(result.rows_affected == 1)
    }

    async fn settle_failure(
        &self,
        provider: Provider,
        key_id: i32,
        units: u64,
        at: DateTime<Utc>,
        message: &str,
    ) -> Result<Option<ProviderKey>> {
        let units = to_db_units(units);
        // 用量可能已被管理员重置，此时归零而不是减成负数
        let released = Expr::case(
            Expr::col(provider_keys::Column::UnitsUsed).gte(units),
            Expr::col(provider_keys::Column::UnitsUsed).sub(units),
        )
        .finally(Expr::value(0_i64));

        let update = provider_keys::Entity::update_many()
            .col_expr(provider_keys::Column::UnitsUsed, released.into())
            .col_expr(
                provider_keys::Column::LastUsedAt,
                Expr::value(Some(at.naive_utc())),
            )
            .col_expr(
                provider_keys::Column::RequestCount,
                Expr::col(provider_keys::Column::RequestCount).add(1),
            )
            .col_expr(
                provider_keys::Column::ErrorCount,
                Expr::col(provider_keys::Column::ErrorCount).add(1),
            )
            .col_expr(
                provider_keys::Column::LastError,
                Expr::value(Some(message.to_string())),
            );
        self.update_and_fetch(provider, key_id, update).await
    }

    async fn mark_used(&self, provider: Provider, key_id: i32, at: DateTime<Utc>) -> Result<()> {
        let result = provider_keys::Entity::update_many()
            .col_expr(
                provider_keys::Column::LastUsedAt,
                Expr::value(Some(at.naive_utc())),
            )
            .col_expr(
                provider_keys::Column::RequestCount,
                Expr::col(provider_keys::Column::RequestCount).add(1),
            )
            .filter(provider_keys::Column::Id.eq(key_id))
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            lwarn!(
                "system",
                LogStage::Usage,
                LogComponent::KeyPool,
                "mark_used_missing",
                "密钥已被删除，跳过使用记录",
                provider = %provider,
                key_id = key_id
            );
        }
        Ok(())
    }

    async fn record_error(
        &self,
        provider: Provider,
        key_id: i32,
        message: &str,
    ) -> Result<Option<ProviderKey>> {
        let update = provider_keys::Entity::update_many()
            .col_expr(
                provider_keys::Column::ErrorCount,
                Expr::col(provider_keys::Column::ErrorCount).add(1),
            )
            .col_expr(
                provider_keys::Column::LastError,
                Expr::value(Some(message.to_string())),
            );
        self.update_and_fetch(provider, key_id, update).await
    }

    async fn set_active(
        &self,
        provider: Provider,
        key_id: i32,
        active: bool,
    ) -> Result<Option<ProviderKey>> {
        let update = provider_keys::Entity::update_many()
            .col_expr(provider_keys::Column::IsActive, Expr::value(active));
        self.update_and_fetch(provider, key_id, update).await
    }

    async fn set_units_limit(
        &self,
        provider: Provider,
        key_id: i32,
        units_limit: u64,
    ) -> Result<Option<ProviderKey>> {
        let update = provider_keys::Entity::update_many().col_expr(
            provider_keys::Column::UnitsLimit,
            Expr::value(to_db_units(units_limit)),
        );
        self.update_and_fetch(provider, key_id, update).await
    }

    async fn reset_counters(
        &self,
        provider: Provider,
        key_id: i32,
    ) -> Result<Option<ProviderKey>> {
        let update = provider_keys::Entity::update_many()
            .col_expr(provider_keys::Column::UnitsUsed, Expr::value(0_i64))
            .col_expr(provider_keys::Column::ErrorCount, Expr::value(0))
            .col_expr(
                provider_keys::Column::LastError,
                Expr::value(Option::<String>::None),
            );
        self.update_and_fetch(provider, key_id, update).await
    }

    async fn remove(&self, provider: Provider, key_id: i32) -> Result<bool> {
        let result = provider_keys::Entity::delete_many()
            .filter(provider_keys::Column::Id.eq(key_id))
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn remove_all(&self, provider: Provider) -> Result<u64> {
        let result = provider_keys::Entity::delete_many()
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn reset_request_counts(&self, provider: Provider) -> Result<u64> {
        let result = provider_keys::Entity::update_many()
            .col_expr(provider_keys::Column::RequestCount, Expr::value(0_i64))
            .filter(provider_keys::Column::Provider.eq(provider.as_str()))
            .filter(provider_keys::Column::RequestCount.gt(0))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
