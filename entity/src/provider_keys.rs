//! # 服务商密钥池实体定义
//!
//! Zyphra / Cartesia / Inworld / Flow Cookie / Bearer Token 共用一张表，按 `provider` 分区

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 服务商密钥实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "provider_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub provider: String,
    pub label: String,
    #[sea_orm(column_type = "Text")]
    #[serde(skip_serializing)]
    pub secret: String,
    /// 密钥内容的 SHA-256 指纹，用于去重
    pub secret_fingerprint: String,
    pub is_active: bool,
    pub units_used: i64,
    pub units_limit: i64,
    pub error_count: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime>,
    pub request_count: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
