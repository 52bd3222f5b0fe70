//! # 密钥池管理处理器

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::key_pool::{ManagedPool, Provider};
use crate::management::middleware::RequestId;
use crate::management::{response, server::AppState};
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};

fn pool_for(state: &AppState, provider: &str) -> Result<Arc<dyn ManagedPool>> {
    let provider: Provider = provider.parse()?;
    Ok(state.pools.get(provider))
}

#[derive(Debug, Deserialize)]
pub struct AddKeyRequest {
    pub secret: String,
    pub label: Option<String>,
    pub units_limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkAddRequest {
    #[serde(default)]
    pub secrets: Vec<String>,
    /// 每行一个密钥的原始文本，与 `secrets` 合并
    #[serde(default)]
    pub text: Option<String>,
}

impl BulkAddRequest {
    fn into_secrets(self) -> Vec<String> {
        let mut secrets = self.secrets;
        if let Some(text) = self.text {
            secrets.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        secrets
    }
}

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct LimitRequest {
    pub units_limit: u64,
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: u64,
}

pub async fn list_keys(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    Ok(response::success(pool.list_keys().await?))
}

pub async fn add_key(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<AddKeyRequest>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    let view = pool
        .add_key(&request.secret, request.label.as_deref(), request.units_limit)
        .await?;
    linfo!(
        request_id.as_str(),
        LogStage::Admin,
        LogComponent::Management,
        "add_key",
        "管理端新增密钥",
        provider = %view.provider,
        key_id = view.id
    );
    Ok(response::success_with_message(view, "密钥已添加"))
}

pub async fn bulk_add_keys(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(request): Json<BulkAddRequest>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    let report = pool.bulk_add_keys(&request.into_secrets()).await?;
    Ok(response::success(report))
}

pub async fn remove_all_keys(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    let removed = pool.remove_all_keys().await?;
    linfo!(
        request_id.as_str(),
        LogStage::Admin,
        LogComponent::Management,
        "remove_all_keys",
        &format!("管理端清空密钥池，共 {removed} 个"),
        provider = %pool.provider()
    );
    Ok(response::success(RemovedResponse { removed }))
}

pub async fn pool_stats(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    Ok(response::success(pool.pool_stats().await?))
}

pub async fn toggle_key(
    State(state): State<AppState>,
    Path((provider, key_id)): Path<(String, i32)>,
    Json(request): Json<ToggleRequest>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    Ok(response::success(pool.toggle_key(key_id, request.is_active).await?))
}

pub async fn reset_key(
    State(state): State<AppState>,
    Path((provider, key_id)): Path<(String, i32)>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    Ok(response::success_with_message(
        pool.reset_key(key_id).await?,
        "密钥用量已重置",
    ))
}

pub async fn set_key_limit(
    State(state): State<AppState>,
    Path((provider, key_id)): Path<(String, i32)>,
    Json(request): Json<LimitRequest>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    Ok(response::success(
        pool.set_key_limit(key_id, request.units_limit).await?,
    ))
}

pub async fn remove_key(
    State(state): State<AppState>,
    Path((provider, key_id)): Path<(String, i32)>,
) -> Result<Response> {
    let pool = pool_for(&state, &provider)?;
    pool.remove_key(key_id).await?;
    Ok(response::success_without_data("密钥已删除"))
}
