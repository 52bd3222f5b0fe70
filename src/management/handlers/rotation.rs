//! 轮换设置处理器

use axum::Json;
use axum::extract::State;
use axum::response::Response;

use crate::error::Result;
use crate::key_pool::RotationSettings;
use crate::management::{response, server::AppState};

pub async fn get_rotation_settings(State(state): State<AppState>) -> Result<Response> {
    Ok(response::success(state.settings.load().await?))
}

/// 整体替换轮换设置，校验失败返回 400
pub async fn update_rotation_settings(
    State(state): State<AppState>,
    Json(settings): Json<RotationSettings>,
) -> Result<Response> {
    let saved = state.settings.save(settings).await?;
    Ok(response::success_with_message(saved, "轮换设置已保存"))
}
