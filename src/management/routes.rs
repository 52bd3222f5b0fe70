//! # 路由配置
//!
//! 定义所有API路由和路由组织

use crate::management::handlers::{generation, health, pools, rotation, users};
use crate::management::server::AppState;
use axum::Router;
use axum::routing::{get, patch, post, put};

/// 创建所有路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/pools", pool_routes())
        .route(
            "/rotation-settings",
            get(rotation::get_rotation_settings).put(rotation::update_rotation_settings),
        )
        .nest("/users", user_routes())
        .route("/generate", post(generation::generate))
        .route("/generate/bulk", post(generation::generate_bulk))
        .with_state(state)
}

/// 密钥池管理路由
fn pool_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{provider}/keys",
            get(pools::list_keys)
                .post(pools::add_key)
                .delete(pools::remove_all_keys),
        )
        .route("/{provider}/keys/bulk", post(pools::bulk_add_keys))
        .route("/{provider}/stats", get(pools::pool_stats))
        .route(
            "/{provider}/keys/{id}",
            axum::routing::delete(pools::remove_key),
        )
        .route("/{provider}/keys/{id}/active", patch(pools::toggle_key))
        .route("/{provider}/keys/{id}/reset", post(pools::reset_key))
        .route("/{provider}/keys/{id}/limit", put(pools::set_key_limit))
}

/// 用户套餐路由
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/daily-counts/reset", post(users::reset_daily_counts))
        .route("/{id}/entitlement", get(users::get_entitlement))
        .route("/{id}/plan/renew", post(users::renew_plan))
        .route("/{id}/plan/change", post(users::change_plan))
        .route("/{id}/plan/remove", post(users::remove_plan))
}
