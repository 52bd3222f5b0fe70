//! 健康检查处理器

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use serde::Serialize;

use crate::key_pool::{PoolStats, Provider};
use crate::management::{response, server::AppState};
use crate::{
    lerror,
    logging::{LogComponent, LogStage},
};

#[derive(Debug, Serialize)]
pub struct PoolHealth {
    pub provider: Provider,
    pub display_name: &'static str,
    #[serde(flatten)]
    pub stats: PoolStats,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: bool,
    pub pools: Vec<PoolHealth>,
    pub checked_at: chrono::DateTime<Utc>,
}

pub async fn health_check(State(state): State<AppState>) -> Response {
    let database = match state.db.ping().await {
        Ok(()) => true,
        Err(err) => {
            lerror!(
                "system",
                LogStage::Db,
                LogComponent::Management,
                "db_ping_failed",
                &format!("数据库不可用: {err}")
            );
            false
        }
    };

    if !database {
        return response::error(
            StatusCode::SERVICE_UNAVAILABLE,
            "DATABASE_UNAVAILABLE",
            "Database is unavailable",
        );
    }

    let pools = match state.pools.stats_all().await {
        Ok(stats) => stats
            .into_iter()
            .map(|(provider, stats)| PoolHealth {
                provider,
                display_name: provider.display_name(),
                stats,
            })
            .collect(),
        Err(err) => return response::app_error(err),
    };

    response::success(HealthReport {
        status: "healthy",
        database,
        pools,
        checked_at: Utc::now(),
    })
}

pub async fn ping_handler() -> &'static str {
    "pong"
}
