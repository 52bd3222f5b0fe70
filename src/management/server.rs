//! # 管理服务器
//!
//! Axum HTTP服务器，提供密钥池与生成任务的管理API

use super::middleware::request_id_middleware;
use crate::app::AppContext;
use crate::config::ServerConfig;
use crate::error::{PlatformError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};
use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::get;
use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// 管理服务器应用状态
#[derive(Clone)]
pub struct AppState {
    context: Arc<AppContext>,
}

impl AppState {
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }
}

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// 管理服务器
pub struct ManagementServer {
    config: ServerConfig,
    router: Router,
}

impl ManagementServer {
    #[must_use]
    pub fn new(config: &ServerConfig, context: Arc<AppContext>) -> Self {
        let router = Self::create_router(AppState::new(context), config);
        Self {
            config: config.clone(),
            router,
        }
    }

    /// 完整路由（含中间件），测试中直接 `oneshot`
    #[must_use]
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    fn create_router(state: AppState, config: &ServerConfig) -> Router {
        let api_routes = super::routes::create_routes(state);

        let mut app = Router::new()
            .nest("/api", api_routes)
            .route("/ping", get(super::handlers::health::ping_handler));

        let service_builder = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout)));

        if config.enable_cors {
            app = app.layer(service_builder.layer(Self::cors_layer(config)));
        } else {
            app = app.layer(service_builder);
        }

        // 最外层，保证追踪与错误响应都能拿到请求ID
        app.layer(axum::middleware::from_fn(request_id_middleware))
    }

    fn cors_layer(config: &ServerConfig) -> CorsLayer {
        let cors_layer = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::CONTENT_TYPE,
                header::AUTHORIZATION,
                header::ACCEPT,
                header::ORIGIN,
                HeaderName::from_static(super::middleware::REQUEST_ID_HEADER),
            ]);

        if config.cors_origins.iter().any(|origin| origin == "*") {
            return cors_layer.allow_origin(Any);
        }

        let origins = config
            .cors_origins
            .iter()
            .map(|origin| origin.parse::<HeaderValue>())
            .collect::<std::result::Result<Vec<_>, _>>();
        match origins {
            Ok(origins) => cors_layer.allow_origin(origins),
            Err(e) => {
                lwarn!(
                    "system",
                    LogStage::Startup,
                    LogComponent::Management,
                    "cors_config_fail",
                    &format!("Invalid CORS origin configuration: {e}, falling back to allow any")
                );
                cors_layer.allow_origin(Any)
            }
        }
    }

    pub fn bind_address(&self) -> Result<SocketAddr> {
        let ip = self
            .config
            .bind_address
            .parse::<std::net::IpAddr>()
            .map_err(|e| {
                PlatformError::config(format!(
                    "Invalid bind address '{}': {e}",
                    self.config.bind_address
                ))
            })?;
        Ok(SocketAddr::new(ip, self.config.port))
    }

    /// 启动服务器，`shutdown` 取消后优雅退出
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.bind_address()?;
        let listener = TcpListener::bind(&addr).await?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Management,
            "server_start",
            &format!("Starting management server on {addr}")
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| PlatformError::network_with_source("Management server error", e))?;

        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Management,
            "server_stopped",
            "Management server stopped"
        );
        Ok(())
    }
}
