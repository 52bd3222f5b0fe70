//! # 日志配置模块
//!
//! 统一的结构化日志宏与 tracing 订阅器初始化。所有业务日志都携带
//! `request_id` / `stage` / `component` / `operation` 四个固定字段。

use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志所处的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogStage {
    Startup,
    Shutdown,
    Entitlement,
    Scheduling,
    Usage,
    Generation,
    Admin,
    Db,
    Background,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Entitlement => "entitlement",
            Self::Scheduling => "scheduling",
            Self::Usage => "usage",
            Self::Generation => "generation",
            Self::Admin => "admin",
            Self::Db => "db",
            Self::Background => "background",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogComponent {
    Main,
    Config,
    Database,
    PlanRegistry,
    Entitlement,
    KeyPool,
    Selector,
    UsageRecorder,
    Generation,
    Management,
    RotationTask,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Database => "database",
            Self::PlanRegistry => "plan_registry",
            Self::Entitlement => "entitlement",
            Self::KeyPool => "key_pool",
            Self::Selector => "selector",
            Self::UsageRecorder => "usage_recorder",
            Self::Generation => "generation",
            Self::Management => "management",
            Self::RotationTask => "rotation_task",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __structured_log {
    ($level:ident, $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr) => {
        ::tracing::$level!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}",
            $message
        )
    };
    ($level:ident, $request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr, $($fields:tt)+) => {
        ::tracing::$level!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($fields)+,
            "{}",
            $message
        )
    };
}

/// INFO 级别结构化日志
#[macro_export]
macro_rules! linfo {
    ($($args:tt)+) => {
        $crate::__structured_log!(info, $($args)+)
    };
}

/// DEBUG 级别结构化日志
#[macro_export]
macro_rules! ldebug {
    ($($args:tt)+) => {
        $crate::__structured_log!(debug, $($args)+)
    };
}

/// WARN 级别结构化日志
#[macro_export]
macro_rules! lwarn {
    ($($args:tt)+) => {
        $crate::__structured_log!(warn, $($args)+)
    };
}

/// ERROR 级别结构化日志
#[macro_export]
macro_rules! lerror {
    ($($args:tt)+) => {
        $crate::__structured_log!(error, $($args)+)
    };
}

/// 构建默认的日志过滤规则
#[must_use]
pub fn default_filter(log_level: Option<&str>) -> String {
    let level = log_level.unwrap_or("info");
    // 默认关闭 SQL 语句级别日志
    format!("{level},vidgen=debug,sqlx::query=off,sea_orm::query=warn,sqlx=warn")
}

/// 初始化优化的日志系统
///
/// `RUST_LOG` 存在时优先使用，否则使用 [`default_filter`]。重复调用是安全的。
pub fn init_optimized_logging(log_level: Option<&str>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    let initialized = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!("📋 Logging initialized");
    }
}
