//! # VidGen Platform Library
//!
//! 套餐权限与配额判定、多服务商密钥轮换池、批量生成任务与管理API

pub mod app;
pub mod config;
pub mod database;
pub mod entitlement;
pub mod error;
pub mod generation;
pub mod key_pool;
pub mod logging;
pub mod management;
pub mod plans;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{PlatformError, Result};
