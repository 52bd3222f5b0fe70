//! # 管理API模块
//!
//! 密钥池、轮换设置、用户套餐与生成任务的HTTP接口

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use routes::create_routes;
pub use server::{AppState, ManagementServer};
