//! # 生成模块
//!
//! 单条与批量生成：权限校验、选密钥、调用服务商、记录用量与配额。

mod events;
mod provider;
mod service;

pub use events::{GenerationEvent, ItemStatus};
pub use provider::{GeneratedAsset, GenerationProvider, HttpGenerationProvider};
pub use service::{BulkGenerationRequest, BulkGenerationService, BulkSummary, ItemReport};
