//! # 批量生成事件
//!
//! 通过 SSE 推送给客户端的进度事件。

use serde::Serialize;

/// 单条结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationEvent {
    /// 开始处理某一条
    Progress {
        index: usize,
        total: usize,
        batch: usize,
    },
    /// 某一条的最终结果，每条恰好一次
    Result {
        index: usize,
        status: ItemStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        asset_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        attempts: u32,
    },
    /// 全部完成
    Complete { succeeded: usize, failed: usize },
    /// 请求级拒绝
    Error { code: String, message: String },
}

impl GenerationEvent {
    /// SSE 事件名
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Progress { .. } => "progress",
            Self::Result { .. } => "result",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    #[must_use]
    pub const fn is_terminal_item(&self) -> bool {
        matches!(self, Self::Result { .. })
    }
}
