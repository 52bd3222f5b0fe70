//! # 生成处理器
//!
//! 单条生成返回 JSON，批量生成以 SSE 推送进度。

use axum::Json;
use axum::extract::{Extension, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;
use crate::generation::{BulkGenerationRequest, GenerationEvent};
use crate::management::middleware::RequestId;
use crate::management::{response, server::AppState};
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

/// 事件通道容量
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub user_id: i32,
    pub tool: String,
    pub prompt: String,
}

pub async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Result<Response> {
    let report = state
        .generation
        .generate(request.user_id, &request.tool, &request.prompt)
        .await?;
    Ok(response::success(report))
}

fn to_sse_event(event: &GenerationEvent) -> Event {
    let name = event.name();
    Event::default()
        .event(name)
        .json_data(event)
        .unwrap_or_else(|_| Event::default().event(name).data("{}"))
}

/// 批量生成
///
/// 客户端断开后接收端被丢弃，运行器停止调度剩余条目。
pub async fn generate_bulk(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<BulkGenerationRequest>,
) -> Response {
    let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
    let service = state.generation.clone();
    let user_id = request.user_id;

    tokio::spawn(async move {
        match service.run(request, sender).await {
            Ok(summary) => ldebug!(
                request_id.as_str(),
                LogStage::Generation,
                LogComponent::Management,
                "bulk_stream_finished",
                &format!(
                    "批量流结束: 成功 {}, 失败 {}, 中断 {}",
                    summary.succeeded, summary.failed, summary.cancelled
                ),
                user_id = user_id
            ),
            Err(err) => lwarn!(
                request_id.as_str(),
                LogStage::Generation,
                LogComponent::Management,
                "bulk_stream_rejected",
                &format!("批量请求被拒绝: {err}"),
                user_id = user_id
            ),
        }
    });

    let stream = ReceiverStream::new(receiver)
        .map(|event| Ok::<_, Infallible>(to_sse_event(&event)));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
