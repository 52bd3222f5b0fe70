//! # API 响应结构
//!
//! 统一的 JSON 响应格式 `{success, data?, message?, error?, timestamp}`。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::{
    lerror,
    logging::{LogComponent, LogStage},
};

/// # 标准成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// # 标准错误信息
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// # 标准错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
    pub timestamp: DateTime<Utc>,
}

/// # API响应枚举
///
/// 统一所有API出口，方便转换为 `axum::response::Response`
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithMessage(T, String),
    SuccessWithoutData(String),
    Error(StatusCode, String, String),
    AppError(PlatformError),
}

fn error_body(status: StatusCode, code: String, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: ErrorInfo { code, message },
            timestamp: Utc::now(),
        }),
    )
        .into_response()
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => Json(SuccessResponse {
                success: true,
                data: Some(data),
                message: None,
                timestamp: Utc::now(),
            })
            .into_response(),
            Self::SuccessWithMessage(data, message) => Json(SuccessResponse {
                success: true,
                data: Some(data),
                message: Some(message),
                timestamp: Utc::now(),
            })
            .into_response(),
            Self::SuccessWithoutData(message) => Json(SuccessResponse::<()> {
                success: true,
                data: None,
                message: Some(message),
                timestamp: Utc::now(),
            })
            .into_response(),
            Self::Error(status, code, message) => error_body(status, code, message),
            Self::AppError(error) => {
                let (status, code) = error.to_http_response_parts();
                // 服务端错误只记录详情，不向调用方暴露内部信息
                let message = if status.is_server_error() && !error.is_pool_exhausted() {
                    lerror!(
                        "system",
                        LogStage::Admin,
                        LogComponent::Management,
                        "request_failed",
                        &format!("请求处理失败: {error:?}")
                    );
                    "Internal server error".to_string()
                } else {
                    error.public_message()
                };
                error_body(status, code.to_string(), message)
            }
        }
    }
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::AppError(self).into_response()
    }
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：带消息的成功响应
pub fn success_with_message<T: Serialize>(data: T, message: &str) -> Response {
    ApiResponse::SuccessWithMessage(data, message.to_string()).into_response()
}

/// # 便捷函数：无数据体的成功响应
pub fn success_without_data(message: &str) -> Response {
    ApiResponse::<()>::SuccessWithoutData(message.to_string()).into_response()
}

/// # 便捷函数：HTTP错误响应
pub fn error(status: StatusCode, code: &str, message: &str) -> Response {
    ApiResponse::<()>::Error(status, code.to_string(), message.to_string()).into_response()
}

/// # 便捷函数：应用错误响应
pub fn app_error(error: PlatformError) -> Response {
    ApiResponse::<()>::AppError(error).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EntitlementError, KeyPoolError};
    use crate::key_pool::Provider;
    use http_body_util::BodyExt;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_entitlement_error_body() {
        let response = app_error(EntitlementError::DailyLimitReached { limit: 1000 }.into());
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_of(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "DAILY_LIMIT_REACHED");
    }

    #[tokio::test]
    async fn test_pool_exhausted_keeps_public_message() {
        let response = app_error(
            KeyPoolError::PoolExhausted {
                provider: Provider::Zyphra,
            }
            .into(),
        );
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_of(response).await;
        assert!(
            body["error"]["message"]
                .as_str()
                .unwrap()
                .contains("temporarily unavailable")
        );
    }

    #[tokio::test]
    async fn test_internal_error_is_masked() {
        let response = app_error(PlatformError::database("connection reset by peer"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert_eq!(body["error"]["message"], "Internal server error");
    }
}
