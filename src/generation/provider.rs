//! # 生成服务商客户端

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PlatformError, Result};
use crate::key_pool::ProviderCallError;

/// 一次生成的产物
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedAsset {
    pub asset_url: String,
}

/// 外部媒体生成服务
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        tool: &str,
        secret: &str,
        prompt: &str,
    ) -> std::result::Result<GeneratedAsset, ProviderCallError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    tool: &'a str,
    prompt: &'a str,
}

/// 基于 reqwest 的 HTTP 实现，密钥作为 Bearer 凭据发送
pub struct HttpGenerationProvider {
    client: Client,
    endpoint: String,
}

impl HttpGenerationProvider {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        crate::ensure_config!(!endpoint.trim().is_empty(), "生成服务地址不能为空");
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PlatformError::network_with_source("无法创建 HTTP 客户端", e))?;
        Ok(Self { client, endpoint })
    }
}

fn transport_error(err: &reqwest::Error) -> ProviderCallError {
    if err.is_timeout() {
        return ProviderCallError::Transport(format!("request timed out: {err}"));
    }
    ProviderCallError::Transport(err.to_string())
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(
        &self,
        tool: &str,
        secret: &str,
        prompt: &str,
    ) -> std::result::Result<GeneratedAsset, ProviderCallError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(secret)
            .json(&GenerateRequest { tool, prompt })
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderCallError::Rejected {
                status: Some(status.as_u16()),
                message: body.chars().take(200).collect(),
            });
        }

        response
            .json::<GeneratedAsset>()
            .await
            .map_err(|e| ProviderCallError::Rejected {
                status: Some(status.as_u16()),
                message: format!("invalid provider response: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider(server: &MockServer) -> HttpGenerationProvider {
        HttpGenerationProvider::new(
            format!("{}/v1/generate", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_endpoint_is_config_error() {
        let result = HttpGenerationProvider::new("  ", Duration::from_secs(5));
        assert!(matches!(result, Err(PlatformError::Config { .. })));
    }

    #[tokio::test]
    async fn test_sends_key_as_bearer_and_reads_asset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(header("authorization", "Bearer token-abc"))
            .and(body_json(serde_json::json!({"tool": "video", "prompt": "a cat"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"asset_url": "https://cdn.test/1.mp4"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let asset = provider(&server)
            .await
            .generate("video", "token-abc", "a cat")
            .await
            .unwrap();
        assert_eq!(asset.asset_url, "https://cdn.test/1.mp4");
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .generate("voice", "token-abc", "hello")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ProviderCallError::Rejected {
                status: Some(429),
                message: "quota exceeded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .await
            .generate("video", "token-abc", "a cat")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderCallError::Rejected { status: Some(200), .. }));
    }
}
