//! # 用量记录器
//!
//! 把"选密钥 → 调服务商 → 记录结果"串成一次调用。服务商侧的失败以
//! [`CallOutcome::Failed`] 返回，不作为错误向上传播。

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use super::lease::KeyLease;
use super::pool::ManagedPool;
use crate::error::Result;
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

/// 服务商调用失败原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderCallError {
    #[error("provider call timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("provider rejected the request (status {status:?}): {message}")]
    Rejected { status: Option<u16>, message: String },

    #[error("provider transport error: {0}")]
    Transport(String),
}

/// 一次带密钥调用的结果
#[derive(Debug)]
pub enum CallOutcome<T> {
    Completed { key_id: i32, value: T },
    Failed { key_id: i32, error: ProviderCallError },
}

impl<T> CallOutcome<T> {
    #[must_use]
    pub const fn key_id(&self) -> i32 {
        match self {
            Self::Completed { key_id, .. } | Self::Failed { key_id, .. } => *key_id,
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// 在超时限制内执行服务商调用，并根据结果提交租约
pub async fn settle_lease<T, Fut>(
    lease: KeyLease,
    timeout: Duration,
    call: Fut,
) -> Result<CallOutcome<T>>
where
    Fut: Future<Output = std::result::Result<T, ProviderCallError>>,
{
    let key_id = lease.key_id();
    let provider = lease.provider();

    let result = match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderCallError::Timeout { after: timeout }),
    };

    match result {
        Ok(value) => {
            lease.complete().await?;
            ldebug!(
                "system",
                LogStage::Usage,
                LogComponent::UsageRecorder,
                "call_completed",
                "服务商调用成功",
                provider = %provider,
                key_id = key_id
            );
            Ok(CallOutcome::Completed { key_id, value })
        }
        Err(error) => {
            lwarn!(
                "system",
                LogStage::Usage,
                LogComponent::UsageRecorder,
                "call_failed",
                &format!("服务商调用失败: {error}"),
                provider = %provider,
                key_id = key_id
            );
            lease.fail(&error.to_string()).await?;
            Ok(CallOutcome::Failed { key_id, error })
        }
    }
}

/// 选取密钥并执行调用
///
/// 仅在池耗尽或存储出错时返回 `Err`。`call` 接收所选密钥的明文凭据。
pub async fn call_with_key<T, F, Fut>(
    pool: &dyn ManagedPool,
    units: u64,
    timeout: Duration,
    call: F,
) -> Result<CallOutcome<T>>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = std::result::Result<T, ProviderCallError>>,
{
    call_with_key_excluding(pool, units, &[], timeout, call).await
}

/// 同 [`call_with_key`]，不选择 `exclude` 中的密钥
pub async fn call_with_key_excluding<T, F, Fut>(
    pool: &dyn ManagedPool,
    units: u64,
    exclude: &[i32],
    timeout: Duration,
    call: F,
) -> Result<CallOutcome<T>>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = std::result::Result<T, ProviderCallError>>,
{
    let lease = pool.acquire_units(units, exclude).await?;
    let secret = lease.secret().to_string();
    settle_lease(lease, timeout, call(secret)).await
}
