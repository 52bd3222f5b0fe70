//! # 轮换窗口任务
//!
//! 每个轮换间隔清零 Bearer Token 的 `request_count`，间隔每轮从设置中重新读取。

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::rotation_settings::SettingsStore;
use super::store::KeyStore;
use super::types::Provider;
use crate::error::Result;
use crate::{
    ldebug, lerror, linfo,
    logging::{LogComponent, LogStage},
};

/// 设置读取失败时的重试间隔
const RETRY_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RotationWindowTask {
    store: Arc<dyn KeyStore>,
    settings: Arc<dyn SettingsStore>,
    cancel: CancellationToken,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RotationWindowTask {
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            settings,
            cancel: CancellationToken::new(),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    /// 执行一次窗口重置，返回被清零的令牌数
    pub async fn run_once(&self) -> Result<u64> {
        let reset = self
            .store
            .reset_request_counts(Provider::BearerToken)
            .await?;
        ldebug!(
            "system",
            LogStage::Background,
            LogComponent::RotationTask,
            "window_reset",
            &format!("轮换窗口重置，清零 {reset} 个令牌的请求计数")
        );
        Ok(reset)
    }

    async fn next_interval(&self) -> Duration {
        match self.settings.load().await {
            Ok(settings) => {
                Duration::from_secs(u64::from(settings.rotation_interval_minutes.max(1)) * 60)
            }
            Err(err) => {
                lerror!(
                    "system",
                    LogStage::Background,
                    LogComponent::RotationTask,
                    "load_settings_failed",
                    &format!("读取轮换设置失败: {err}")
                );
                RETRY_INTERVAL
            }
        }
    }

    pub async fn start(&self) {
        let mut guard = self.handle.lock().await;
        if guard.is_some() {
            return;
        }

        let task = self.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                let interval = task.next_interval().await;
                tokio::select! {
                    () = task.cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                if let Err(err) = task.run_once().await {
                    lerror!(
                        "system",
                        LogStage::Background,
                        LogComponent::RotationTask,
                        "window_reset_failed",
                        &format!("轮换窗口重置失败: {err}")
                    );
                }
            }
        }));

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::RotationTask,
            "rotation_task_started",
            "Rotation window task started"
        );
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::RotationTask,
            "rotation_task_stopped",
            "Rotation window task stopped"
        );
    }
}
