use crate::app::context::AppContext;
use crate::key_pool::RotationWindowTask;
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};
use std::sync::Arc;

/// 后台任务集合，统一管理生命周期
pub struct AppTasks {
    rotation_window: RotationWindowTask,
}

impl AppTasks {
    #[must_use]
    pub fn new(context: &AppContext) -> Arc<Self> {
        Arc::new(Self {
            rotation_window: RotationWindowTask::new(
                Arc::clone(&context.keys),
                Arc::clone(&context.settings),
            ),
        })
    }

    #[must_use]
    pub const fn rotation_window(&self) -> &RotationWindowTask {
        &self.rotation_window
    }

    pub async fn start_all(&self) {
        self.rotation_window.start().await;
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "tasks_started",
            "后台任务已启动"
        );
    }

    pub async fn stop_all(&self) {
        self.rotation_window.stop().await;
    }
}
