//! # 批量生成服务
//!
//! 按套餐与轮换设置分批执行生成任务，通过事件通道推送进度。

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::events::{GenerationEvent, ItemStatus};
use super::provider::GenerationProvider;
use crate::config::GenerationConfig;
use crate::entitlement::{
    UserStore, authorize_generation, check_tool_access_at, effective_bulk_limits,
};
use crate::error::{EntitlementError, PlatformError, Result};
use crate::key_pool::{
    CallOutcome, PoolRegistry, Provider, SettingsStore, call_with_key_excluding,
};
use crate::plans::tools;
use crate::{
    ensure_valid, ldebug, lerror, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 批量生成请求
#[derive(Debug, Clone, Deserialize)]
pub struct BulkGenerationRequest {
    pub user_id: i32,
    pub tool: String,
    pub prompts: Vec<String>,
}

/// 单条生成的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl ItemReport {
    fn completed(asset_url: String, attempts: u32) -> Self {
        Self {
            status: ItemStatus::Completed,
            asset_url: Some(asset_url),
            error: None,
            attempts,
        }
    }

    fn failed(error: String, attempts: u32) -> Self {
        Self {
            status: ItemStatus::Failed,
            asset_url: None,
            error: Some(error),
            attempts,
        }
    }

    fn into_event(self, index: usize) -> GenerationEvent {
        GenerationEvent::Result {
            index,
            status: self.status,
            asset_url: self.asset_url,
            error: self.error,
            attempts: self.attempts,
        }
    }
}

/// 一次批量任务的汇总
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// 客户端断开后提前停止
    pub cancelled: bool,
}

/// 校验通过后的执行计划
#[derive(Debug)]
struct RunPlan {
    user_id: i32,
    tool: String,
    provider: Provider,
    prompts: Vec<String>,
    batch_size: usize,
    delay: Duration,
}

pub struct BulkGenerationService {
    users: Arc<dyn UserStore>,
    pools: Arc<PoolRegistry>,
    settings: Arc<dyn SettingsStore>,
    provider: Arc<dyn GenerationProvider>,
    config: GenerationConfig,
}

impl BulkGenerationService {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        pools: Arc<PoolRegistry>,
        settings: Arc<dyn SettingsStore>,
        provider: Arc<dyn GenerationProvider>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            users,
            pools,
            settings,
            provider,
            config,
        }
    }

    fn route(&self, tool: &str) -> Result<Provider> {
        self.config.provider_for_tool(tool).ok_or_else(|| {
            PlatformError::validation(
                format!("未配置工具 {tool} 对应的服务商"),
                Some("tool".to_string()),
            )
        })
    }

    async fn prepare(&self, request: BulkGenerationRequest) -> Result<RunPlan> {
        let tool = request.tool.trim().to_ascii_lowercase();
        ensure_valid!(!tool.is_empty(), "tool", "工具不能为空");
        let provider = self.route(&tool)?;

        let user = self.users.load(request.user_id).await?;
        check_tool_access_at(&user, tools::BULK, Utc::now())?;
        authorize_generation(&user, &tool)?;

        let limits = effective_bulk_limits(&user).ok_or_else(|| EntitlementError::InvalidPlan {
            plan_type: user.plan_type.clone(),
        })?;

        let prompts: Vec<String> = request
            .prompts
            .iter()
            .map(|prompt| prompt.trim())
            .filter(|prompt| !prompt.is_empty())
            .map(str::to_string)
            .collect();
        let max_prompts = usize::try_from(limits.max_prompts).unwrap_or(usize::MAX);
        ensure_valid!(!prompts.is_empty(), "prompts", "至少需要一个提示词");
        ensure_valid!(
            prompts.len() <= max_prompts,
            "prompts",
            "提示词数量 {} 超过套餐上限 {}",
            prompts.len(),
            max_prompts
        );

        let (batch_size, delay_seconds) = if provider == Provider::BearerToken {
            let settings = self.settings.load().await?;
            (
                limits.max_batch.min(settings.videos_per_batch),
                limits.delay_seconds.max(settings.batch_delay_seconds),
            )
        } else {
            (limits.max_batch, limits.delay_seconds)
        };

        Ok(RunPlan {
            user_id: user.id,
            tool,
            provider,
            prompts,
            batch_size: usize::try_from(batch_size.max(1)).unwrap_or(1),
            delay: Duration::from_secs(u64::from(delay_seconds)),
        })
    }

    /// 生成单条，重新校验配额后选择密钥调用服务商
    ///
    /// 服务商失败会换一把未失败过的密钥重试，重试耗尽后以 `Failed` 报告返回；
    /// 权限拒绝与首次选取即池耗尽返回 `Err`。
    async fn generate_item(
        &self,
        user_id: i32,
        tool: &str,
        provider: Provider,
        prompt: &str,
    ) -> Result<ItemReport> {
        let user = self.users.load(user_id).await?;
        authorize_generation(&user, tool)?;

        let pool = self.pools.get(provider);
        let units = pool.unit().estimate_for_prompt(prompt);
        let timeout = Duration::from_secs(self.config.provider_timeout_seconds);
        let max_attempts = self.config.max_attempts_per_item.max(1);
        let mut last_error = String::new();
        let mut tried: Vec<i32> = Vec::new();

        for attempt in 1..=max_attempts {
            let generator = Arc::clone(&self.provider);
            let outcome = match call_with_key_excluding(
                pool.as_ref(),
                units,
                &tried,
                timeout,
                |secret| async move { generator.generate(tool, &secret, prompt).await },
            )
            .await
            {
                Ok(outcome) => outcome,
                // 只剩已失败过的密钥
                Err(err) if err.is_pool_exhausted() && !tried.is_empty() => {
                    return Ok(ItemReport::failed(
                        format!("Generation failed after {} attempts: {last_error}", tried.len()),
                        u32::try_from(tried.len()).unwrap_or(max_attempts),
                    ));
                }
                Err(err) => return Err(err),
            };

            match outcome {
                CallOutcome::Completed { key_id, value } => {
                    let count = self.users.increment_daily_count(user_id).await?;
                    ldebug!(
                        "system",
                        LogStage::Generation,
                        LogComponent::Generation,
                        "item_completed",
                        "生成成功",
                        user_id = user_id,
                        key_id = key_id,
                        daily_video_count = count
                    );
                    return Ok(ItemReport::completed(value.asset_url, attempt));
                }
                CallOutcome::Failed { key_id, error } => {
                    lwarn!(
                        "system",
                        LogStage::Generation,
                        LogComponent::Generation,
                        "item_attempt_failed",
                        &format!("第 {attempt} 次尝试失败: {error}"),
                        user_id = user_id,
                        key_id = key_id
                    );
                    last_error = error.to_string();
                    tried.push(key_id);
                }
            }
        }

        Ok(ItemReport::failed(
            format!("Generation failed after {max_attempts} attempts: {last_error}"),
            max_attempts,
        ))
    }

    /// 单条生成
    pub async fn generate(&self, user_id: i32, tool: &str, prompt: &str) -> Result<ItemReport> {
        let tool = tool.trim().to_ascii_lowercase();
        ensure_valid!(!prompt.trim().is_empty(), "prompt", "提示词不能为空");
        let provider = self.route(&tool)?;
        self.generate_item(user_id, &tool, provider, prompt.trim()).await
    }

    async fn run_item(
        &self,
        plan: &RunPlan,
        index: usize,
        batch: usize,
        prompt: &str,
        sink: &mpsc::Sender<GenerationEvent>,
    ) -> ItemStatus {
        let total = plan.prompts.len();
        let _ = sink
            .send(GenerationEvent::Progress {
                index,
                total,
                batch,
            })
            .await;

        let report = match self
            .generate_item(plan.user_id, &plan.tool, plan.provider, prompt)
            .await
        {
            Ok(report) => report,
            Err(err) => ItemReport::failed(err.public_message(), 0),
        };
        let status = report.status;
        let _ = sink.send(report.into_event(index)).await;
        status
    }

    /// 执行批量任务
    ///
    /// 请求级拒绝只推送一个 `error` 事件并返回错误；通道关闭后不再调度新的条目。
    pub async fn run(
        &self,
        request: BulkGenerationRequest,
        sink: mpsc::Sender<GenerationEvent>,
    ) -> Result<BulkSummary> {
        let user_id = request.user_id;
        let plan = match self.prepare(request).await {
            Ok(plan) => plan,
            Err(err) => {
                let (_, code) = err.to_http_response_parts();
                lwarn!(
                    "system",
                    LogStage::Generation,
                    LogComponent::Generation,
                    "bulk_rejected",
                    &format!("批量任务被拒绝: {err}"),
                    user_id = user_id
                );
                let _ = sink
                    .send(GenerationEvent::Error {
                        code: code.to_string(),
                        message: err.public_message(),
                    })
                    .await;
                return Err(err);
            }
        };

        linfo!(
            "system",
            LogStage::Generation,
            LogComponent::Generation,
            "bulk_started",
            &format!(
                "批量任务开始: {} 条, 每批 {} 条, 间隔 {}s",
                plan.prompts.len(),
                plan.batch_size,
                plan.delay.as_secs()
            ),
            user_id = plan.user_id,
            provider = %plan.provider
        );

        let mut summary = BulkSummary::default();
        for (batch, chunk) in plan.prompts.chunks(plan.batch_size).enumerate() {
            if batch > 0 && !plan.delay.is_zero() {
                tokio::select! {
                    () = sink.closed() => {}
                    () = tokio::time::sleep(plan.delay) => {}
                }
            }
            if sink.is_closed() {
                summary.cancelled = true;
                break;
            }

            let offset = batch * plan.batch_size;
            let statuses = join_all(chunk.iter().enumerate().map(|(position, prompt)| {
                self.run_item(&plan, offset + position, batch, prompt, &sink)
            }))
            .await;

            for status in statuses {
                match status {
                    ItemStatus::Completed => summary.succeeded += 1,
                    ItemStatus::Failed => summary.failed += 1,
                }
            }
        }

        if summary.cancelled {
            lwarn!(
                "system",
                LogStage::Generation,
                LogComponent::Generation,
                "bulk_cancelled",
                "客户端已断开，停止调度剩余条目",
                user_id = plan.user_id
            );
        } else if sink
            .send(GenerationEvent::Complete {
                succeeded: summary.succeeded,
                failed: summary.failed,
            })
            .await
            .is_err()
        {
            lerror!(
                "system",
                LogStage::Generation,
                LogComponent::Generation,
                "complete_not_delivered",
                "完成事件未能送达",
                user_id = plan.user_id
            );
        }

        linfo!(
            "system",
            LogStage::Generation,
            LogComponent::Generation,
            "bulk_finished",
            &format!(
                "批量任务结束: 成功 {}, 失败 {}",
                summary.succeeded, summary.failed
            ),
            user_id = plan.user_id
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolsConfig;
    use crate::key_pool::{ProviderCallError, RotationSettings};
    use crate::testing::{
        MemoryUserStore, MockGenerator, UserFixture, far_future, memory_registry,
        succeeding_generator,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        service: BulkGenerationService,
        users: Arc<MemoryUserStore>,
        pools: Arc<PoolRegistry>,
        settings: Arc<crate::key_pool::MemorySettingsStore>,
    }

    fn harness(user: UserFixture, generator: MockGenerator) -> Harness {
        let users = Arc::new(MemoryUserStore::with_users([user.snapshot(1)]));
        let (pools, settings) = memory_registry(&PoolsConfig::default());
        let service = BulkGenerationService::new(
            users.clone(),
            pools.clone(),
            settings.clone(),
            Arc::new(generator),
            GenerationConfig::default(),
        );
        Harness {
            service,
            users,
            pools,
            settings,
        }
    }

    fn request(tool: &str, count: usize) -> BulkGenerationRequest {
        BulkGenerationRequest {
            user_id: 1,
            tool: tool.to_string(),
            prompts: (0..count).map(|i| format!("prompt number {i}")).collect(),
        }
    }

    async fn collect(
        service: &BulkGenerationService,
        request: BulkGenerationRequest,
    ) -> (Result<BulkSummary>, Vec<GenerationEvent>) {
        let (tx, mut rx) = mpsc::channel::<GenerationEvent>(64);
        let summary = service.run(request, tx).await;
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        (summary, events)
    }

    fn results(events: &[GenerationEvent]) -> Vec<(usize, ItemStatus)> {
        let mut results: Vec<_> = events
            .iter()
            .filter_map(|event| match event {
                GenerationEvent::Result { index, status, .. } => Some((*index, *status)),
                _ => None,
            })
            .collect();
        results.sort_by_key(|(index, _)| *index);
        results
    }

    #[tokio::test]
    async fn test_each_item_gets_exactly_one_result() {
        let h = harness(
            UserFixture::new().plan("scale").expiring(far_future()),
            succeeding_generator(),
        );
        h.pools.flow_cookie().add("flow-cookie-0001", None).await.unwrap();
        h.pools.flow_cookie().add("flow-cookie-0002", None).await.unwrap();

        let (summary, events) = collect(&h.service, request("video", 3)).await;
        let summary = summary.unwrap();

        assert_eq!((summary.succeeded, summary.failed), (3, 0));
        assert_eq!(
            results(&events),
            vec![
                (0, ItemStatus::Completed),
                (1, ItemStatus::Completed),
                (2, ItemStatus::Completed)
            ]
        );
        assert_eq!(
            events.last(),
            Some(&GenerationEvent::Complete {
                succeeded: 3,
                failed: 0
            })
        );
        assert_eq!(h.users.load(1).await.unwrap().daily_video_count, 3);
    }

    #[tokio::test]
    async fn test_request_level_denial_is_single_error_event() {
        let h = harness(UserFixture::new().plan("free"), MockGenerator::new());

        let (summary, events) = collect(&h.service, request("video", 2)).await;
        assert!(summary.is_err());
        assert_eq!(events.len(), 1);
        match &events[0] {
            GenerationEvent::Error { code, message } => {
                assert_eq!(code, "TOOL_NOT_ALLOWED");
                assert!(message.contains("Free"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prompt_count_is_bounded_by_plan() {
        let h = harness(UserFixture::new().plan("scale"), MockGenerator::new());

        let (_, events) = collect(&h.service, request("video", 51)).await;
        assert!(matches!(
            &events[..],
            [GenerationEvent::Error { code, .. }] if code == "VALIDATION_ERROR"
        ));

        let (_, events) = collect(&h.service, request("video", 0)).await;
        assert!(matches!(&events[..], [GenerationEvent::Error { .. }]));
    }

    #[tokio::test]
    async fn test_failed_attempt_retries_on_another_key() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut generator = MockGenerator::new();
        let counter = calls.clone();
        generator.expect_generate().returning(move |_, _, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ProviderCallError::Rejected {
                    status: Some(401),
                    message: "cookie expired".to_string(),
                })
            } else {
                Ok(crate::generation::GeneratedAsset {
                    asset_url: "https://cdn.test/video".to_string(),
                })
            }
        });
        let h = harness(UserFixture::new().plan("scale"), generator);
        h.pools.flow_cookie().add("flow-cookie-0001", None).await.unwrap();
        h.pools.flow_cookie().add("flow-cookie-0002", None).await.unwrap();

        let report = h.service.generate(1, "video", "one prompt").await.unwrap();
        assert_eq!(report.status, ItemStatus::Completed);
        assert_eq!(report.attempts, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let keys = h.pools.flow_cookie().list().await.unwrap();
        assert_eq!(keys.iter().map(|key| key.error_count).sum::<u32>(), 1);
        assert_eq!(keys.iter().map(|key| key.units_used).sum::<u64>(), 1);
    }

    #[tokio::test]
    async fn test_failed_key_is_not_retried_for_same_item() {
        let mut generator = MockGenerator::new();
        generator.expect_generate().times(1).returning(|_, _, _| {
            Err(ProviderCallError::Rejected {
                status: Some(429),
                message: "rate limited".to_string(),
            })
        });
        let h = harness(UserFixture::new().plan("enterprise"), generator);
        h.pools.bearer_token().add("bearer-token-only-01", None).await.unwrap();

        let report = h.service.generate(1, "script", "one prompt").await.unwrap();
        assert_eq!(report.status, ItemStatus::Failed);
        assert_eq!(report.attempts, 1);
        assert!(report.error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_empty_pool_fails_items_without_calling_provider() {
        let mut generator = MockGenerator::new();
        generator.expect_generate().never();
        let h = harness(UserFixture::new().plan("scale"), generator);

        let (summary, events) = collect(&h.service, request("voice", 2)).await;
        assert_eq!(summary.unwrap().failed, 2);
        let messages: Vec<&str> = events
            .iter()
            .filter_map(|event| match event {
                GenerationEvent::Result { error, .. } => error.as_deref(),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.contains("temporarily unavailable")));
        assert_eq!(h.users.load(1).await.unwrap().daily_video_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_limit_is_rechecked_per_item() {
        let h = harness(
            UserFixture::new().plan("scale").used(998),
            succeeding_generator(),
        );
        h.settings
            .save(RotationSettings {
                videos_per_batch: 1,
                batch_delay_seconds: 0,
                ..RotationSettings::default()
            })
            .await
            .unwrap();
        h.pools.bearer_token().add("bearer-token-0001", None).await.unwrap();

        let (summary, events) = collect(&h.service, request("bulk", 3)).await;
        assert_eq!(summary.unwrap(), BulkSummary {
            succeeded: 2,
            failed: 1,
            cancelled: false
        });
        assert_eq!(
            results(&events),
            vec![
                (0, ItemStatus::Completed),
                (1, ItemStatus::Completed),
                (2, ItemStatus::Failed)
            ]
        );
        assert_eq!(h.users.load(1).await.unwrap().daily_video_count, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_sink_stops_scheduling() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut generator = MockGenerator::new();
        generator.expect_generate().returning(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(crate::generation::GeneratedAsset {
                asset_url: "https://cdn.test/bulk".to_string(),
            })
        });
        let h = harness(UserFixture::new().plan("scale"), generator);
        h.settings
            .save(RotationSettings {
                videos_per_batch: 1,
                ..RotationSettings::default()
            })
            .await
            .unwrap();
        h.pools.bearer_token().add("bearer-token-0001", None).await.unwrap();

        let (tx, mut rx) = mpsc::channel::<GenerationEvent>(8);
        let consumer = tokio::spawn(async move {
            // 收到第一条结果后断开
            while let Some(event) = rx.recv().await {
                if event.is_terminal_item() {
                    break;
                }
            }
        });
        let summary = h.service.run(request("bulk", 5), tx).await.unwrap();
        consumer.await.unwrap();

        assert!(summary.cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
