//! # 套餐注册表
//!
//! 静态、不可变的套餐配置表。未知套餐类型返回 `None`，调用方按"无权限"处理。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 工具标识
pub mod tools {
    pub const VIDEO: &str = "video";
    pub const BULK: &str = "bulk";
    pub const VOICE: &str = "voice";
    pub const NARRATION: &str = "narration";
    pub const CHARACTER: &str = "character";
    pub const IMAGE: &str = "image";
    pub const SCRIPT: &str = "script";
}

/// 套餐类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Free,
    Scale,
    Empire,
    Enterprise,
}

impl PlanType {
    pub const ALL: [Self; 4] = [Self::Free, Self::Scale, Self::Empire, Self::Enterprise];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Scale => "scale",
            Self::Empire => "empire",
            Self::Enterprise => "enterprise",
        }
    }

    /// 宽松解析：忽略首尾空白与大小写
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|plan| plan.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown plan type: {s}"))
    }
}

/// 批量生成限制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkGenerationLimits {
    /// 单批并发条目数
    pub max_batch: u32,
    /// 批次间隔（秒）
    pub delay_seconds: u32,
    /// 单次任务最多提示词数
    pub max_prompts: u32,
}

/// 套餐配置
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct PlanConfig {
    pub plan_type: PlanType,
    /// 展示名称，出现在升级提示中
    pub name: &'static str,
    pub daily_limit: u32,
    pub allowed_tools: &'static [&'static str],
    pub bulk_generation: BulkGenerationLimits,
    /// 剩余额度仅展示为无限，实际仍按 `daily_limit` 限制
    pub display_unlimited: bool,
}

impl PlanConfig {
    #[must_use]
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.allowed_tools.iter().any(|allowed| *allowed == tool)
    }
}

static PLAN_CONFIGS: [PlanConfig; 4] = [
    PlanConfig {
        plan_type: PlanType::Free,
        name: "Free",
        daily_limit: 0,
        allowed_tools: &[],
        bulk_generation: BulkGenerationLimits {
            max_batch: 0,
            delay_seconds: 0,
            max_prompts: 0,
        },
        display_unlimited: false,
    },
    PlanConfig {
        plan_type: PlanType::Scale,
        name: "Scale",
        daily_limit: 1000,
        allowed_tools: &[tools::VIDEO, tools::BULK, tools::VOICE, tools::NARRATION],
        bulk_generation: BulkGenerationLimits {
            max_batch: 5,
            delay_seconds: 20,
            max_prompts: 50,
        },
        display_unlimited: false,
    },
    PlanConfig {
        plan_type: PlanType::Empire,
        name: "Empire",
        daily_limit: 2000,
        allowed_tools: &[
            tools::VIDEO,
            tools::BULK,
            tools::VOICE,
            tools::NARRATION,
            tools::CHARACTER,
            tools::IMAGE,
        ],
        bulk_generation: BulkGenerationLimits {
            max_batch: 10,
            delay_seconds: 10,
            max_prompts: 200,
        },
        display_unlimited: true,
    },
    PlanConfig {
        plan_type: PlanType::Enterprise,
        name: "Enterprise",
        daily_limit: 5000,
        allowed_tools: &[
            tools::VIDEO,
            tools::BULK,
            tools::VOICE,
            tools::NARRATION,
            tools::CHARACTER,
            tools::IMAGE,
            tools::SCRIPT,
        ],
        bulk_generation: BulkGenerationLimits {
            max_batch: 20,
            delay_seconds: 5,
            max_prompts: 500,
        },
        display_unlimited: false,
    },
];

/// 按套餐类型字符串查找配置
#[must_use]
pub fn get_plan_config(plan_type: &str) -> Option<&'static PlanConfig> {
    PlanType::parse(plan_type).map(plan_config)
}

#[must_use]
pub fn plan_config(plan_type: PlanType) -> &'static PlanConfig {
    match plan_type {
        PlanType::Free => &PLAN_CONFIGS[0],
        PlanType::Scale => &PLAN_CONFIGS[1],
        PlanType::Empire => &PLAN_CONFIGS[2],
        PlanType::Enterprise => &PLAN_CONFIGS[3],
    }
}

#[must_use]
pub fn all_plans() -> &'static [PlanConfig] {
    &PLAN_CONFIGS
}
