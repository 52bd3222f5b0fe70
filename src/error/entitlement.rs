use thiserror::Error;

/// 套餐权限拒绝原因
///
/// `Display` 文本直接展示给最终用户。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntitlementError {
    #[error("Invalid plan configuration. Please contact support.")]
    InvalidPlan { plan_type: String },

    #[error("Your plan has expired. Please renew to continue using this tool.")]
    PlanExpired,

    #[error("This tool is not available on your {plan_name} plan. Please upgrade to access it.")]
    ToolNotAllowed { plan_name: String, tool: String },

    #[error("Daily video limit reached ({limit} videos). Please try again tomorrow or upgrade your plan.")]
    DailyLimitReached { limit: u32 },
}

impl EntitlementError {
    /// 对外暴露的稳定错误码
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPlan { .. } => "INVALID_PLAN",
            Self::PlanExpired => "PLAN_EXPIRED",
            Self::ToolNotAllowed { .. } => "TOOL_NOT_ALLOWED",
            Self::DailyLimitReached { .. } => "DAILY_LIMIT_REACHED",
        }
    }
}
