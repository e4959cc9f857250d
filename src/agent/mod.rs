//! 推理引擎
//!
//! 调度器只依赖 ReasoningEngine：给定自然语言任务、渠道与会话 ID，跑一轮推理并返回文本结果。
//! ReactEngine 是内置实现：LLM 规划 -> 调用工具 -> 观察 -> 直到给出最终回复。

pub mod react;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;

pub use react::{parse_llm_output, PlannerOutput, ReactEngine, ToolCall};

/// 推理引擎 trait
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// 处理一轮推理；cancel 被取消时实现应尽快返回 AgentError::Cancelled
    async fn process(
        &self,
        prompt: &str,
        channel: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<String, AgentError>;
}
