//! 错误类型
//!
//! - AgentError：推理引擎与工具层（LLM、工具调用、超时、取消）
//! - SecOpsError：提案工作流与服务装配；Web 层据此区分 404 / 400

use thiserror::Error;

use crate::secops::ProposalStatus;

/// 推理引擎运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Max reasoning steps exceeded: {0}")]
    MaxStepsExceeded(usize),

    #[error("Cancelled")]
    Cancelled,
}

/// 安全运营服务错误
#[derive(Error, Debug)]
pub enum SecOpsError {
    #[error("proposal not found: {0}")]
    ProposalNotFound(String),

    #[error("proposal already processed: {status}")]
    AlreadyProcessed { id: String, status: ProposalStatus },

    /// 配置中的模板覆盖项非法，服务拒绝启动
    #[error("config error: {0}")]
    Config(String),
}

impl SecOpsError {
    /// 未知 ID 类错误（HTTP 404）
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProposalNotFound(_))
    }

    /// 状态冲突（HTTP 400）
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyProcessed { .. })
    }
}
