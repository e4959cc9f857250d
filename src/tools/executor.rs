//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时；超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）。
//! 每次调用输出一行结构化审计日志（JSON），参数只记录前 200 个字符。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{Tool, ToolRegistry};

/// 审计日志中参数预览的最大字符数
const ARGS_PREVIEW_CHARS: usize = 200;

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("late".into())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "fails"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            Err("boom".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let executor = ToolExecutor::new(registry, 1);
        let err = executor.execute("slow", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(name) if name == "slow"));
    }

    #[tokio::test]
    async fn test_error_maps_to_execution_failed() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool);
        let executor = ToolExecutor::new(registry, 5);
        let err = executor.execute("fail", Value::Null).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(msg) if msg == "boom"));
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = Value::String("x".repeat(500));
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), ARGS_PREVIEW_CHARS + 3);
    }
}
