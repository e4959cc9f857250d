//! Mock LLM 客户端（用于测试与本地调试，无需 API）
//!
//! 按顺序返回预设回复；脚本用完后回复固定的最终答案。每次调用收到的消息都会被记录，
//! 便于测试断言 prompt 与历史内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 脚本用完后的默认回复
pub const MOCK_FINAL_ANSWER: &str = "No further action required.";

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::new();
        for r in responses {
            client.push_response(r);
        }
        client
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.lock_script().push_back(Ok(response.into()));
    }

    pub fn push_error(&self, error: impl Into<String>) {
        self.lock_script().push_back(Err(error.into()));
    }

    /// 到目前为止每次调用收到的完整消息列表
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        self.lock_script()
            .pop_front()
            .unwrap_or_else(|| Ok(MOCK_FINAL_ANSWER.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_then_default() {
        let llm = MockLlmClient::with_responses(["first"]);
        llm.push_error("down");
        assert_eq!(llm.complete(&[Message::user("hi")]).await.unwrap(), "first");
        assert_eq!(llm.complete(&[]).await.unwrap_err(), "down");
        assert_eq!(llm.complete(&[]).await.unwrap(), MOCK_FINAL_ANSWER);
        assert_eq!(llm.calls().len(), 3);
        assert_eq!(llm.calls()[0][0].content, "hi");
    }
}
