//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容端点 / 脚本化 Mock）实现 LlmClient。

use async_trait::async_trait;

use crate::llm::Message;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
