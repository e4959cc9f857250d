//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;

use crate::config::LlmSection;

/// 按 [llm] 段创建客户端
///
/// provider = "mock" 时返回脚本为空的 Mock；其余按 OpenAI 兼容端点处理，
/// API Key 取 api_key_env 指定的变量，未设置时依次尝试 DEEPSEEK_API_KEY、OPENAI_API_KEY。
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    if cfg.provider.eq_ignore_ascii_case("mock") {
        tracing::info!("Using mock LLM");
        return Arc::new(MockLlmClient::new());
    }

    let api_key = cfg
        .api_key_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());
    if api_key.is_none() {
        tracing::warn!("No LLM API key found in environment; requests will likely fail");
    }

    tracing::info!(model = %cfg.model, base_url = ?cfg.base_url, "Using OpenAI-compatible LLM");
    Arc::new(OpenAiClient::new(
        cfg.base_url.as_deref(),
        &cfg.model,
        api_key.as_deref(),
    ))
}
