//! ReAct 推理引擎
//!
//! 循环：LLM 规划 -> 若为 Tool Call 则执行并把 Observation 写回对话 -> 直到给出最终回复或达到最大步数。
//! - 会话历史按 `channel:session_id` 分开保存，只保留最近 max_history 条
//! - 工具失败、未知工具、JSON 格式错误都作为观察结果回填给 LLM，不中止本轮
//! - cancel 被取消时在 LLM / 工具调用处立即返回 AgentError::Cancelled

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::agent::ReasoningEngine;
use crate::core::AgentError;
use crate::llm::{LlmClient, Message};
use crate::tools::ToolExecutor;

/// 默认最大推理步数
pub const DEFAULT_MAX_STEPS: usize = 12;

/// 默认每个会话保留的历史消息数
pub const DEFAULT_MAX_HISTORY: usize = 40;

const BASE_PROMPT: &str =
    "You are a security operations analyst. Investigate with the tools below and act only on evidence.";

/// Observation 日志预览字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// LLM 返回的 Tool Call（{"tool": "query_data", "args": {...}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// 规划结果
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 最终回复
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 解析 LLM 输出
///
/// 优先取 ```json 代码块，否则取最外层 `{...}`；解析出非空 tool 即为 ToolCall。
/// 看起来是 Tool Call（以 `{` 开头或带 json 代码块）却解析失败时返回 JsonParseError，
/// 其余情况按最终回复处理。
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    let fenced = trimmed.find("```json").map(|start| {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    });
    let candidate = fenced
        .or_else(|| {
            let start = trimmed.find('{')?;
            let end = trimmed.rfind('}')?;
            (end > start).then(|| &trimmed[start..=end])
        })
        .or_else(|| trimmed.starts_with('{').then_some(trimmed));

    let Some(json_str) = candidate else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    match serde_json::from_str::<ToolCall>(json_str) {
        Ok(tc) if !tc.tool.trim().is_empty() => Ok(PlannerOutput::ToolCall(tc)),
        Ok(_) => Ok(PlannerOutput::Response(trimmed.to_string())),
        Err(e) => {
            let intended_call = fenced.is_some() || trimmed.starts_with('{');
            if intended_call {
                Err(AgentError::JsonParseError(format!("{}: {}", e, json_str)))
            } else {
                Ok(PlannerOutput::Response(trimmed.to_string()))
            }
        }
    }
}

fn retry_prompt(raw: &str) -> String {
    format!(
        "Your previous output was not valid JSON: {raw}. \
         When calling a tool, output exactly one JSON object and nothing else, \
         in the form {{\"tool\": \"tool_name\", \"args\": {{...}}}}. \
         When you are done, reply with plain text only."
    )
}

fn preview(s: &str) -> String {
    if s.chars().count() > OBSERVATION_PREVIEW_CHARS {
        format!("{}...", s.chars().take(OBSERVATION_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

pub struct ReactEngine {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    max_steps: usize,
    max_history: usize,
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl ReactEngine {
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>) -> Self {
        Self {
            llm,
            executor,
            max_steps: DEFAULT_MAX_STEPS,
            max_history: DEFAULT_MAX_HISTORY,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// system prompt：基础说明 + 工具列表 + 输出格式约定
    pub fn system_prompt(&self) -> String {
        let tools = self
            .executor
            .tool_descriptions()
            .into_iter()
            .map(|(name, desc)| format!("- {name}: {desc}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "{}\n\nAvailable tools:\n{}\n\n\
             To call a tool, reply with exactly one JSON object: {{\"tool\": \"tool_name\", \"args\": {{...}}}}.\n\
             After each call you will receive an observation. When the task is finished, reply with a plain-text summary.",
            BASE_PROMPT, tools
        )
    }

    /// 某会话当前保存的历史（测试与调试用）
    pub async fn history(&self, channel: &str, session_id: &str) -> Vec<Message> {
        let key = session_key(channel, session_id);
        self.sessions
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    async fn save_history(&self, key: String, mut messages: Vec<Message>) {
        if messages.len() > self.max_history {
            let excess = messages.len() - self.max_history;
            messages.drain(..excess);
        }
        self.sessions.lock().await.insert(key, messages);
    }
}

fn session_key(channel: &str, session_id: &str) -> String {
    format!("{channel}:{session_id}")
}

#[async_trait::async_trait]
impl ReasoningEngine for ReactEngine {
    async fn process(
        &self,
        prompt: &str,
        channel: &str,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<String, AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        let key = session_key(channel, session_id);
        let mut conversation = self
            .sessions
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default();
        conversation.push(Message::user(prompt));
        let system = Message::system(self.system_prompt());

        for step in 0..self.max_steps {
            let mut request = Vec::with_capacity(conversation.len() + 1);
            request.push(system.clone());
            request.extend(conversation.iter().cloned());

            let output = tokio::select! {
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                out = self.llm.complete(&request) => out.map_err(AgentError::LlmError)?,
            };

            match parse_llm_output(&output) {
                Ok(PlannerOutput::Response(resp)) => {
                    conversation.push(Message::assistant(resp.clone()));
                    self.save_history(key, conversation).await;
                    return Ok(resp);
                }
                Ok(PlannerOutput::ToolCall(tc)) => {
                    tracing::debug!(session = %key, step, tool = %tc.tool, "tool call");
                    let result = tokio::select! {
                        _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                        r = self.executor.execute(&tc.tool, tc.args.clone()) => r,
                    };
                    let observation = match result {
                        Ok(r) => r,
                        Err(e) => format!("Error: {e}"),
                    };
                    tracing::debug!(session = %key, tool = %tc.tool, observation = %preview(&observation), "observation");
                    conversation.push(Message::assistant(output));
                    conversation.push(Message::user(format!(
                        "Observation from {}: {}",
                        tc.tool, observation
                    )));
                }
                Err(AgentError::JsonParseError(raw)) => {
                    tracing::warn!(session = %key, step, "invalid tool call JSON, asking to retry");
                    conversation.push(Message::assistant(output));
                    conversation.push(Message::user(retry_prompt(&raw)));
                }
                Err(e) => return Err(e),
            }
        }

        self.save_history(key, conversation).await;
        Err(AgentError::MaxStepsExceeded(self.max_steps))
    }
}
