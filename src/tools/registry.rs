//! 工具注册表
//!
//! 推理引擎可调用的工具都实现 Tool trait（name / description / parameters_schema / execute），
//! ToolRegistry 按名注册与查找，ToolExecutor 在调用时加超时并输出审计日志。
//! execute 的 Err 是交给推理引擎的结构化错误结果，不是致命错误。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

/// 工具 trait
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应 tool call JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（拼入 system prompt，供 LLM 理解用法）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认不限参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    /// 注册共享实例（服务关闭时还需持有同一实例）
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| format!("Unknown tool: {name}. Available: {}", self.tool_names().join(", ")))?;
        tool.execute(args).await
    }

    /// 已注册工具名（已排序）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// (name, description) 列表，按名称排序，用于生成 prompt 中的工具段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut list: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    /// 工具 schema JSON（name / description / parameters）
    pub fn to_schema_json(&self) -> String {
        let tools: Vec<Value> = self
            .tool_names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| {
                serde_json::json!({
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&tools).unwrap_or_else(|_| "[]".to_string())
    }
}
