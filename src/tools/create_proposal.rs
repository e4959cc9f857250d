//! create_proposal 工具：manual 模式下由推理引擎提交待审批提案
//!
//! 参数：type / title / summary，可选 details（对象；字符串时包装为 {"content": ..}）
//! 与 parameters（Param 数组、对象或 `k=v` 字符串）。自动附加确认 / 忽略 / 修改参数三个动作。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::secops::{Param, Proposal, ProposalAction, ProposalStore};
use crate::tools::params::params_from_value;
use crate::tools::Tool;

pub struct ProposalTool {
    store: Arc<ProposalStore>,
}

impl ProposalTool {
    pub fn new(store: Arc<ProposalStore>) -> Self {
        Self { store }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("{key} is required"))
}

fn parse_details(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if !s.is_empty() => {
            // 模型常把 JSON 对象序列化成字符串传入
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(s) {
                return map;
            }
            let mut map = Map::new();
            map.insert("content".to_string(), Value::String(s.clone()));
            map
        }
        _ => Map::new(),
    }
}

fn parse_parameters(value: Option<&Value>) -> Result<Vec<Param>, String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                serde_json::from_value::<Param>(item.clone())
                    .map_err(|e| format!("invalid parameter: {e}"))
            })
            .collect(),
        other => {
            let mut params: Vec<Param> = params_from_value(other)
                .into_iter()
                .map(|(k, v)| Param::new(k, v))
                .collect();
            params.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(params)
        }
    }
}

#[async_trait]
impl Tool for ProposalTool {
    fn name(&self) -> &str {
        "create_proposal"
    }

    fn description(&self) -> &str {
        "Create a proposal for human review instead of applying a disposal directly. Args: {\"type\": \"risk|weak|api_biz|app\", \"title\": \"short title\", \"summary\": \"why\", \"details\": {..}, \"parameters\": \"key1=value1,key2=value2\"}"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "type": { "type": "string" },
                "title": { "type": "string" },
                "summary": { "type": "string" },
                "details": { "type": "object" },
                "parameters": { "type": "string", "description": "key1=value1,key2=value2 or an array of {key,label,type,value,options}" }
            },
            "required": ["type", "title"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let kind = required_str(&args, "type")?;
        let title = required_str(&args, "title")?;
        let summary = args.get("summary").and_then(Value::as_str).unwrap_or("");
        let details = parse_details(args.get("details"));
        let params = parse_parameters(args.get("parameters"))?;

        let mut proposal = Proposal::new(kind, title, summary, details);
        for action in ProposalAction::defaults() {
            proposal = proposal.with_action(action);
        }
        for param in params {
            proposal = proposal.with_param(param);
        }

        let id = self.store.create(proposal).await;
        Ok(format!("Proposal created: id={id}"))
    }
}
