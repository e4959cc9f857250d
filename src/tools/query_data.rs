//! query_data 工具：通过 ClickHouse HTTP 接口查询数据
//!
//! 按 sql_id 取命名 SQL 模板并替换参数，raw_sql 优先级高于 sql_id。
//! SQL 作为表单字段 `query` POST 到配置的唯一端点；响应按 `{"data": [[...], ...]}` 解析，
//! 解析失败时原样返回响应体；HTTP 状态 >= 400 返回带状态码与响应体的错误。
//! 输出最多 10 行，超出部分以 `... N more rows` 结尾。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::client::OutboundClient;
use crate::tools::params::{params_from_value, replace_params, substitute};
use crate::tools::Tool;

/// 单次输出的最大行数
pub const MAX_ROWS: usize = 10;

#[derive(Debug, Deserialize)]
struct TabularResponse {
    data: Vec<Vec<Value>>,
}

pub struct QueryDataTool {
    queries: HashMap<String, String>,
    base_url: String,
    username: String,
    password: String,
    client: OutboundClient,
    description: String,
}

impl QueryDataTool {
    pub fn new(
        queries: HashMap<String, String>,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let ids = sorted_ids(&queries).join(", ");
        let description = format!(
            "Query security data from ClickHouse. Args: {{\"sql_id\": \"template id\", \"params\": \"key1=value1,key2=value2\", \"raw_sql\": \"optional SQL, overrides sql_id\"}}. Available sql_id: {ids}"
        );
        Self {
            queries,
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            client: OutboundClient::new(timeout_secs),
            description,
        }
    }

    pub fn query_ids(&self) -> Vec<String> {
        sorted_ids(&self.queries)
    }

    /// 解析最终要执行的 SQL：raw_sql > sql_id 模板 > 报错
    pub fn resolve_sql(
        &self,
        sql_id: Option<&str>,
        params: &HashMap<String, String>,
        raw_sql: Option<&str>,
    ) -> Result<String, String> {
        self.resolve_with(sql_id, raw_sql, |template| substitute(template, params))
    }

    fn resolve_with(
        &self,
        sql_id: Option<&str>,
        raw_sql: Option<&str>,
        fill: impl FnOnce(&str) -> String,
    ) -> Result<String, String> {
        if let Some(raw) = raw_sql.filter(|s| !s.trim().is_empty()) {
            return Ok(raw.to_string());
        }
        match sql_id.filter(|s| !s.trim().is_empty()) {
            Some(id) => {
                let template = self.queries.get(id).ok_or_else(|| {
                    format!(
                        "sql_id not found: {id}. Available: {}",
                        self.query_ids().join(", ")
                    )
                })?;
                Ok(fill(template))
            }
            None => Err("sql_id or raw_sql is required".to_string()),
        }
    }

    async fn post_sql(&self, sql: &str) -> Result<String, String> {
        let client = self.client.get(self.name())?;

        let mut form: Vec<(&str, &str)> = vec![("query", sql)];
        if !self.username.is_empty() {
            form.push(("user", self.username.as_str()));
        }
        if !self.password.is_empty() {
            form.push(("password", self.password.as_str()));
        }

        let resp = client
            .post(&self.base_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        if status.as_u16() >= 400 {
            return Err(format!("ClickHouse error {}: {}", status.as_u16(), body));
        }
        Ok(body)
    }

    /// 执行原始 SQL 并返回行数据（供程序内其它调用方使用）；响应不是表格 JSON 时报错
    pub async fn query(&self, sql: &str) -> Result<Vec<Vec<Value>>, String> {
        let body = self.post_sql(sql).await?;
        serde_json::from_str::<TabularResponse>(&body)
            .map(|r| r.data)
            .map_err(|e| format!("invalid ClickHouse response: {e}"))
    }

    pub fn close(&self) {
        self.client.close();
    }
}

fn sorted_ids<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut ids: Vec<String> = map.keys().cloned().collect();
    ids.sort();
    ids
}

fn cell_to_string(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 将响应体格式化为制表符分隔的文本；非表格 JSON 原样返回
pub fn format_response(body: &str) -> String {
    let rows = match serde_json::from_str::<TabularResponse>(body) {
        Ok(r) => r.data,
        Err(_) => return body.to_string(),
    };
    if rows.is_empty() {
        return "Query returned no rows".to_string();
    }

    let mut output = format!("Total {} rows:\n\n", rows.len());
    for row in rows.iter().take(MAX_ROWS) {
        let cells: Vec<String> = row.iter().map(cell_to_string).collect();
        output.push_str(&cells.join("\t"));
        output.push('\n');
    }
    if rows.len() > MAX_ROWS {
        output.push_str(&format!("\n... {} more rows", rows.len() - MAX_ROWS));
    }
    output
}

#[async_trait]
impl Tool for QueryDataTool {
    fn name(&self) -> &str {
        "query_data"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sql_id": { "type": "string", "description": "SQL template id" },
                "params": { "type": "string", "description": "key1=value1,key2=value2" },
                "raw_sql": { "type": "string", "description": "Optional SQL to run directly, overrides sql_id" }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let sql_id = args.get("sql_id").and_then(Value::as_str);
        let raw_sql = args.get("raw_sql").and_then(Value::as_str);
        // 参数串走 replace_params，JSON 对象先转参数表
        let sql = match args.get("params") {
            Some(Value::String(params)) => {
                self.resolve_with(sql_id, raw_sql, |template| replace_params(template, params))?
            }
            other => self.resolve_sql(sql_id, &params_from_value(other), raw_sql)?,
        };
        tracing::debug!(sql = %sql, "query_data");
        let body = self.post_sql(&sql).await?;
        Ok(format_response(&body))
    }
}
