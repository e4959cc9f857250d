//! sheikah_api 工具：调用内部处置 API
//!
//! 按 api 标识取端点描述（方法、路径、请求体模板），替换参数后发出请求；
//! 固定 `Content-Type: application/json`，配置了 API Key 时附带 `sw-api-key` 头。
//! 成功返回格式化后的 JSON（非 JSON 时原样返回），HTTP 状态 >= 400 或网络失败返回错误。
//! 未知 api 标识直接报错，不发任何请求。

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::client::OutboundClient;
use crate::tools::params::{params_from_value, replace_params, substitute};
use crate::tools::Tool;

/// API Key 请求头
pub const API_KEY_HEADER: &str = "sw-api-key";

/// API 端点描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub body: String,
}

impl ApiEndpoint {
    pub fn new(method: &str, path: &str, body: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            body: body.to_string(),
        }
    }

    /// 方法须为合法 HTTP 方法，路径须以 `/` 开头
    pub fn validate(&self) -> Result<(), String> {
        let method = self.method.trim().to_ascii_uppercase();
        if method.is_empty() || Method::from_bytes(method.as_bytes()).is_err() {
            return Err(format!("invalid method: {:?}", self.method));
        }
        if !self.path.starts_with('/') {
            return Err(format!("path must start with '/': {:?}", self.path));
        }
        Ok(())
    }
}

/// 替换参数后的待发请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
}

pub struct SheikahApiTool {
    apis: HashMap<String, ApiEndpoint>,
    base_url: String,
    api_key: String,
    client: OutboundClient,
    description: String,
}

impl SheikahApiTool {
    pub fn new(
        apis: HashMap<String, ApiEndpoint>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let mut ids: Vec<&String> = apis.keys().collect();
        ids.sort();
        let ids = ids
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        let description = format!(
            "Call the internal Sheikah API to apply a disposal. Args: {{\"api\": \"api id\", \"params\": \"key1=value1,key2=value2\"}}. Available api: {ids}. Example: {{\"api\": \"confirm_risk\", \"params\": \"content=xxx,host=xxx,risk=xxx,note=xxx\"}}"
        );
        Self {
            apis,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: OutboundClient::new(timeout_secs),
            description,
        }
    }

    /// 根据 api 标识与参数构建请求（不做网络 I/O）
    pub fn prepare(
        &self,
        api_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<PreparedRequest, String> {
        self.prepare_with(api_id, |template| substitute(template, params))
    }

    fn prepare_with(
        &self,
        api_id: &str,
        fill: impl Fn(&str) -> String,
    ) -> Result<PreparedRequest, String> {
        let endpoint = self
            .apis
            .get(api_id)
            .ok_or_else(|| format!("api not found: {api_id}"))?;
        let method = Method::from_bytes(endpoint.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| format!("invalid method for {api_id}: {}", endpoint.method))?;

        let path = fill(&endpoint.path);
        let body = if endpoint.body.is_empty() {
            None
        } else {
            Some(fill(&endpoint.body))
        };

        Ok(PreparedRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            body,
        })
    }

    async fn send(&self, request: PreparedRequest) -> Result<String, String> {
        let client = self.client.get(self.name())?;

        let mut builder = client
            .request(request.method, &request.url)
            .header(CONTENT_TYPE, "application/json");
        if !self.api_key.is_empty() {
            builder = builder.header(API_KEY_HEADER, &self.api_key);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        if status.as_u16() >= 400 {
            return Err(format!("API returned error: {} - {}", status.as_u16(), body));
        }
        Ok(pretty_json(&body))
    }

    pub fn close(&self) {
        self.client.close();
    }
}

fn pretty_json(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl Tool for SheikahApiTool {
    fn name(&self) -> &str {
        "sheikah_api"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "api": { "type": "string", "description": "API id" },
                "params": { "type": "string", "description": "key1=value1,key2=value2" }
            },
            "required": ["api"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let api_id = args
            .get("api")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "api is required".to_string())?;
        let request = match args.get("params") {
            Some(Value::String(params)) => {
                self.prepare_with(api_id, |template| replace_params(template, params))?
            }
            other => self.prepare(api_id, &params_from_value(other))?,
        };
        tracing::info!(api = %api_id, method = %request.method, url = %request.url, "sheikah_api");
        self.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> SheikahApiTool {
        let mut apis = HashMap::new();
        apis.insert(
            "confirm_risk".to_string(),
            ApiEndpoint::new("post", "/risk/confirm", r#"[{"host": "$host", "risk": "$risk"}]"#),
        );
        apis.insert(
            "update_app".to_string(),
            ApiEndpoint::new("PUT", "/antibot/internal_app/$app_id", r#"{"desc": "$app_desc"}"#),
        );
        apis.insert("ping".to_string(), ApiEndpoint::new("GET", "/ping", ""));
        SheikahApiTool::new(apis, "http://sheikah.local/", "", 5)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_prepare_substitutes_body() {
        let req = tool()
            .prepare("confirm_risk", &params(&[("host", "a.com"), ("risk", "sqli")]))
            .unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, "http://sheikah.local/risk/confirm");
        assert_eq!(req.body.as_deref(), Some(r#"[{"host": "a.com", "risk": "sqli"}]"#));
    }

    #[test]
    fn test_prepare_substitutes_path() {
        let req = tool()
            .prepare("update_app", &params(&[("app_id", "42"), ("app_desc", "shop")]))
            .unwrap();
        assert_eq!(req.method, Method::PUT);
        assert_eq!(req.url, "http://sheikah.local/antibot/internal_app/42");
    }

    #[test]
    fn test_prepare_empty_body_is_none() {
        let req = tool().prepare("ping", &HashMap::new()).unwrap();
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn test_unknown_api_fails_without_request() {
        let err = tool()
            .execute(serde_json::json!({"api": "drop_all"}))
            .await
            .unwrap_err();
        assert_eq!(err, "api not found: drop_all");
    }

    #[tokio::test]
    async fn test_api_required() {
        let err = tool().execute(serde_json::json!({})).await.unwrap_err();
        assert_eq!(err, "api is required");
    }

    #[test]
    fn test_pretty_json_falls_back_to_raw() {
        assert_eq!(pretty_json("not json"), "not json");
        assert_eq!(pretty_json(r#"{"a":1}"#), "{\n  \"a\": 1\n}");
    }
}
