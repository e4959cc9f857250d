//! 内置 SQL 模板与处置 API 端点
//!
//! 配置中的 `[secops.queries]` / `[secops.apis]` 按同名覆盖、新名追加的方式合并到内置表上。

use std::collections::HashMap;

use crate::core::SecOpsError;
use crate::tools::ApiEndpoint;

const QUERIES: &[(&str, &str)] = &[
    (
        "pending_risk_events",
        "SELECT risk, host, content, ts FROM risk_events WHERE status = 'pending' ORDER BY ts DESC LIMIT $batch_size",
    ),
    (
        "pending_weak_events",
        "SELECT weak_name, host, method, url, channel FROM weak_events WHERE status = 'pending' ORDER BY ts DESC LIMIT $batch_size",
    ),
    (
        "access_by_ip",
        "SELECT ip, ts, method, url, status, req_risk FROM access WHERE ip = '$ip' AND ts > now() - INTERVAL 1 DAY ORDER BY ts DESC LIMIT 30",
    ),
    (
        "access_by_user",
        "SELECT ip, ts, method, url, status, req_risk FROM access WHERE uid = '$user_id' AND ts > now() - INTERVAL 1 DAY ORDER BY ts DESC LIMIT 30",
    ),
    (
        "access_by_device",
        "SELECT ip, ts, method, url, status, req_risk FROM access WHERE sid = '$device_id' AND ts > now() - INTERVAL 1 DAY ORDER BY ts DESC LIMIT 30",
    ),
    (
        "http_details",
        "SELECT req, res FROM access_raw WHERE id = '$id' LIMIT 3",
    ),
    (
        "risk_top20",
        "SELECT risk, host, content, type, count() as cnt FROM risk_events WHERE ts > today() AND status = 'pending' GROUP BY risk, host, content, type ORDER BY cnt DESC LIMIT 20",
    ),
    (
        "weak_http_sample",
        "SELECT req, res FROM weak WHERE weak_name = '$weak_name' AND channel = '$channel' AND method = '$method' AND url = '$url' LIMIT 1",
    ),
    (
        "pending_api_list",
        "SELECT method, host, url, req, res, biz_type, channel FROM api_sample WHERE analyzed = 0 LIMIT $batch_size",
    ),
    (
        "api_sample",
        "SELECT method, host, url, req, res FROM api_sample WHERE host = '$host' AND url = '$url' LIMIT 1",
    ),
    (
        "pending_app_list",
        "SELECT app_id, host, api_list FROM app_sample WHERE analyzed = 0 LIMIT $batch_size",
    ),
    (
        "app_api_list",
        "SELECT api_list FROM app_sample WHERE app_id = '$app_id' LIMIT 1",
    ),
];

const RISK_BODY: &str =
    r#"[{"content": "$content", "host": "$host", "risk": "$risk", "note": "$note"}]"#;

const APIS: &[(&str, &str, &str, &str)] = &[
    ("confirm_risk", "POST", "/risk/confirm", RISK_BODY),
    ("ignore_risk", "POST", "/risk/filter", RISK_BODY),
    (
        "confirm_weak",
        "POST",
        "/apiweak/manage/batch",
        r#"{"tag": "todo", "apiWeakMgts": [{"defectId": "$weak_name", "host": "$host", "method": "$method", "url": "$url"}], "message": "$note"}"#,
    ),
    (
        "ignore_weak",
        "POST",
        "/apiweak/manage/batch",
        r#"{"tag": "ignore", "apiWeakMgts": [{"defectId": "$weak_name", "host": "$host", "method": "$method", "url": "$url"}], "message": "$note"}"#,
    ),
    (
        "create_business",
        "POST",
        "/antibot/api_data_property",
        r#"{"method": "$method", "path": "$path", "host": "$host", "bizType": 0, "bizDesc": "$biz_desc", "bizLevel": $biz_level, "bizName": "$biz_name", "mode": 1, "ruleSet": []}"#,
    ),
    (
        "save_api_analysis",
        "POST",
        "/antibot/internal_api/api_analysis",
        r#"{"host": "$host", "method": "$method", "path": "$path", "biz_analysis": "$biz_analysis", "importance_analysis": "$importance_analysis", "param_analysis": "$param_analysis", "importance": "$importance", "skip_if_exist": true}"#,
    ),
    (
        "create_app",
        "POST",
        "/antibot/internal_app",
        r#"{"name": "$app_name", "domainList": ["$host"], "urlPrefix": "/", "isMirror": true, "desc": "$app_desc"}"#,
    ),
    (
        "update_app",
        "PUT",
        "/antibot/internal_app/$app_id",
        r#"{"desc": "$app_desc"}"#,
    ),
    (
        "create_proposal",
        "POST",
        "/secops/proposal",
        r#"{"type": "$type", "title": "$title", "content": "$content", "data": $data}"#,
    ),
];

/// 内置 SQL 模板（sql_id -> SQL）
pub fn default_queries() -> HashMap<String, String> {
    QUERIES
        .iter()
        .map(|(id, sql)| (id.to_string(), sql.to_string()))
        .collect()
}

/// 内置处置 API（api id -> 端点）
pub fn default_apis() -> HashMap<String, ApiEndpoint> {
    APIS.iter()
        .map(|(id, method, path, body)| (id.to_string(), ApiEndpoint::new(method, path, body)))
        .collect()
}

pub fn merged_queries(overrides: &HashMap<String, String>) -> HashMap<String, String> {
    let mut queries = default_queries();
    queries.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    queries
}

pub fn merged_apis(overrides: &HashMap<String, ApiEndpoint>) -> HashMap<String, ApiEndpoint> {
    let mut apis = default_apis();
    apis.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    apis
}

/// 检查配置中的模板覆盖项：SQL 不能为空，端点方法与路径须合法
pub fn validate_overrides(
    queries: &HashMap<String, String>,
    apis: &HashMap<String, ApiEndpoint>,
) -> Result<(), SecOpsError> {
    for (id, sql) in queries {
        if sql.trim().is_empty() {
            return Err(SecOpsError::Config(format!("secops.queries.{id}: empty SQL")));
        }
    }
    for (id, endpoint) in apis {
        endpoint
            .validate()
            .map_err(|e| SecOpsError::Config(format!("secops.apis.{id}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_sizes() {
        assert_eq!(default_queries().len(), 12);
        assert_eq!(default_apis().len(), 9);
    }

    #[test]
    fn test_weak_apis_share_path_with_different_tags() {
        let apis = default_apis();
        assert_eq!(apis["confirm_weak"].path, apis["ignore_weak"].path);
        assert!(apis["confirm_weak"].body.contains(r#""tag": "todo""#));
        assert!(apis["ignore_weak"].body.contains(r#""tag": "ignore""#));
        assert_eq!(apis["update_app"].method, "PUT");
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let mut overrides = HashMap::new();
        overrides.insert("risk_top20".to_string(), "SELECT 1".to_string());
        overrides.insert("custom".to_string(), "SELECT 2".to_string());
        let queries = merged_queries(&overrides);
        assert_eq!(queries["risk_top20"], "SELECT 1");
        assert_eq!(queries["custom"], "SELECT 2");
        assert_eq!(queries.len(), 13);
    }

    #[test]
    fn test_builtin_catalog_is_valid() {
        assert!(validate_overrides(&default_queries(), &default_apis()).is_ok());
    }

    #[test]
    fn test_bad_overrides_rejected() {
        let mut apis = HashMap::new();
        apis.insert("ping".to_string(), ApiEndpoint::new("FETCH ME", "/ping", ""));
        let err = validate_overrides(&HashMap::new(), &apis).unwrap_err();
        assert!(matches!(err, SecOpsError::Config(_)));
        assert!(err.to_string().contains("secops.apis.ping"));

        apis.insert("ping".to_string(), ApiEndpoint::new("GET", "ping", ""));
        assert!(validate_overrides(&HashMap::new(), &apis).is_err());

        let mut queries = HashMap::new();
        queries.insert("blank".to_string(), "  ".to_string());
        let err = validate_overrides(&queries, &HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("secops.queries.blank"));
    }
}
