//! 参数模板替换（查询模板与 API 请求体共用）
//!
//! 同一参数有三种等价写法：`{{.key}}`、`{{key}}`、`$key`，每个已知参数的三种写法全部替换；
//! 未提供的占位符原样保留。参数串格式为 `key1=value1,key2=value2`，键值两端去空白，
//! 缺少 `=` 的片段直接跳过；值内的 `,` 与 `=` 没有转义手段。
//!
//! 替换只做一遍：若某个值本身含有占位符形状的文本（如 `$risk`），后续参数可能再次命中它，
//! 调用方需自行保证值中不含占位符。

use std::collections::HashMap;

use serde_json::Value;

/// 解析 `key1=value1,key2=value2` 形式的参数串
///
/// 只按第一个 `=` 切分，因此值中可以包含 `=`；键为空的片段与缺少 `=` 的片段一并忽略。
pub fn parse_params(params: &str) -> HashMap<String, String> {
    params
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// 用参数表替换模板中的占位符
///
/// 键按长度降序处理，使 `$hostname` 先于 `$host` 被替换，结果与 HashMap 遍历顺序无关。
pub fn substitute(template: &str, params: &HashMap<String, String>) -> String {
    let mut keys: Vec<&String> = params.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let mut result = template.to_string();
    for key in keys {
        let value = &params[key];
        result = result.replace(&format!("{{{{.{key}}}}}"), value);
        result = result.replace(&format!("{{{{{key}}}}}"), value);
        result = result.replace(&format!("${key}"), value);
    }
    result
}

/// 解析参数串并替换模板；模板或参数串为空时原样返回模板
pub fn replace_params(template: &str, params: &str) -> String {
    if template.is_empty() || params.trim().is_empty() {
        return template.to_string();
    }
    substitute(template, &parse_params(params))
}

/// 从工具调用参数中取出参数表
///
/// LLM 可能给出 `"k=v,k2=v2"` 字符串，也可能直接给 JSON 对象；对象中的非字符串值按 JSON 文本处理，
/// 其它形状视为没有参数。
pub fn params_from_value(value: Option<&Value>) -> HashMap<String, String> {
    match value {
        Some(Value::String(s)) => parse_params(s),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                (k.trim().to_string(), v)
            })
            .filter(|(k, _)| !k.is_empty())
            .collect(),
        _ => HashMap::new(),
    }
}
