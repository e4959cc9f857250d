//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SECOPS__*` 覆盖（双下划线表示嵌套，如 `SECOPS__SECOPS__SHEIKAH__API_KEY=xxx`）。
//! 各段都有默认值，缺少配置文件时也能以默认配置运行。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::secops::ActivityMode;
use crate::tools::ApiEndpoint;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub secops: SecOpsSection,
    pub web: WebSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 每个会话保留的历史消息条数（不含 system prompt）
    pub max_history_messages: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "secops".to_string(),
            max_history_messages: 40,
        }
    }
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai（任意 OpenAI 兼容端点）/ mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名；未设置时依次尝试 DEEPSEEK_API_KEY、OPENAI_API_KEY
    pub api_key_env: Option<String>,
    /// 单次处理的最大推理步数
    pub max_steps: usize,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "deepseek-chat".to_string(),
            base_url: Some("https://api.deepseek.com/v1".to_string()),
            api_key_env: None,
            max_steps: 12,
        }
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），同时作为出站 HTTP 超时
    pub tool_timeout_secs: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
        }
    }
}

/// [secops] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecOpsSection {
    pub enabled: bool,
    pub clickhouse: ClickHouseSection,
    pub sheikah: SheikahSection,
    /// 活动名 -> 活动配置
    pub activities: HashMap<String, ActivityConfig>,
    /// 追加或覆盖内置 SQL 模板
    pub queries: HashMap<String, String>,
    /// 追加或覆盖内置处置 API
    pub apis: HashMap<String, ApiEndpoint>,
}

impl Default for SecOpsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            clickhouse: ClickHouseSection::default(),
            sheikah: SheikahSection::default(),
            activities: HashMap::new(),
            queries: HashMap::new(),
            apis: HashMap::new(),
        }
    }
}

/// [secops.clickhouse] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClickHouseSection {
    /// host:port，不带协议
    pub addr: String,
    pub username: String,
    pub password: String,
}

impl Default for ClickHouseSection {
    fn default() -> Self {
        Self {
            addr: "localhost:8123".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl ClickHouseSection {
    pub fn base_url(&self) -> String {
        let addr = if self.addr.trim().is_empty() {
            "localhost:8123"
        } else {
            self.addr.trim()
        };
        if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        }
    }
}

/// [secops.sheikah] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheikahSection {
    pub base_url: String,
    pub api_key: String,
}

impl Default for SheikahSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
        }
    }
}

impl SheikahSection {
    pub fn base_url(&self) -> &str {
        if self.base_url.trim().is_empty() {
            "http://localhost:8080"
        } else {
            self.base_url.trim()
        }
    }
}

/// [secops.activities.<name>] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// "30m" / "1h" / "90s"；无法解析时按 30 分钟
    pub schedule: String,
    pub mode: ActivityMode,
    pub enabled: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            schedule: "30m".to_string(),
            mode: ActivityMode::Manual,
            enabled: true,
        }
    }
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub host: String,
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 18789,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SECOPS__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SECOPS__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SECOPS")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 从 TOML 文本解析配置（不读环境变量）
pub fn from_toml_str(toml: &str) -> Result<AppConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?
        .try_deserialize()
}
