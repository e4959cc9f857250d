//! 安全运营数据模型：提案（Proposal）与活动（Activity）

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ActivityConfig;

/// 提案状态
///
/// `pending` 只能经 accept / ignore 离开一次；resubmit 在任何状态下都会变为 `modified`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    #[default]
    Pending,
    Accepted,
    Ignored,
    Modified,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Ignored => "ignored",
            Self::Modified => "modified",
        }
    }

    /// 从查询串解析（大小写不敏感），未知值返回 None
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "ignored" => Some(Self::Ignored),
            "modified" => Some(Self::Modified),
            _ => None,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 提案上建议的操作类型（仅供 UI 渲染，不参与状态机）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    #[default]
    Accept,
    Ignore,
    Modify,
}

/// 可选操作：按钮文字、类型、附带参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalAction {
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ProposalAction {
    pub fn new(label: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            label: label.into(),
            kind,
            params: HashMap::new(),
        }
    }

    /// 默认三个操作：确认 / 忽略 / 修改参数
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("确认", ActionKind::Accept),
            Self::new("忽略", ActionKind::Ignore),
            Self::new("修改参数", ActionKind::Modify),
        ]
    }
}

/// 参数值类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Select,
}

/// 可调整参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: ParamType,
    #[serde(default)]
    pub value: String,
    /// select 类型的可选值
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            kind: ParamType::String,
            value: value.into(),
            options: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_kind(mut self, kind: ParamType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.kind = ParamType::Select;
        self.options = options;
        self
    }
}

/// 提案：一条等待人工或自动处置的建议操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// 为空时由 ProposalStore::create 分配
    #[serde(default)]
    pub id: String,
    /// risk / weak / api_biz / app 等，只影响 UI 展示
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    #[serde(default)]
    pub actions: Vec<ProposalAction>,
    #[serde(default)]
    pub parameters: HashMap<String, Param>,
    #[serde(default)]
    pub status: ProposalStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Proposal {
    pub fn new(
        kind: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            kind: kind.into(),
            title: title.into(),
            summary: summary.into(),
            details,
            actions: Vec::new(),
            parameters: HashMap::new(),
            status: ProposalStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_action(mut self, action: ProposalAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.parameters.insert(param.key.clone(), param);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }

    /// 读取 details 中的字符串字段；缺失或非字符串时返回 None
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(Value::as_str)
    }
}

/// 活动执行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActivityMode {
    /// 直接调用处置 API，不产生提案
    Auto,
    /// 必须经提案审批
    #[default]
    Manual,
}

impl ActivityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ActivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 活动：按固定间隔独立调度的研判任务；启动后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// 唯一名称，同时作为会话 ID
    pub name: String,
    pub schedule: String,
    #[serde(default)]
    pub mode: ActivityMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Activity {
    pub fn new(name: impl Into<String>, schedule: impl Into<String>, mode: ActivityMode) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            mode,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn from_config(name: &str, cfg: &ActivityConfig) -> Self {
        Self {
            name: name.to_string(),
            schedule: cfg.schedule.clone(),
            mode: cfg.mode,
            enabled: cfg.enabled,
        }
    }
}
