//! 活动名 -> 执行 prompt 的查找表
//!
//! 已知活动各有固定模板，未知活动回退到通用 prompt；prompt 末尾附加执行模式说明，
//! 告诉推理引擎是直接处置（auto）还是提交提案（manual）。

use crate::secops::types::ActivityMode;

/// 已知活动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    RiskAnalysis,
    WeakAnalysis,
    ApiBizExplain,
    AppExplain,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 4] = [
        Self::RiskAnalysis,
        Self::WeakAnalysis,
        Self::ApiBizExplain,
        Self::AppExplain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::RiskAnalysis => "risk_analysis",
            Self::WeakAnalysis => "weak_analysis",
            Self::ApiBizExplain => "api_biz_explain",
            Self::AppExplain => "app_explain",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    fn template(&self) -> &'static str {
        match self {
            Self::RiskAnalysis => {
                "Run the risk event triage:\n\
                 1. Use the query_data tool to fetch pending risk events (sql_id: pending_risk_events, params: batch_size=5)\n\
                 2. Trace each event back through related access records (access_by_ip / access_by_user / access_by_device) and raw HTTP messages (http_details)\n\
                 3. Decide whether each event is a real risk\n\
                 4. Confirm or ignore it according to the execution mode below\n\n\
                 Start the risk triage now."
            }
            Self::WeakAnalysis => {
                "Run the weakness event analysis:\n\
                 1. Use the query_data tool to fetch pending weakness events (sql_id: pending_weak_events, params: batch_size=5)\n\
                 2. Fetch the HTTP traffic that triggered each weakness (weak_http_sample)\n\
                 3. Decide whether it is a false positive\n\
                 4. Confirm or ignore it according to the execution mode below\n\n\
                 Start the weakness analysis now."
            }
            Self::ApiBizExplain => {
                "Run the API business analysis:\n\
                 1. Use the query_data tool to fetch APIs awaiting analysis (sql_id: pending_api_list, params: batch_size=3)\n\
                 2. Fetch a request/response sample for each API (api_sample)\n\
                 3. Explain the business meaning, parameters and importance level\n\
                 4. Create the business entry and save the analysis (create_business / save_api_analysis)\n\n\
                 Start the API business analysis now."
            }
            Self::AppExplain => {
                "Run the application identification:\n\
                 1. Use the query_data tool to fetch applications awaiting identification (sql_id: pending_app_list, params: batch_size=3)\n\
                 2. Fetch the API list of each application (app_api_list)\n\
                 3. Infer the application name and business description\n\
                 4. Create or update the application (create_app / update_app)\n\n\
                 Start the application identification now."
            }
        }
    }
}

fn mode_instruction(mode: ActivityMode) -> &'static str {
    match mode {
        ActivityMode::Auto => {
            "Execution mode: auto. Apply your decisions directly with the sheikah_api tool."
        }
        ActivityMode::Manual => {
            "Execution mode: manual. Do NOT call disposal APIs directly; file each recommendation \
             with the create_proposal tool so a human can accept, ignore or adjust it."
        }
    }
}

/// 构建活动执行 prompt；同名同模式的输入总得到同一段文本
pub fn build_activity_prompt(name: &str, mode: ActivityMode) -> String {
    let body = match ActivityKind::from_name(name) {
        Some(kind) => kind.template().to_string(),
        None => format!("Run the security operations activity: {name}"),
    };
    format!("{body}\n\n{}", mode_instruction(mode))
}
