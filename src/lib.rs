//! SecOps - 安全运营智能体
//!
//! 模块划分：
//! - **agent**: 推理引擎抽象与 ReAct 实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与优雅关闭
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: tracing 初始化
//! - **secops**: 活动调度、提案审批、服务装配
//! - **tools**: 工具注册与执行、ClickHouse 查询、处置 API、提案提交
//! - **web**: 提案审批 HTTP 接口（`web` feature）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod secops;
pub mod tools;
#[cfg(feature = "web")]
pub mod web;
