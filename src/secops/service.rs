//! 安全运营服务装配
//!
//! 由配置构建：提案存储、query_data / sheikah_api / create_proposal 三个工具、
//! ReAct 推理引擎与活动调度器。`[secops] enabled = false` 时不构建服务。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agent::{ReactEngine, ReasoningEngine};
use crate::config::AppConfig;
use crate::llm::LlmClient;
use crate::core::SecOpsError;
use crate::secops::catalog::{merged_apis, merged_queries, validate_overrides};
use crate::secops::{Activity, ActivityScheduler, ProposalStore};
use crate::tools::{ProposalTool, QueryDataTool, SheikahApiTool, ToolExecutor, ToolRegistry};

pub struct SecOpsService {
    activities: Vec<Activity>,
    proposals: Arc<ProposalStore>,
    query_tool: Arc<QueryDataTool>,
    api_tool: Arc<SheikahApiTool>,
    engine: Arc<ReactEngine>,
    scheduler: Arc<ActivityScheduler>,
}

impl SecOpsService {
    /// 按配置装配服务；禁用时返回 Ok(None)，模板覆盖项非法时返回配置错误。
    /// shutdown 为全局关闭信号，调度器持有其子 token
    pub fn from_config(
        cfg: &AppConfig,
        llm: Arc<dyn LlmClient>,
        shutdown: CancellationToken,
    ) -> Result<Option<Self>, SecOpsError> {
        let secops = &cfg.secops;
        if !secops.enabled {
            tracing::info!("SecOps service is disabled");
            return Ok(None);
        }
        validate_overrides(&secops.queries, &secops.apis)?;

        let timeout_secs = cfg.tools.tool_timeout_secs;
        let queries = merged_queries(&secops.queries);
        let apis = merged_apis(&secops.apis);
        let (queries_count, apis_count) = (queries.len(), apis.len());

        let proposals = Arc::new(ProposalStore::new());
        let query_tool = Arc::new(QueryDataTool::new(
            queries,
            secops.clickhouse.base_url(),
            secops.clickhouse.username.clone(),
            secops.clickhouse.password.clone(),
            timeout_secs,
        ));
        let api_tool = Arc::new(SheikahApiTool::new(
            apis,
            secops.sheikah.base_url(),
            secops.sheikah.api_key.clone(),
            timeout_secs,
        ));

        let mut registry = ToolRegistry::new();
        registry.register_arc(query_tool.clone());
        registry.register_arc(api_tool.clone());
        registry.register(ProposalTool::new(proposals.clone()));
        tracing::info!(queries_count, apis_count, "SecOps tools registered");

        let executor = Arc::new(ToolExecutor::new(registry, timeout_secs));
        let engine = Arc::new(
            ReactEngine::new(llm, executor)
                .with_max_steps(cfg.llm.max_steps)
                .with_max_history(cfg.app.max_history_messages),
        );
        let scheduler = Arc::new(ActivityScheduler::with_shutdown(
            engine.clone() as Arc<dyn ReasoningEngine>,
            shutdown,
        ));

        let mut activities: Vec<Activity> = secops
            .activities
            .iter()
            .map(|(name, a)| Activity::from_config(name, a))
            .collect();
        activities.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Some(Self {
            activities,
            proposals,
            query_tool,
            api_tool,
            engine,
            scheduler,
        }))
    }

    /// 启动所有启用的活动，立即返回
    pub fn start(&self) {
        tracing::info!(activities = self.activities.len(), "Starting SecOps service");
        self.scheduler.start(&self.activities);
    }

    /// 停止全部活动并等待退出，之后关闭出站适配器；可重复调用
    pub async fn stop(&self) {
        self.scheduler.stop().await;
        self.query_tool.close();
        self.api_tool.close();
        tracing::info!("SecOps service stopped");
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn proposals(&self) -> &Arc<ProposalStore> {
        &self.proposals
    }

    pub fn scheduler(&self) -> &Arc<ActivityScheduler> {
        &self.scheduler
    }

    pub fn engine(&self) -> &Arc<ReactEngine> {
        &self.engine
    }

    pub fn query_tool(&self) -> &Arc<QueryDataTool> {
        &self.query_tool
    }
}
