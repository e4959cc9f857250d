//! SecOps Web：安全运营服务 + 提案审批 HTTP 接口
//!
//! 启动: cargo run --bin secops-web --features web
//! 端口取 [web] port，环境变量 SECOPS_WEB_PORT 可覆盖

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use secops::config::load_config;
use secops::core::{ServiceCleanup, ShutdownCoordinator, ShutdownManager};
use secops::llm::create_llm_from_config;
use secops::secops::SecOpsService;
use secops::web::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    secops::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    tracing::info!(app = %cfg.app.name, "Starting");

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let llm = create_llm_from_config(&cfg.llm);
    let service = SecOpsService::from_config(&cfg, llm, shutdown.token())
        .context("Failed to build SecOps service")?
        .map(Arc::new)
        .context("SecOps is disabled; enable [secops] to serve the proposal API")?;

    let mut coordinator = ShutdownCoordinator::new().with_timeout(30);
    coordinator.register(ServiceCleanup::new(Arc::clone(&service)));

    let state = Arc::new(AppState::new(
        Arc::clone(service.proposals()),
        Arc::clone(service.scheduler()),
    ));
    service.start();

    let port = std::env::var("SECOPS_WEB_PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(cfg.web.port);
    let addr = format!("{}:{}", cfg.web.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("SecOps Web: http://{}", addr);

    let wait = Arc::clone(&shutdown);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { wait.wait_for_shutdown().await })
        .await?;

    coordinator.run_cleanup().await;
    Ok(())
}
