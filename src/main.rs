//! SecOps 无头服务
//!
//! 加载配置、装配安全运营服务并启动全部启用的活动，直到收到 Ctrl+C / SIGTERM。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use secops::config::load_config;
use secops::core::{run_with_graceful_shutdown, ServiceCleanup, ShutdownCoordinator, ShutdownManager};
use secops::llm::create_llm_from_config;
use secops::secops::SecOpsService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    secops::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    tracing::info!(app = %cfg.app.name, "Starting");

    let shutdown = Arc::new(ShutdownManager::new());
    let llm = create_llm_from_config(&cfg.llm);
    let service = SecOpsService::from_config(&cfg, llm, shutdown.token())
        .context("Failed to build SecOps service")?;
    let Some(service) = service else {
        tracing::info!("Nothing to run, exiting");
        return Ok(());
    };
    let service = Arc::new(service);

    let mut coordinator = ShutdownCoordinator::new().with_timeout(30);
    coordinator.register(ServiceCleanup::new(Arc::clone(&service)));

    service.start();
    let coordinator = &coordinator;
    run_with_graceful_shutdown(
        Arc::clone(&shutdown),
        std::future::pending::<()>(),
        move || async move { coordinator.run_cleanup().await },
    )
    .await;

    Ok(())
}
