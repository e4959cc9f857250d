//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 取消全局 CancellationToken；调度器持有其子 token，
//! 正在执行的活动随之取消。之后由 ShutdownCoordinator 依次执行清理（停止服务、关闭适配器）。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::secops::SecOpsService;

/// 默认单个清理任务超时
const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 5;

/// 全局关闭信号
#[derive(Clone, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全局 token 的克隆；服务装配时由此派生子 token
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭，可重复调用
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 监听 Ctrl+C 与 SIGTERM（unix），任一到达即触发关闭
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(signal = "SIGINT", "Shutting down");
                manager.shutdown();
            }
        });

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let manager = Arc::clone(self);
            tokio::spawn(async move {
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                        tracing::info!(signal = "SIGTERM", "Shutting down");
                        manager.shutdown();
                    }
                    Err(e) => tracing::warn!(error = %e, "SIGTERM handler not installed"),
                }
            });
        }
    }
}

/// 关闭阶段的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 日志中的任务名
    fn name(&self) -> &'static str;
}

/// 按注册顺序执行清理；每个任务单独限时，失败或超时只记日志
pub struct ShutdownCoordinator {
    tasks: Vec<Box<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_CLEANUP_TIMEOUT_SECS),
        }
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.tasks.push(Box::new(task));
    }

    pub async fn run_cleanup(&self) {
        tracing::info!(tasks = self.tasks.len(), "Running cleanup");

        for task in &self.tasks {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::info!(task = name, "Cleanup done"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "Cleanup failed"),
                Err(_) => tracing::warn!(
                    task = name,
                    timeout_secs = self.timeout.as_secs(),
                    "Cleanup timed out"
                ),
            }
        }
    }
}

/// 停止全部活动并关闭出站适配器
pub struct ServiceCleanup {
    service: Arc<SecOpsService>,
}

impl ServiceCleanup {
    pub fn new(service: Arc<SecOpsService>) -> Self {
        Self { service }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for ServiceCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.service.stop().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SecOpsService"
    }
}

/// 运行 app 直到其结束或收到关闭信号，然后执行 cleanup
pub async fn run_with_graceful_shutdown<F, Fut>(
    shutdown_manager: Arc<ShutdownManager>,
    app: F,
    cleanup: impl FnOnce() -> Fut,
) where
    F: Future<Output = ()>,
    Fut: Future<Output = ()>,
{
    shutdown_manager.install_signal_handlers();

    tokio::select! {
        _ = app => tracing::info!("Application finished"),
        _ = shutdown_manager.wait_for_shutdown() => tracing::info!("Shutdown signal received"),
    }

    cleanup().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_shutdown_cancels_cloned_tokens() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        let child = token.child_token();
        assert!(!token.is_cancelled());

        manager.shutdown();
        manager.shutdown();
        assert!(token.is_cancelled());
        assert!(child.is_cancelled());
    }

    struct Flag(Arc<AtomicBool>);

    #[async_trait::async_trait]
    impl ShutdownCleanup for Flag {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "flag"
        }
    }

    struct Failing(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl ShutdownCleanup for Failing {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("disk gone")
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct Stuck;

    #[async_trait::async_trait]
    impl ShutdownCleanup for Stuck {
        async fn cleanup(&self) -> anyhow::Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "stuck"
        }
    }

    #[tokio::test]
    async fn test_failed_cleanup_does_not_skip_the_rest() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicBool::new(false));
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.register(Failing(attempts.clone()));
        coordinator.register(Flag(done.clone()));

        coordinator.run_cleanup().await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_cleanup_times_out() {
        let done = Arc::new(AtomicBool::new(false));
        let mut coordinator = ShutdownCoordinator::new().with_timeout(1);
        coordinator.register(Stuck);
        coordinator.register(Flag(done.clone()));

        coordinator.run_cleanup().await;
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_graceful_shutdown_runs_cleanup_after_signal() {
        let manager = Arc::new(ShutdownManager::new());
        let cleaned = Arc::new(AtomicBool::new(false));

        let trigger = Arc::clone(&manager);
        tokio::spawn(async move { trigger.shutdown() });

        let flag = cleaned.clone();
        run_with_graceful_shutdown(manager, std::future::pending::<()>(), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert!(cleaned.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_service_cleanup_stops_scheduler() {
        let manager = ShutdownManager::new();
        let service = Arc::new(
            SecOpsService::from_config(
                &crate::config::AppConfig::default(),
                Arc::new(crate::llm::MockLlmClient::new()),
                manager.token(),
            )
            .unwrap()
            .unwrap(),
        );
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.register(ServiceCleanup::new(service.clone()));

        manager.shutdown();
        coordinator.run_cleanup().await;
        assert!(service.scheduler().shutdown_token().is_cancelled());
    }
}
