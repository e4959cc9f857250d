//! 活动调度器
//!
//! 每个启用的活动一个独立的 tokio 任务：启动时立即执行一次，之后每个间隔执行一次。
//! 循环在执行期间不响应 tick，同一活动不会并发执行，慢执行只会推迟下一次。
//! 循环在 ticker / 自身停止信号 / 全局关闭信号三者上 select，三者同时就绪时没有优先级。
//! 单次执行失败只记日志，不重试、不退避，也不影响其它活动。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::agent::ReasoningEngine;
use crate::secops::prompts::build_activity_prompt;
use crate::secops::schedule::parse_schedule;
use crate::secops::types::{Activity, ActivityMode};

/// 活动执行时使用的渠道名
pub const SECOPS_CHANNEL: &str = "secops";

/// 结果日志中保留的最大字符数
const REPLY_PREVIEW_CHARS: usize = 200;

/// 单个活动的运行时快照（供 Web / 日志观察）
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySnapshot {
    pub name: String,
    pub schedule: String,
    pub mode: ActivityMode,
    pub interval_secs: u64,
    pub runs: u64,
    pub failures: u64,
    pub last_run_at: Option<String>,
    pub last_success_at: Option<String>,
    pub last_error_at: Option<String>,
    pub last_error: Option<String>,
    pub is_running: bool,
}

impl ActivitySnapshot {
    fn new(activity: &Activity, interval: Duration) -> Self {
        Self {
            name: activity.name.clone(),
            schedule: activity.schedule.clone(),
            mode: activity.mode,
            interval_secs: interval.as_secs(),
            runs: 0,
            failures: 0,
            last_run_at: None,
            last_success_at: None,
            last_error_at: None,
            last_error: None,
            is_running: false,
        }
    }
}

/// 活动执行统计
#[derive(Default)]
pub struct ActivityTelemetry {
    jobs: Mutex<HashMap<String, ActivitySnapshot>>,
}

impl ActivityTelemetry {
    fn register(&self, activity: &Activity, interval: Duration) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        jobs.insert(activity.name.clone(), ActivitySnapshot::new(activity, interval));
    }

    fn mark_started(&self, name: &str) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get_mut(name) {
            job.runs += 1;
            job.last_run_at = Some(Utc::now().to_rfc3339());
            job.is_running = true;
        }
    }

    fn mark_success(&self, name: &str) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get_mut(name) {
            job.last_success_at = Some(Utc::now().to_rfc3339());
            job.is_running = false;
        }
    }

    fn mark_failure(&self, name: &str, message: String) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(job) = jobs.get_mut(name) {
            job.failures += 1;
            job.last_error_at = Some(Utc::now().to_rfc3339());
            job.last_error = Some(message);
            job.is_running = false;
        }
    }

    /// 按名称排序的快照
    pub fn snapshots(&self) -> Vec<ActivitySnapshot> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<ActivitySnapshot> = jobs.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}

/// 运行中活动的句柄：私有停止信号 + 循环任务
struct ActivityHandle {
    stop: CancellationToken,
    join: JoinHandle<()>,
}

/// 活动调度器：持有 活动名 -> 运行句柄 的映射与全局关闭信号
pub struct ActivityScheduler {
    engine: Arc<dyn ReasoningEngine>,
    shutdown: CancellationToken,
    handles: Mutex<HashMap<String, ActivityHandle>>,
    telemetry: Arc<ActivityTelemetry>,
}

impl ActivityScheduler {
    pub fn new(engine: Arc<dyn ReasoningEngine>) -> Self {
        Self::with_shutdown(engine, CancellationToken::new())
    }

    /// 使用外部关闭信号（如 ShutdownManager 的 token）；调度器自身只取消其子 token
    pub fn with_shutdown(engine: Arc<dyn ReasoningEngine>, parent: CancellationToken) -> Self {
        Self {
            engine,
            shutdown: parent.child_token(),
            handles: Mutex::new(HashMap::new()),
            telemetry: Arc::new(ActivityTelemetry::default()),
        }
    }

    /// 为每个启用的活动启动独立循环，立即返回；已在运行的同名活动跳过
    pub fn start(&self, activities: &[Activity]) {
        if self.shutdown.is_cancelled() {
            tracing::warn!("Activity scheduler already shut down, start ignored");
            return;
        }

        tracing::info!(activities = activities.len(), "Starting activity scheduler");

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for activity in activities {
            if !activity.enabled {
                tracing::info!(activity = %activity.name, "Activity is disabled");
                continue;
            }
            if handles.contains_key(&activity.name) {
                tracing::warn!(activity = %activity.name, "Activity already running, skipped");
                continue;
            }

            let interval = parse_schedule(&activity.schedule);
            self.telemetry.register(activity, interval);

            let stop = CancellationToken::new();
            let join = tokio::spawn(run_activity(
                Arc::clone(&self.engine),
                activity.clone(),
                interval,
                stop.clone(),
                self.shutdown.clone(),
                Arc::clone(&self.telemetry),
            ));
            handles.insert(activity.name.clone(), ActivityHandle { stop, join });
        }
    }

    /// 停止单个活动并等待其循环退出；返回该活动是否在运行
    pub async fn stop_activity(&self, name: &str) -> bool {
        let handle = {
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.remove(name)
        };
        match handle {
            Some(handle) => {
                handle.stop.cancel();
                if let Err(e) = handle.join.await {
                    tracing::warn!(activity = %name, error = %e, "Activity task ended abnormally");
                }
                true
            }
            None => false,
        }
    }

    /// 取消全局信号与所有私有信号，等待全部循环退出；可重复调用
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let handles: Vec<(String, ActivityHandle)> = {
            let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
            handles.drain().collect()
        };
        if handles.is_empty() {
            return;
        }

        for (_, handle) in &handles {
            handle.stop.cancel();
        }
        for (name, handle) in handles {
            if let Err(e) = handle.join.await {
                tracing::warn!(activity = %name, error = %e, "Activity task ended abnormally");
            }
        }
        tracing::info!("Activity scheduler stopped");
    }

    pub fn is_running(&self, name: &str) -> bool {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        handles.contains_key(name)
    }

    /// 运行中的活动名（已排序）
    pub fn running_activities(&self) -> Vec<String> {
        let handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = handles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn snapshots(&self) -> Vec<ActivitySnapshot> {
        self.telemetry.snapshots()
    }

    /// 全局关闭信号（调度器内部的子 token）
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

async fn run_activity(
    engine: Arc<dyn ReasoningEngine>,
    activity: Activity,
    interval: Duration,
    stop: CancellationToken,
    shutdown: CancellationToken,
    telemetry: Arc<ActivityTelemetry>,
) {
    tracing::info!(
        activity = %activity.name,
        interval_secs = interval.as_secs(),
        mode = %activity.mode,
        "Activity started"
    );

    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    execute_activity(engine.as_ref(), &activity, &shutdown, &telemetry).await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                execute_activity(engine.as_ref(), &activity, &shutdown, &telemetry).await;
            }
            _ = stop.cancelled() => {
                tracing::info!(activity = %activity.name, "Activity stopped");
                return;
            }
            _ = shutdown.cancelled() => {
                return;
            }
        }
    }
}

async fn execute_activity(
    engine: &dyn ReasoningEngine,
    activity: &Activity,
    cancel: &CancellationToken,
    telemetry: &ActivityTelemetry,
) {
    tracing::info!(activity = %activity.name, "Executing activity");
    telemetry.mark_started(&activity.name);

    let prompt = build_activity_prompt(&activity.name, activity.mode);
    match engine
        .process(&prompt, SECOPS_CHANNEL, &activity.name, cancel.clone())
        .await
    {
        Ok(reply) => {
            let preview: String = reply.chars().take(REPLY_PREVIEW_CHARS).collect();
            tracing::info!(activity = %activity.name, reply = %preview, "Activity completed");
            telemetry.mark_success(&activity.name);
        }
        Err(e) => {
            tracing::error!(activity = %activity.name, error = %e, "Activity failed");
            telemetry.mark_failure(&activity.name, e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEngine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningEngine for CountingEngine {
        async fn process(
            &self,
            _prompt: &str,
            _channel: &str,
            _session_id: &str,
            _cancel: CancellationToken,
        ) -> Result<String, AgentError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("ok".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_without_start_is_noop() {
        let engine = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let scheduler = ActivityScheduler::new(engine.clone());
        scheduler.stop().await;
        scheduler.stop().await;
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_after_stop_ignored() {
        let engine = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let scheduler = ActivityScheduler::new(engine.clone());
        scheduler.stop().await;
        scheduler.start(&[Activity::new("risk_analysis", "1m", ActivityMode::Auto)]);
        assert!(scheduler.running_activities().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_registered_with_parsed_interval() {
        let engine = Arc::new(CountingEngine { calls: AtomicUsize::new(0) });
        let scheduler = ActivityScheduler::new(engine);
        scheduler.start(&[Activity::new("weak_analysis", "*/5 * * * *", ActivityMode::Manual)]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snaps = scheduler.snapshots();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].interval_secs, 30 * 60);
        assert_eq!(snaps[0].runs, 1);
        scheduler.stop().await;
    }
}
