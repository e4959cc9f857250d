//! 提案存储与审批状态机
//!
//! 状态机：
//! - pending --accept--> accepted
//! - pending --ignore--> ignored
//! - 任意状态 --resubmit--> modified（参数合并，未知参数名忽略）
//!
//! 整张表一把读写锁：写操作独占，读操作共享，返回的都是快照副本。
//! 新提案通过容量为 10 的有界通道通知唯一的消费者；通道满时丢弃本条通知并告警，
//! 提案本身总会入库，创建方永远不会被阻塞。

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use std::task::{Context, Poll};

use chrono::Utc;
use futures_util::Stream;
use tokio::sync::{mpsc, RwLock};

use crate::core::SecOpsError;
use crate::secops::types::{Proposal, ProposalStatus};

/// 新提案通知通道容量
pub const NOTIFICATION_CAPACITY: usize = 10;

/// 提案存储
pub struct ProposalStore {
    proposals: RwLock<HashMap<String, Proposal>>,
    notify_tx: mpsc::Sender<Proposal>,
    /// 接收端只能被取走一次
    notify_rx: Mutex<Option<mpsc::Receiver<Proposal>>>,
}

impl Default for ProposalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProposalStore {
    pub fn new() -> Self {
        Self::with_capacity(NOTIFICATION_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(capacity.max(1));
        Self {
            proposals: RwLock::new(HashMap::new()),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
        }
    }

    /// 创建提案：补齐 ID 与时间戳后入库，并尝试非阻塞地推送通知；返回提案 ID。
    /// 调用方给出的 ID 已存在时覆盖旧提案（记 warn）
    pub async fn create(&self, mut proposal: Proposal) -> String {
        if proposal.id.is_empty() {
            proposal.id = uuid::Uuid::new_v4().to_string();
        }
        proposal.updated_at = Utc::now();
        if proposal.created_at > proposal.updated_at {
            proposal.created_at = proposal.updated_at;
        }
        let id = proposal.id.clone();

        let replaced = {
            let mut proposals = self.proposals.write().await;
            proposals.insert(id.clone(), proposal.clone())
        };
        if let Some(old) = replaced {
            tracing::warn!(
                id = %id,
                old_status = %old.status,
                old_title = %old.title,
                "Proposal id already exists, replacing stored proposal"
            );
        }

        tracing::info!(
            id = %id,
            kind = %proposal.kind,
            title = %proposal.title,
            "Proposal created"
        );

        if let Err(e) = self.notify_tx.try_send(proposal) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!(id = %id, "Proposal channel full, notification skipped");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    tracing::warn!(id = %id, "Proposal channel closed, notification skipped");
                }
            }
        }

        id
    }

    pub async fn get(&self, id: &str) -> Option<Proposal> {
        self.proposals.read().await.get(id).cloned()
    }

    /// 所有提案的快照，顺序不定；需要顺序时按 created_at 排序
    pub async fn get_all(&self) -> Vec<Proposal> {
        self.proposals.read().await.values().cloned().collect()
    }

    /// 待处理提案的快照
    pub async fn get_pending(&self) -> Vec<Proposal> {
        self.proposals
            .read()
            .await
            .values()
            .filter(|p| p.is_pending())
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.proposals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 接受提案；params 为本次处置附带的参数，只记录日志
    pub async fn accept(
        &self,
        id: &str,
        params: &HashMap<String, String>,
    ) -> Result<(), SecOpsError> {
        self.decide(id, ProposalStatus::Accepted, params).await
    }

    /// 忽略提案
    pub async fn ignore(
        &self,
        id: &str,
        params: &HashMap<String, String>,
    ) -> Result<(), SecOpsError> {
        self.decide(id, ProposalStatus::Ignored, params).await
    }

    async fn decide(
        &self,
        id: &str,
        target: ProposalStatus,
        params: &HashMap<String, String>,
    ) -> Result<(), SecOpsError> {
        let mut proposals = self.proposals.write().await;
        let p = proposals
            .get_mut(id)
            .ok_or_else(|| SecOpsError::ProposalNotFound(id.to_string()))?;

        if p.status != ProposalStatus::Pending {
            return Err(SecOpsError::AlreadyProcessed {
                id: id.to_string(),
                status: p.status,
            });
        }

        p.status = target;
        p.updated_at = Utc::now();

        tracing::info!(
            id = %p.id,
            kind = %p.kind,
            title = %p.title,
            status = %target,
            params = ?params,
            "Proposal decided"
        );
        Ok(())
    }

    /// 用修改后的参数重新提交：不检查当前状态，结果总是 modified
    pub async fn resubmit(
        &self,
        id: &str,
        params: &HashMap<String, String>,
    ) -> Result<Proposal, SecOpsError> {
        let mut proposals = self.proposals.write().await;
        let p = proposals
            .get_mut(id)
            .ok_or_else(|| SecOpsError::ProposalNotFound(id.to_string()))?;

        for (key, value) in params {
            if let Some(param) = p.parameters.get_mut(key) {
                param.value = value.clone();
            }
        }
        p.status = ProposalStatus::Modified;
        p.updated_at = Utc::now();

        tracing::info!(
            id = %p.id,
            kind = %p.kind,
            title = %p.title,
            params = ?params,
            "Proposal resubmitted with modified params"
        );
        Ok(p.clone())
    }

    /// 删除提案，返回是否确有删除
    pub async fn delete(&self, id: &str) -> bool {
        self.proposals.write().await.remove(id).is_some()
    }

    /// 取走新提案通知流；只有第一次调用返回 Some
    pub fn take_notifications(&self) -> Option<ProposalNotifications> {
        let mut slot = self.notify_rx.lock().unwrap_or_else(|e| e.into_inner());
        slot.take().map(|rx| ProposalNotifications { rx })
    }
}

/// 新提案通知流（单消费者）
pub struct ProposalNotifications {
    rx: mpsc::Receiver<Proposal>,
}

impl ProposalNotifications {
    pub async fn recv(&mut self) -> Option<Proposal> {
        self.rx.recv().await
    }

    /// 非阻塞读取一条；当前没有通知时返回 None
    pub fn try_recv(&mut self) -> Option<Proposal> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ProposalNotifications {
    type Item = Proposal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secops::types::Param;
    use serde_json::Map;

    fn sample(title: &str) -> Proposal {
        Proposal::new("risk", title, "summary", Map::new())
            .with_param(Param::new("risk", "high"))
            .with_param(Param::new("note", ""))
    }

    fn no_params() -> HashMap<String, String> {
        HashMap::new()
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_pending() {
        let store = ProposalStore::new();
        let id = store.create(sample("a")).await;
        assert!(!id.is_empty());
        let p = store.get(&id).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Pending);
        assert!(p.created_at <= p.updated_at);
    }

    #[tokio::test]
    async fn test_create_keeps_given_id() {
        let store = ProposalStore::new();
        let id = store.create(sample("a").with_id("fixed")).await;
        assert_eq!(id, "fixed");
        assert!(store.get("fixed").await.is_some());
    }

    #[tokio::test]
    async fn test_create_with_existing_id_replaces() {
        let store = ProposalStore::new();
        store.create(sample("first").with_id("dup")).await;
        store.accept("dup", &no_params()).await.unwrap();

        let id = store.create(sample("second").with_id("dup")).await;
        assert_eq!(id, "dup");
        assert_eq!(store.len().await, 1);
        let stored = store.get("dup").await.unwrap();
        assert_eq!(stored.title, "second");
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn test_accept_then_ignore_conflicts() {
        let store = ProposalStore::new();
        let id = store.create(sample("a")).await;
        store.accept(&id, &no_params()).await.unwrap();
        let err = store.ignore(&id, &no_params()).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.get(&id).await.unwrap().status, ProposalStatus::Accepted);
    }

    #[tokio::test]
    async fn test_ignore_then_accept_conflicts() {
        let store = ProposalStore::new();
        let id = store.create(sample("a")).await;
        store.ignore(&id, &no_params()).await.unwrap();
        let err = store.accept(&id, &no_params()).await.unwrap_err();
        assert!(matches!(
            err,
            SecOpsError::AlreadyProcessed { status: ProposalStatus::Ignored, .. }
        ));
        assert_eq!(store.get(&id).await.unwrap().status, ProposalStatus::Ignored);
    }

    #[tokio::test]
    async fn test_accept_unknown_leaves_store_unchanged() {
        let store = ProposalStore::new();
        store.create(sample("a")).await;
        let before = store.get_all().await.len();
        let err = store.accept("missing", &no_params()).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.get_all().await.len(), before);
    }

    #[tokio::test]
    async fn test_resubmit_merges_known_params_only() {
        let store = ProposalStore::new();
        let id = store.create(sample("a")).await;
        let mut params = HashMap::new();
        params.insert("risk".to_string(), "low".to_string());
        params.insert("unknown".to_string(), "x".to_string());
        let p = store.resubmit(&id, &params).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Modified);
        assert_eq!(p.parameters["risk"].value, "low");
        assert!(!p.parameters.contains_key("unknown"));
        assert_eq!(p.parameters.len(), 2);
    }

    // resubmit 对已处置的提案同样生效（有意保留的宽松行为）
    #[tokio::test]
    async fn test_resubmit_reopens_decided_proposal() {
        let store = ProposalStore::new();
        let id = store.create(sample("a")).await;
        store.accept(&id, &no_params()).await.unwrap();
        let p = store.resubmit(&id, &no_params()).await.unwrap();
        assert_eq!(p.status, ProposalStatus::Modified);
        // modified 不是 pending，accept 仍然冲突
        assert!(store.accept(&id, &no_params()).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_resubmit_unknown_is_not_found() {
        let store = ProposalStore::new();
        assert!(store.resubmit("nope", &no_params()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_pending_filter_and_delete() {
        let store = ProposalStore::new();
        let a = store.create(sample("a")).await;
        let b = store.create(sample("b")).await;
        store.ignore(&a, &no_params()).await.unwrap();
        let pending = store.get_pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b);

        assert!(store.delete(&a).await);
        assert!(!store.delete(&a).await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_notification_overflow_drops_but_stores() {
        let store = ProposalStore::new();
        for i in 0..11 {
            store.create(sample(&format!("p{i}"))).await;
        }
        assert_eq!(store.get_all().await.len(), 11);

        let mut notifications = store.take_notifications().unwrap();
        let mut delivered = 0;
        while notifications.try_recv().is_some() {
            delivered += 1;
        }
        assert_eq!(delivered, NOTIFICATION_CAPACITY);
    }

    #[tokio::test]
    async fn test_notifications_taken_once() {
        let store = ProposalStore::new();
        assert!(store.take_notifications().is_some());
        assert!(store.take_notifications().is_none());
    }

    #[tokio::test]
    async fn test_notification_stream_yields_created() {
        use futures_util::StreamExt;

        let store = ProposalStore::new();
        let mut stream = store.take_notifications().unwrap();
        let id = store.create(sample("streamed")).await;
        let p = stream.next().await.unwrap();
        assert_eq!(p.id, id);
        assert_eq!(p.title, "streamed");
    }

    #[tokio::test]
    async fn test_concurrent_decisions_single_winner() {
        use std::sync::Arc;

        let store = Arc::new(ProposalStore::new());
        let id = store.create(sample("race")).await;
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.accept(&id, &HashMap::new()).await.is_ok()
                } else {
                    store.ignore(&id, &HashMap::new()).await.is_ok()
                }
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(!store.get(&id).await.unwrap().is_pending());
    }
}
