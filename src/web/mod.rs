//! 提案审批 HTTP 接口（axum）
//!
//! - GET    /api/proposals?status=pending   提案摘要列表，按创建时间倒序
//! - GET    /api/proposal/:id               提案详情
//! - DELETE /api/proposal/:id
//! - POST   /api/proposal/:id/accept|ignore|resubmit   可选 JSON 对象请求体
//! - GET    /api/activities                 活动运行快照
//! - GET    /api/events                     新提案 SSE 推送
//!
//! 未知 ID 返回 404，已处理或请求体非法返回 400。

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::core::SecOpsError;
use crate::secops::{ActivityScheduler, ActivitySnapshot, Proposal, ProposalStatus, ProposalStore};

/// SSE 广播缓冲
const EVENT_BUFFER: usize = 64;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct AppState {
    pub proposals: Arc<ProposalStore>,
    pub scheduler: Arc<ActivityScheduler>,
    events: broadcast::Sender<String>,
}

impl AppState {
    /// 取走提案通知流并转发到广播通道，供多个 SSE 客户端订阅；需在 tokio 运行时内调用
    pub fn new(proposals: Arc<ProposalStore>, scheduler: Arc<ActivityScheduler>) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        match proposals.take_notifications() {
            Some(mut notifications) => {
                let tx = events.clone();
                tokio::spawn(async move {
                    while let Some(p) = notifications.recv().await {
                        if let Ok(json) = serde_json::to_string(&p) {
                            // 没有订阅者时丢弃
                            let _ = tx.send(json);
                        }
                    }
                });
            }
            None => tracing::warn!("Proposal notifications already taken, /api/events will stay silent"),
        }
        Self {
            proposals,
            scheduler,
            events,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/proposals", get(api_proposals_list))
        .route(
            "/api/proposal/:id",
            get(api_proposal_get).delete(api_proposal_delete),
        )
        .route("/api/proposal/:id/accept", post(api_proposal_accept))
        .route("/api/proposal/:id/ignore", post(api_proposal_ignore))
        .route("/api/proposal/:id/resubmit", post(api_proposal_resubmit))
        .route("/api/activities", get(api_activities))
        .route("/api/events", get(api_events_sse))
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn api_error(e: SecOpsError) -> ApiError {
    let code = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_conflict() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (code, e.to_string())
}

/// 可选 JSON 对象请求体 -> 字符串参数表；空体视为无参数，非字符串值按 JSON 文本保存
fn parse_params_body(body: &[u8]) -> Result<HashMap<String, String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(HashMap::new());
    }
    let map: HashMap<String, Value> = serde_json::from_slice(body)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid body: {e}")))?;
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposalSummary {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    summary: String,
    status: ProposalStatus,
    created_at: String,
    updated_at: String,
}

impl From<&Proposal> for ProposalSummary {
    fn from(p: &Proposal) -> Self {
        Self {
            id: p.id.clone(),
            kind: p.kind.clone(),
            title: p.title.clone(),
            summary: p.summary.clone(),
            status: p.status,
            created_at: p.created_at.format(TIME_FORMAT).to_string(),
            updated_at: p.updated_at.format(TIME_FORMAT).to_string(),
        }
    }
}

/// GET /api/proposals
async fn api_proposals_list(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Vec<ProposalSummary>>, ApiError> {
    let filter = match q.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(
            ProposalStatus::parse(s)
                .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown status: {s}")))?,
        ),
        None => None,
    };

    let mut proposals = state.proposals.get_all().await;
    proposals.retain(|p| filter.map_or(true, |s| p.status == s));
    proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(Json(proposals.iter().map(ProposalSummary::from).collect()))
}

/// GET /api/proposal/:id
async fn api_proposal_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Proposal>, ApiError> {
    state
        .proposals
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(SecOpsError::ProposalNotFound(id)))
}

/// DELETE /api/proposal/:id
async fn api_proposal_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.proposals.delete(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(SecOpsError::ProposalNotFound(id)))
    }
}

/// POST /api/proposal/:id/accept
async fn api_proposal_accept(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let params = parse_params_body(&body)?;
    state.proposals.accept(&id, &params).await.map_err(api_error)?;
    Ok(Json(serde_json::json!({ "status": "accepted", "id": id })))
}

/// POST /api/proposal/:id/ignore
async fn api_proposal_ignore(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let params = parse_params_body(&body)?;
    state.proposals.ignore(&id, &params).await.map_err(api_error)?;
    Ok(Json(serde_json::json!({ "status": "ignored", "id": id })))
}

/// POST /api/proposal/:id/resubmit
async fn api_proposal_resubmit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let params = parse_params_body(&body)?;
    let proposal = state
        .proposals
        .resubmit(&id, &params)
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({
        "status": "resubmitted",
        "id": id,
        "proposal": proposal,
    })))
}

/// GET /api/activities
async fn api_activities(State(state): State<Arc<AppState>>) -> Json<Vec<ActivitySnapshot>> {
    Json(state.scheduler.snapshots())
}

/// GET /api/events：每条新提案一个 `proposal` 事件
async fn api_events_sse(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let event_stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(msg) => return Some((msg, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .map(|msg| Ok(Event::default().event("proposal").data(msg)));
    Sse::new(event_stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    )
}
