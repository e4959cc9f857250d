//! 提案审批 HTTP 接口测试（需 `--features web`）

#![cfg(feature = "web")]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures_util::StreamExt;
use secops::agent::ReasoningEngine;
use secops::core::AgentError;
use secops::secops::{ActivityScheduler, Param, Proposal, ProposalStore};
use secops::web::{router, AppState};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

struct IdleEngine;

#[async_trait]
impl ReasoningEngine for IdleEngine {
    async fn process(
        &self,
        _prompt: &str,
        _channel: &str,
        _session_id: &str,
        _cancel: CancellationToken,
    ) -> Result<String, AgentError> {
        Ok("idle".into())
    }
}

async fn setup() -> (Router, Arc<ProposalStore>) {
    let store = Arc::new(ProposalStore::new());
    let scheduler = Arc::new(ActivityScheduler::new(Arc::new(IdleEngine)));
    let state = Arc::new(AppState::new(store.clone(), scheduler));
    (router(state), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn pending(store: &ProposalStore, title: &str) -> String {
    store
        .create(
            Proposal::new("risk", title, "summary", Map::new())
                .with_param(Param::new("note", "")),
        )
        .await
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup().await;
    let (status, body) = send(&app, "GET", "/api/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_list_and_filter() {
    let (app, store) = setup().await;
    let a = pending(&store, "a").await;
    pending(&store, "b").await;
    store.ignore(&a, &HashMap::new()).await.unwrap();

    let (status, body) = send(&app, "GET", "/api/proposals", "").await;
    assert_eq!(status, StatusCode::OK);
    let all: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0]["createdAt"].as_str().unwrap().len(), "2024-01-01 00:00:00".len());
    assert!(all[0].get("details").is_none());

    let (_, body) = send(&app, "GET", "/api/proposals?status=pending", "").await;
    let only_pending: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(only_pending.len(), 1);
    assert_eq!(only_pending[0]["title"], "b");

    let (status, _) = send(&app, "GET", "/api/proposals?status=bogus", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_and_delete() {
    let (app, store) = setup().await;
    let id = pending(&store, "a").await;

    let (status, body) = send(&app, "GET", &format!("/api/proposal/{id}"), "").await;
    assert_eq!(status, StatusCode::OK);
    let p: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(p["id"], id.as_str());
    assert_eq!(p["status"], "pending");
    assert_eq!(p["type"], "risk");

    let (status, _) = send(&app, "GET", "/api/proposal/nope", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", &format!("/api/proposal/{id}"), "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &format!("/api/proposal/{id}"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_accept_then_conflict() {
    let (app, store) = setup().await;
    let id = pending(&store, "a").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/proposal/{id}/accept"),
        r#"{"note": "ok"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["status"], "accepted");
    assert_eq!(v["id"], id.as_str());

    let (status, body) = send(&app, "POST", &format!("/api/proposal/{id}/ignore"), "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("already processed"));

    let (status, _) = send(&app, "POST", "/api/proposal/nope/accept", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_body_rejected() {
    let (app, store) = setup().await;
    let id = pending(&store, "a").await;
    let (status, _) = send(&app, "POST", &format!("/api/proposal/{id}/accept"), "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(store.get(&id).await.unwrap().is_pending());
}

#[tokio::test]
async fn test_resubmit_returns_modified_proposal() {
    let (app, store) = setup().await;
    let id = pending(&store, "a").await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/proposal/{id}/resubmit"),
        r#"{"note": "lower severity", "extra": "ignored"}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["status"], "resubmitted");
    assert_eq!(v["proposal"]["status"], "modified");
    assert_eq!(v["proposal"]["parameters"]["note"]["value"], "lower severity");
    assert!(v["proposal"]["parameters"].get("extra").is_none());
}

#[tokio::test]
async fn test_activities_snapshot() {
    let (app, _) = setup().await;
    let (status, body) = send(&app, "GET", "/api/activities", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "[]");
}

/// 订阅 /api/events，返回原始 SSE 字节流
async fn subscribe(app: &Router) -> axum::body::BodyDataStream {
    let req = Request::builder()
        .uri("/api/events")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    resp.into_body().into_data_stream()
}

/// 读到第一个完整的 SSE 帧（以空行结束）
async fn next_frame(events: &mut axum::body::BodyDataStream) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        let mut buf = String::new();
        while !buf.contains("\n\n") {
            let chunk = events.next().await.unwrap().unwrap();
            buf.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        buf
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_events_push_new_proposal_to_every_subscriber() {
    let (app, store) = setup().await;
    let mut first = subscribe(&app).await;
    let mut second = subscribe(&app).await;

    let id = pending(&store, "pushed").await;

    for events in [&mut first, &mut second] {
        let frame = next_frame(events).await;
        assert!(frame.starts_with("event: proposal\n"), "frame: {frame:?}");
        let data = frame
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .unwrap();
        let p: Value = serde_json::from_str(data).unwrap();
        assert_eq!(p["id"], id.as_str());
        assert_eq!(p["title"], "pushed");
        assert_eq!(p["status"], "pending");
    }
}

