//! HTTP 接口（axum）：SSE 流式对话、审批决策提交、挂起记录查询
//!
//! - GET  /                              服务说明
//! - GET  /health                        健康检查
//! - POST /stream/chat                   SSE，每帧 `data: <json>`
//! - POST /threads/:thread_id/decisions  为挂起会话预提交决策
//! - GET  /threads/:thread_id/interrupt  查看挂起记录
//!
//! 所有路由允许跨域（任意来源、方法与请求头），供浏览器前端直接调用。

pub mod stream;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header::HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::agent::Runtime;
use crate::store::Decision;

pub use stream::{ChatRequest, ChatService, StreamEvent};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionsRequest {
    pub decisions: Vec<Decision>,
}

pub fn router(service: Arc<ChatService>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/stream/chat", post(stream_chat))
        .route("/threads/:thread_id/decisions", post(stage_decisions))
        .route("/threads/:thread_id/interrupt", get(get_interrupt))
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "endpoints": {
            "stream_chat": "POST /stream/chat",
            "stage_decisions": "POST /threads/{thread_id}/decisions",
            "pending_interrupt": "GET /threads/{thread_id}/interrupt",
            "health": "GET /health",
        },
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// POST /stream/chat：SSE 事件流
async fn stream_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    tracing::info!(thread_id = ?req.thread_id, "stream chat request");
    let events = state.service.stream_chat(req).map(|ev| {
        let data = serde_json::to_string(&ev)
            .unwrap_or_else(|e| json!({"type": "error", "message": e.to_string()}).to_string());
        Ok::<_, Infallible>(Event::default().data(data))
    });
    let sse = Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    );
    (
        [(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"))],
        sse,
    )
        .into_response()
}

/// POST /threads/:thread_id/decisions
async fn stage_decisions(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<DecisionsRequest>,
) -> Response {
    let count = req.decisions.len();
    match state.service.stage_decisions(&thread_id, req.decisions).await {
        Ok(actions) => Json(json!({
            "thread_id": thread_id,
            "staged": count,
            "action_requests": actions,
        }))
        .into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({"error": e.to_string()}))).into_response(),
    }
}

/// GET /threads/:thread_id/interrupt
async fn get_interrupt(State(state): State<AppState>, Path(thread_id): Path<String>) -> Response {
    match state.service.pending_interrupt(&thread_id).await {
        Some(pending) => Json(pending).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("no pending interrupt for {thread_id}")})),
        )
            .into_response(),
    }
}

/// 启动 HTTP 服务；配置了过期时间时同时启动定期清理任务
pub async fn serve(runtime: Runtime, host: &str, port: u16) -> anyhow::Result<()> {
    if let Some(period) = runtime.sweep_interval {
        let sweeper = runtime.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = sweeper.cleanup_expired().await;
                if purged > 0 {
                    tracing::info!(purged, "expired sessions and interrupts removed");
                }
            }
        });
    }

    let app = router(runtime.service.clone());
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
