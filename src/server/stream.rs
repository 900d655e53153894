//! 流式对话服务（与传输无关）
//!
//! `stream_chat` 把一次请求变成有序事件流：可选的 `resume`，若干 `message`，至多一个 `interrupt`，
//! 出错时 `error`，最后恰好一个 `done`。实际工作在独立任务中运行；事件流被丢弃（客户端断开）时
//! 取消令牌触发，控制循环在当前节点处停止，存储保持上一个稳定点。

use std::sync::Arc;

use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::graph::{new_thread_id, Node, NodeMessage, ResearchGraph, RunOutcome};
use crate::store::{ActionRequest, Decision, KeyValueStore, PendingInterrupt};

/// 对话请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatRequest {
    /// 新目标或追加消息；恢复挂起会话时忽略
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// 随请求附带的审批决策（优先于预先提交的决策）
    #[serde(default)]
    pub decisions: Option<Vec<Decision>>,
}

/// 流式事件（序列化为 `{"type": ..., ...}`）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Resume {
        thread_id: String,
        message: String,
    },
    Message {
        content: String,
        node: Node,
    },
    Interrupt {
        thread_id: String,
        action_requests: Vec<ActionRequest>,
        message: String,
    },
    Error {
        message: String,
    },
    Done {
        message: String,
        thread_id: String,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Resume { .. } => "resume",
            StreamEvent::Message { .. } => "message",
            StreamEvent::Interrupt { .. } => "interrupt",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done { .. } => "done",
        }
    }
}

pub struct ChatService {
    graph: Arc<ResearchGraph>,
    staged: Arc<dyn KeyValueStore<Vec<Decision>>>,
}

impl ChatService {
    pub fn new(graph: Arc<ResearchGraph>, staged: Arc<dyn KeyValueStore<Vec<Decision>>>) -> Self {
        Self { graph, staged }
    }

    pub fn graph(&self) -> &Arc<ResearchGraph> {
        &self.graph
    }

    pub async fn pending_interrupt(&self, thread_id: &str) -> Option<PendingInterrupt> {
        self.graph.pending_interrupt(thread_id).await
    }

    /// 为挂起中的会话预先提交决策，下次恢复请求时使用；返回待审批动作数
    pub async fn stage_decisions(&self, thread_id: &str, decisions: Vec<Decision>) -> Result<usize, AgentError> {
        let pending = self
            .graph
            .pending_interrupt(thread_id)
            .await
            .ok_or_else(|| AgentError::NoPendingInterrupt(thread_id.to_string()))?;
        tracing::info!(thread_id = %thread_id, decisions = decisions.len(), "decisions staged");
        self.staged.set(thread_id, decisions).await;
        Ok(pending.action_requests.len())
    }

    /// 清理过期的预提交决策
    pub async fn cleanup_expired(&self) -> usize {
        self.staged.cleanup_expired().await
    }

    /// 处理一次请求，返回以 `done` 结尾的事件流
    pub fn stream_chat(&self, req: ChatRequest) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let thread_id = req
            .thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(new_thread_id);

        let (tx, rx) = mpsc::unbounded_channel::<StreamEvent>();
        let cancel = CancellationToken::new();

        let graph = self.graph.clone();
        let staged = self.staged.clone();
        let work_cancel = cancel.clone();
        let work_thread = thread_id.clone();
        tokio::spawn(async move {
            let err_tx = tx.clone();
            let handle = tokio::spawn(handle_request(graph, staged, work_thread, req, tx, work_cancel));
            let failure = match handle.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) if e.is_panic() => Some("internal error while processing the request".to_string()),
                Err(e) => Some(e.to_string()),
            };
            if let Some(message) = failure {
                tracing::warn!(error = %message, "chat request failed");
                let _ = err_tx.send(StreamEvent::Error { message });
            }
        });

        let guard = cancel.drop_guard();
        let events = stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|ev| (ev, (rx, guard)))
        });
        events.chain(stream::once(async move {
            StreamEvent::Done {
                message: "Stream completed".to_string(),
                thread_id,
            }
        }))
    }
}

async fn handle_request(
    graph: Arc<ResearchGraph>,
    staged: Arc<dyn KeyValueStore<Vec<Decision>>>,
    thread_id: String,
    req: ChatRequest,
    tx: UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
) -> Result<(), AgentError> {
    let (node_tx, mut node_rx) = mpsc::unbounded_channel::<NodeMessage>();
    let forward_tx = tx.clone();
    let forward = tokio::spawn(async move {
        while let Some(m) = node_rx.recv().await {
            let _ = forward_tx.send(StreamEvent::Message {
                content: m.content,
                node: m.node,
            });
        }
    });

    let resuming = graph.pending_interrupt(&thread_id).await.is_some();
    let outcome = if resuming {
        // 预提交的决策只在挂起记录仍在时保留（恢复被取消或出错），否则用后即删
        let staged_decisions = staged.get(&thread_id).await;
        let decisions = req.decisions.or(staged_decisions).unwrap_or_default();
        let _ = tx.send(StreamEvent::Resume {
            thread_id: thread_id.clone(),
            message: format!("Resuming execution with {} decision(s)", decisions.len()),
        });
        graph.resume(&thread_id, decisions, Some(&node_tx), &cancel).await
    } else {
        let message = req.message.trim();
        if message.is_empty() {
            drop(node_tx);
            let _ = forward.await;
            let _ = tx.send(StreamEvent::Error {
                message: "message must not be empty".to_string(),
            });
            return Ok(());
        }
        graph.run(&thread_id, message, Some(&node_tx), &cancel).await
    };

    if resuming {
        let interrupted = matches!(outcome, Ok(RunOutcome::Cancelled) | Err(_));
        if !interrupted || graph.pending_interrupt(&thread_id).await.is_none() {
            staged.take(&thread_id).await;
        }
    }

    // 所有 message 先于 interrupt 送出
    drop(node_tx);
    let _ = forward.await;

    match outcome? {
        RunOutcome::Done { reason, state } => {
            tracing::info!(
                thread_id = %thread_id,
                reason = ?reason,
                iterations = state.iteration_count,
                "chat request completed"
            );
        }
        RunOutcome::Suspended(pending) => {
            let _ = tx.send(StreamEvent::Interrupt {
                thread_id: pending.thread_id,
                action_requests: pending.action_requests,
                message: "Execution paused: human approval required".to_string(),
            });
        }
        RunOutcome::Cancelled => {
            tracing::info!(thread_id = %thread_id, "chat request cancelled by client");
        }
    }
    Ok(())
}
