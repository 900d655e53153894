//! 控制循环：PLANNING → (FACTORY → ACTING → COUNTING → PLANNING)* → DONE，ACTING 可转入 SUSPENDED
//!
//! - 迭代上限在规划之后、进入 FACTORY 之前检查；COUNTING 只把 iteration_count 加一。
//! - Planner 失败（空 delta）即以 planner_failed 结束，避免空转。
//! - 会话状态只在稳定点写入：规划后、计数后、挂起时、结束时；挂起时先写会话再写挂起记录。
//! - 每个节点都与取消令牌竞争，取消时直接返回，存储保持上一个稳定点。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::agents::{ActorFactory, ActorOutcome, DynamicActor, Planner};
use crate::core::AgentError;
use crate::graph::events::{send_event, Node, NodeMessage};
use crate::graph::state::{ActorAssignment, Phase, SessionDelta, SessionState};
use crate::memory::Message;
use crate::store::interrupt::align_decisions;
use crate::store::{Decision, KeyValueStore, PendingInterrupt};

/// 结束原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoneReason {
    /// Planner 不再给出子任务
    Completed,
    /// 达到迭代上限
    IterationCap,
    /// Planner 调用或解析失败
    PlannerFailed,
}

/// 单次调用（run / resume）的结局
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Done { reason: DoneReason, state: SessionState },
    Suspended(PendingInterrupt),
    Cancelled,
}

/// 与取消令牌竞争；取消时从当前函数返回 Ok(RunOutcome::Cancelled)
macro_rules! or_cancel {
    ($cancel:expr, $fut:expr) => {
        tokio::select! {
            biased;
            _ = $cancel.cancelled() => return Ok(RunOutcome::Cancelled),
            out = $fut => out,
        }
    };
}

pub struct ResearchGraph {
    planner: Planner,
    factory: ActorFactory,
    actor: DynamicActor,
    sessions: Arc<dyn KeyValueStore<SessionState>>,
    interrupts: Arc<dyn KeyValueStore<PendingInterrupt>>,
    max_iterations: usize,
    default_decision: Decision,
}

impl ResearchGraph {
    pub fn new(
        planner: Planner,
        factory: ActorFactory,
        actor: DynamicActor,
        sessions: Arc<dyn KeyValueStore<SessionState>>,
        interrupts: Arc<dyn KeyValueStore<PendingInterrupt>>,
    ) -> Self {
        Self {
            planner,
            factory,
            actor,
            sessions,
            interrupts,
            max_iterations: 10,
            default_decision: Decision::Reject { message: None },
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// 恢复时缺失决策的补位
    pub fn with_default_decision(mut self, decision: Decision) -> Self {
        self.default_decision = decision;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub async fn session(&self, thread_id: &str) -> Option<SessionState> {
        self.sessions.get(thread_id).await
    }

    pub async fn pending_interrupt(&self, thread_id: &str) -> Option<PendingInterrupt> {
        self.interrupts.get(thread_id).await
    }

    /// 以新目标开始一轮运行；已有会话保留对话历史，未决的挂起记录被放弃
    pub async fn run(
        &self,
        thread_id: &str,
        objective: &str,
        events: Option<&UnboundedSender<NodeMessage>>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        let state = match self.sessions.get(thread_id).await {
            Some(mut existing) => {
                if self.interrupts.take(thread_id).await.is_some() {
                    tracing::warn!(thread_id = %thread_id, "abandoning pending interrupt for new run");
                }
                existing.continue_with(objective);
                existing
            }
            None => SessionState::new(thread_id, objective),
        };
        tracing::info!(thread_id = %thread_id, history = state.message_history.len(), "run started");
        self.drive(state, events, cancel).await
    }

    /// 以决策恢复挂起的会话；挂起记录恰好被消费一次
    ///
    /// 会话校验通过后才取走挂起记录，校验失败时记录保持原样。
    pub async fn resume(
        &self,
        thread_id: &str,
        decisions: Vec<Decision>,
        events: Option<&UnboundedSender<NodeMessage>>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        if self.interrupts.get(thread_id).await.is_none() {
            return Err(AgentError::NoPendingInterrupt(thread_id.to_string()));
        }
        let mut state = self
            .sessions
            .get(thread_id)
            .await
            .ok_or_else(|| AgentError::SessionNotFound(thread_id.to_string()))?;
        if state.phase != Phase::Suspended {
            return Err(AgentError::InvalidState(format!(
                "session {thread_id} is {:?}, not suspended",
                state.phase
            )));
        }
        let Some(checkpoint) = state.suspended_actor.take() else {
            return Err(AgentError::InvalidState(format!(
                "session {thread_id} has no suspended worker"
            )));
        };
        let pending = self
            .interrupts
            .take(thread_id)
            .await
            .ok_or_else(|| AgentError::NoPendingInterrupt(thread_id.to_string()))?;
        let decisions = align_decisions(decisions, pending.action_requests.len(), &self.default_decision);
        tracing::info!(
            thread_id = %thread_id,
            iteration = state.iteration_count,
            decisions = decisions.len(),
            "resuming suspended worker"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // 放回挂起记录，存储回到挂起时的稳定点
                self.interrupts.set(thread_id, pending).await;
                return Ok(RunOutcome::Cancelled);
            }
            out = self.actor.resume(checkpoint, decisions) => out,
        };
        state.phase = Phase::Acting;
        match self.after_acting(state, outcome, events).await {
            Ok(state) => self.drive(state, events, cancel).await,
            Err(outcome) => Ok(outcome),
        }
    }

    async fn drive(
        &self,
        mut state: SessionState,
        events: Option<&UnboundedSender<NodeMessage>>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, AgentError> {
        loop {
            match state.phase {
                Phase::Planning => {
                    let delta = or_cancel!(cancel, self.planning_node(&state));
                    let failed = delta.is_empty();
                    state.apply(delta);
                    if failed {
                        send_event(events, Node::Planner, "Planner could not produce a plan; stopping.");
                        return Ok(self.finish(state, DoneReason::PlannerFailed).await);
                    }
                    send_event(events, Node::Planner, planner_message(&state));
                    if state.current_subtask.is_none() {
                        return Ok(self.finish(state, DoneReason::Completed).await);
                    }
                    if state.iteration_count >= self.max_iterations {
                        send_event(
                            events,
                            Node::Planner,
                            format!("Iteration limit of {} reached; stopping.", self.max_iterations),
                        );
                        return Ok(self.finish(state, DoneReason::IterationCap).await);
                    }
                    state.phase = Phase::Factory;
                    self.persist(&state).await;
                }
                Phase::Factory => {
                    let Some(subtask) = state.current_subtask.clone() else {
                        return Ok(self.finish(state, DoneReason::Completed).await);
                    };
                    let delta = or_cancel!(cancel, self.factory_node(&subtask));
                    if let Some(actor) = &delta.actor {
                        send_event(events, Node::ActorFactory, factory_message(actor));
                    }
                    state.apply(delta);
                    state.phase = Phase::Acting;
                }
                Phase::Acting => {
                    let Some(subtask) = state.current_subtask.clone() else {
                        return Ok(self.finish(state, DoneReason::Completed).await);
                    };
                    state.apply(SessionDelta {
                        appended_messages: vec![Message::user(subtask.clone())],
                        ..SessionDelta::default()
                    });
                    let outcome = or_cancel!(
                        cancel,
                        self.actor.execute(
                            &state.objective,
                            &subtask,
                            state.actor_persona.as_deref(),
                            &state.actor_tool_names,
                            &state.message_history,
                        )
                    );
                    state = match self.after_acting(state, outcome, events).await {
                        Ok(state) => state,
                        Err(outcome) => return Ok(outcome),
                    };
                }
                Phase::Counting => {
                    state.iteration_count += 1;
                    state.phase = Phase::Planning;
                    tracing::info!(
                        thread_id = %state.session_id,
                        iteration = state.iteration_count,
                        "worker cycle counted"
                    );
                    send_event(
                        events,
                        Node::Counter,
                        format!("Completed iteration {} of {}", state.iteration_count, self.max_iterations),
                    );
                    self.persist(&state).await;
                }
                Phase::Suspended => {
                    return Err(AgentError::InvalidState(format!(
                        "session {} is suspended; resume it with decisions",
                        state.session_id
                    )));
                }
                Phase::Done => return Ok(self.finish(state, DoneReason::Completed).await),
            }
        }
    }

    async fn planning_node(&self, state: &SessionState) -> SessionDelta {
        match self
            .planner
            .plan(&state.objective, &state.progress_outline, state.subtask_result.as_ref())
            .await
        {
            Ok(plan) => SessionDelta {
                progress_outline: Some(plan.progress_outline),
                current_subtask: Some(plan.current_subtask),
                // 结果已交给 Planner，下个周期不会再看到它
                subtask_result: Some(None),
                ..SessionDelta::default()
            },
            Err(e) => {
                tracing::warn!(thread_id = %state.session_id, error = %e, "planner failed");
                SessionDelta::default()
            }
        }
    }

    async fn factory_node(&self, subtask: &str) -> SessionDelta {
        match self.factory.build_actor(subtask).await {
            Ok(spec) => {
                let persona = spec.actor_persona.trim();
                SessionDelta {
                    actor: Some(ActorAssignment {
                        persona: (!persona.is_empty()).then(|| persona.to_string()),
                        tool_names: spec.actor_tools,
                    }),
                    ..SessionDelta::default()
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "actor factory failed, worker will use defaults");
                SessionDelta::default()
            }
        }
    }

    /// 处理 Worker 结局：完成则记录结果并进入 COUNTING；挂起则持久化并返回 Err(RunOutcome::Suspended)
    async fn after_acting(
        &self,
        mut state: SessionState,
        outcome: ActorOutcome,
        events: Option<&UnboundedSender<NodeMessage>>,
    ) -> Result<SessionState, RunOutcome> {
        match outcome {
            ActorOutcome::Finished(result) => {
                tracing::info!(
                    thread_id = %state.session_id,
                    status = ?result.status,
                    "worker finished"
                );
                send_event(events, Node::DynamicActor, result.summary.clone());
                state.apply(SessionDelta {
                    // persona / 工具只供本周期 Worker 使用
                    actor: Some(ActorAssignment::default()),
                    appended_messages: vec![Message::assistant(result.summary.clone())],
                    subtask_result: Some(Some(result)),
                    ..SessionDelta::default()
                });
                state.phase = Phase::Counting;
                Ok(state)
            }
            ActorOutcome::Suspended { checkpoint, requests } => {
                let pending = PendingInterrupt::new(state.session_id.clone(), requests);
                state.suspended_actor = Some(checkpoint);
                state.phase = Phase::Suspended;
                state.updated_at = chrono::Utc::now();
                self.persist(&state).await;
                self.interrupts.set(&state.session_id, pending.clone()).await;
                tracing::info!(
                    thread_id = %state.session_id,
                    iteration = state.iteration_count,
                    actions = pending.action_requests.len(),
                    "run suspended for approval"
                );
                Err(RunOutcome::Suspended(pending))
            }
        }
    }

    async fn finish(&self, mut state: SessionState, reason: DoneReason) -> RunOutcome {
        state.phase = Phase::Done;
        state.suspended_actor = None;
        self.persist(&state).await;
        tracing::info!(
            thread_id = %state.session_id,
            iterations = state.iteration_count,
            reason = ?reason,
            "run finished"
        );
        RunOutcome::Done { reason, state }
    }

    async fn persist(&self, state: &SessionState) {
        self.sessions.set(&state.session_id, state.clone()).await;
    }
}

fn planner_message(state: &SessionState) -> String {
    match &state.current_subtask {
        Some(subtask) => format!("{}\n\nNext subtask: {}", state.progress_outline.trim(), subtask),
        None => format!("{}\n\nAll subtasks complete.", state.progress_outline.trim()),
    }
}

fn factory_message(actor: &ActorAssignment) -> String {
    let persona = actor.persona.as_deref().unwrap_or("(default persona)");
    if actor.tool_names.is_empty() {
        format!("Worker persona: {persona}")
    } else {
        format!("Worker persona: {persona}\nTools: {}", actor.tool_names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::ActorSettings;
    use crate::llm::MockLlmClient;
    use crate::prompts::PromptTemplates;
    use crate::store::{ActionRequest, InMemoryStore};
    use crate::tools::{ToolExecutor, ToolRegistry};

    fn graph() -> (
        ResearchGraph,
        Arc<InMemoryStore<SessionState>>,
        Arc<InMemoryStore<PendingInterrupt>>,
    ) {
        let llm: Arc<MockLlmClient> = Arc::new(MockLlmClient);
        let prompts = Arc::new(PromptTemplates::builtin());
        let executor = Arc::new(ToolExecutor::new(ToolRegistry::new(), 5));
        let sessions = Arc::new(InMemoryStore::<SessionState>::new());
        let interrupts = Arc::new(InMemoryStore::<PendingInterrupt>::new());
        let graph = ResearchGraph::new(
            Planner::new(llm.clone(), prompts.clone(), "en-US"),
            ActorFactory::new(llm.clone(), prompts.clone(), "en-US", Vec::new()),
            DynamicActor::new(llm, prompts, executor, "en-US", ActorSettings::default()),
            sessions.clone(),
            interrupts.clone(),
        );
        (graph, sessions, interrupts)
    }

    fn pending(thread_id: &str) -> PendingInterrupt {
        PendingInterrupt::new(
            thread_id,
            vec![ActionRequest {
                request_id: "req-1".to_string(),
                tool_name: "web_search".to_string(),
                args: serde_json::json!({"query": "rust"}),
                description: "Tool execution requires approval".to_string(),
            }],
        )
    }

    #[tokio::test]
    async fn test_resume_without_session_keeps_interrupt() {
        let (graph, _, interrupts) = graph();
        let record = pending("thread-a");
        interrupts.set("thread-a", record.clone()).await;

        let err = graph
            .resume("thread-a", vec![Decision::Approve], None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SessionNotFound(ref t) if t == "thread-a"));
        assert_eq!(interrupts.get("thread-a").await, Some(record));
    }

    #[tokio::test]
    async fn test_resume_of_unsuspended_session_keeps_interrupt() {
        let (graph, sessions, interrupts) = graph();
        let record = pending("thread-b");
        let mut state = SessionState::new("thread-b", "objective");
        state.phase = Phase::Done;
        sessions.set("thread-b", state.clone()).await;
        interrupts.set("thread-b", record.clone()).await;

        let err = graph
            .resume("thread-b", vec![], None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(_)));
        assert_eq!(interrupts.get("thread-b").await, Some(record.clone()));

        // 挂起阶段但缺少 Worker 现场
        state.phase = Phase::Suspended;
        sessions.set("thread-b", state).await;
        let err = graph
            .resume("thread-b", vec![], None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(_)));
        assert_eq!(interrupts.get("thread-b").await, Some(record));
        assert_eq!(sessions.get("thread-b").await.map(|s| s.phase), Some(Phase::Suspended));
    }
}
