//! 控制循环集成测试：终止、计数、上限、Planner/Factory 失败、挂起与恢复

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{config, runtime, slow_runtime, PlannerMode, ResearchLlm};
use scout::agents::FALLBACK_PERSONA;
use scout::core::AgentError;
use scout::graph::{DoneReason, Phase, RunOutcome};
use scout::memory::Role;
use scout::store::Decision;

#[tokio::test]
async fn test_completes_when_planner_clears_subtask() {
    let llm = Arc::new(ResearchLlm::new(PlannerMode::FinishOnCall(3)));
    let (rt, _) = runtime(&config(10, &[]), llm.clone());
    let cancel = CancellationToken::new();

    let outcome = rt.graph.run("thread-a", "research X", None, &cancel).await.unwrap();
    let RunOutcome::Done { reason, state } = outcome else { panic!("expected done") };
    assert_eq!(reason, DoneReason::Completed);
    assert_eq!(state.iteration_count, 2);
    assert_eq!(llm.factory_calls(), 2);
    assert_eq!(llm.worker_cycles(), 2);
    assert_eq!(state.phase, Phase::Done);
    assert!(state.current_subtask.is_none());

    let roles: Vec<Role> = state.message_history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(state.message_history[0].content, "step 1");
    assert_eq!(state.message_history[1].content, "done step 1");

    let stored = rt.graph.session("thread-a").await.unwrap();
    assert_eq!(stored.iteration_count, 2);
    assert_eq!(stored.phase, Phase::Done);
}

#[tokio::test]
async fn test_iteration_cap_stops_after_ten_worker_cycles() {
    let llm = Arc::new(ResearchLlm::new(PlannerMode::Never));
    let (rt, _) = runtime(&config(10, &[]), llm.clone());

    let outcome = rt
        .graph
        .run("thread-cap", "never ending", None, &CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Done { reason, state } = outcome else { panic!("expected done") };
    assert_eq!(reason, DoneReason::IterationCap);
    assert_eq!(state.iteration_count, 10);
    assert_eq!(llm.worker_cycles(), 10);
    assert_eq!(llm.factory_calls(), 10);
    // 第 10 个周期之后 Planner 仍看到最后一个结果，但不再进入 Factory
    assert_eq!(llm.planner_calls(), 11);
}

#[tokio::test]
async fn test_empty_subtask_on_first_plan_skips_workers() {
    let llm = Arc::new(ResearchLlm::new(PlannerMode::FinishOnCall(1)));
    let (rt, _) = runtime(&config(10, &[]), llm.clone());

    let outcome = rt.graph.run("thread-e", "trivial", None, &CancellationToken::new()).await.unwrap();
    let RunOutcome::Done { reason, state } = outcome else { panic!("expected done") };
    assert_eq!(reason, DoneReason::Completed);
    assert_eq!(state.iteration_count, 0);
    assert_eq!(llm.factory_calls(), 0);
    assert_eq!(llm.worker_cycles(), 0);
    assert!(state.message_history.is_empty());
}

#[tokio::test]
async fn test_planner_failure_terminates_without_state_change() {
    let mut llm = ResearchLlm::new(PlannerMode::Never);
    llm.planner_garbage_on = Some(2);
    let llm = Arc::new(llm);
    let (rt, _) = runtime(&config(10, &[]), llm.clone());

    let outcome = rt.graph.run("thread-p", "research", None, &CancellationToken::new()).await.unwrap();
    let RunOutcome::Done { reason, state } = outcome else { panic!("expected done") };
    assert_eq!(reason, DoneReason::PlannerFailed);
    assert_eq!(state.iteration_count, 1);
    assert_eq!(state.progress_outline, "- [ ] step 1");
    assert_eq!(state.current_subtask.as_deref(), Some("step 1"));
    assert_eq!(llm.planner_calls(), 2);
}

#[tokio::test]
async fn test_factory_failure_falls_back_to_default_persona() {
    let mut llm = ResearchLlm::new(PlannerMode::FinishOnCall(2));
    llm.factory_fails = true;
    let llm = Arc::new(llm);
    let (rt, _) = runtime(&config(10, &[]), llm.clone());

    let outcome = rt.graph.run("thread-f", "research", None, &CancellationToken::new()).await.unwrap();
    let RunOutcome::Done { state, .. } = outcome else { panic!("expected done") };
    assert_eq!(state.iteration_count, 1);
    let requests = llm.worker_requests();
    assert!(requests[0][0].content.contains(FALLBACK_PERSONA));
    assert!(state.actor_persona.is_none());
}

#[tokio::test]
async fn test_counting_matches_completed_worker_calls() {
    // 每个周期 Worker 都先调用工具再作答，计数只随完成的 Worker 调用增加
    let mut llm = ResearchLlm::new(PlannerMode::FinishOnCall(4));
    llm.search_on_cycle = |_| true;
    let llm = Arc::new(llm);
    let (rt, hits) = runtime(&config(10, &[]), llm.clone());

    let outcome = rt.graph.run("thread-n", "research", None, &CancellationToken::new()).await.unwrap();
    let RunOutcome::Done { state, .. } = outcome else { panic!("expected done") };
    assert_eq!(state.iteration_count, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert!(state.message_history[1].content.starts_with("Findings after web_search"));
}

#[tokio::test]
async fn test_suspend_on_second_cycle_then_resume() {
    let mut llm = ResearchLlm::new(PlannerMode::FinishOnCall(3));
    llm.search_on_cycle = |cycle| cycle == 2;
    let llm = Arc::new(llm);
    let (rt, hits) = runtime(&config(10, &["web_search"]), llm.clone());
    let cancel = CancellationToken::new();

    let outcome = rt.graph.run("thread-s", "research", None, &cancel).await.unwrap();
    let RunOutcome::Suspended(pending) = outcome else { panic!("expected suspension") };
    assert_eq!(pending.thread_id, "thread-s");
    assert_eq!(pending.action_requests.len(), 1);
    assert_eq!(pending.action_requests[0].tool_name, "web_search");
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let stored = rt.graph.session("thread-s").await.unwrap();
    assert_eq!(stored.phase, Phase::Suspended);
    assert_eq!(stored.iteration_count, 1);
    assert!(stored.suspended_actor.is_some());
    assert!(rt.graph.pending_interrupt("thread-s").await.is_some());

    let outcome = rt
        .graph
        .resume("thread-s", vec![Decision::Approve], None, &cancel)
        .await
        .unwrap();
    let RunOutcome::Done { reason, state } = outcome else { panic!("expected done") };
    assert_eq!(reason, DoneReason::Completed);
    assert_eq!(state.iteration_count, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(rt.graph.pending_interrupt("thread-s").await.is_none());
    // 挂起前追加的子任务消息不会在恢复时重复
    let subtasks = state
        .message_history
        .iter()
        .filter(|m| m.role == Role::User && m.content == "step 2")
        .count();
    assert_eq!(subtasks, 1);
    assert!(state.suspended_actor.is_none());
}

#[tokio::test]
async fn test_missing_decisions_default_to_reject() {
    let mut llm = ResearchLlm::new(PlannerMode::FinishOnCall(2));
    llm.search_on_cycle = |_| true;
    let llm = Arc::new(llm);
    let (rt, hits) = runtime(&config(10, &["web_search"]), llm.clone());
    let cancel = CancellationToken::new();

    let outcome = rt.graph.run("thread-r", "research", None, &cancel).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Suspended(_)));
    let outcome = rt.graph.resume("thread-r", vec![], None, &cancel).await.unwrap();
    let RunOutcome::Done { state, .. } = outcome else { panic!("expected done") };
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(
        state.message_history[1].content,
        "Findings after web_search: Tool call rejected by reviewer: no reason given"
    );
}

#[tokio::test]
async fn test_resume_only_touches_its_own_thread() {
    let mut llm = ResearchLlm::new(PlannerMode::Never);
    llm.search_on_cycle = |_| true;
    let llm = Arc::new(llm);
    let (rt, _) = runtime(&config(10, &["web_search"]), llm.clone());
    let cancel = CancellationToken::new();

    assert!(matches!(rt.graph.run("thread-1", "a", None, &cancel).await.unwrap(), RunOutcome::Suspended(_)));
    assert!(matches!(rt.graph.run("thread-2", "b", None, &cancel).await.unwrap(), RunOutcome::Suspended(_)));
    let first_a = rt.graph.pending_interrupt("thread-1").await.unwrap();
    let before_b = rt.graph.pending_interrupt("thread-2").await.unwrap();

    // 恢复后下一周期再次挂起：新记录覆盖旧记录
    let outcome = rt.graph.resume("thread-1", vec![Decision::Approve], None, &cancel).await.unwrap();
    let RunOutcome::Suspended(second_a) = outcome else { panic!("expected second suspension") };
    assert_ne!(second_a.action_requests[0].request_id, first_a.action_requests[0].request_id);
    assert_eq!(rt.graph.pending_interrupt("thread-1").await.unwrap(), second_a);
    assert_eq!(rt.graph.pending_interrupt("thread-2").await.unwrap(), before_b);
    assert_eq!(rt.graph.session("thread-1").await.unwrap().iteration_count, 1);
    assert_eq!(rt.graph.session("thread-2").await.unwrap().iteration_count, 0);
}

#[tokio::test]
async fn test_resume_without_pending_interrupt_is_error() {
    let llm = Arc::new(ResearchLlm::new(PlannerMode::Never));
    let (rt, _) = runtime(&config(10, &[]), llm);
    let err = rt
        .graph
        .resume("thread-missing", vec![], None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::NoPendingInterrupt(ref t) if t == "thread-missing"));
}

#[tokio::test]
async fn test_follow_up_run_keeps_history_and_resets_plan() {
    let llm = Arc::new(ResearchLlm::new(PlannerMode::FinishAfterResult));
    let (rt, _) = runtime(&config(10, &[]), llm.clone());
    let cancel = CancellationToken::new();

    rt.graph.run("thread-h", "first", None, &cancel).await.unwrap();
    let outcome = rt.graph.run("thread-h", "second", None, &cancel).await.unwrap();
    let RunOutcome::Done { state, .. } = outcome else { panic!("expected done") };
    assert_eq!(state.objective, "second");
    assert_eq!(state.iteration_count, 1);
    assert_eq!(state.message_history.len(), 4);

    let last_worker_call = llm.worker_requests().pop().unwrap();
    assert!(last_worker_call.iter().any(|m| m.content == "done step 1"));
}

#[tokio::test]
async fn test_cancelled_before_start_persists_nothing() {
    let llm = Arc::new(ResearchLlm::new(PlannerMode::Never));
    let (rt, _) = runtime(&config(10, &[]), llm.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = rt.graph.run("thread-c", "x", None, &cancel).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert!(rt.graph.session("thread-c").await.is_none());
    assert_eq!(llm.planner_calls(), 0);
}

#[tokio::test]
async fn test_worker_failure_result_reaches_planner() {
    let mut llm = ResearchLlm::new(PlannerMode::FinishOnCall(2));
    llm.search_on_cycle = |_| true;
    let llm = Arc::new(llm);
    let mut cfg = config(10, &[]);
    cfg.graph.actor_max_steps = 1;
    let (rt, _) = runtime(&cfg, llm.clone());

    let outcome = rt.graph.run("thread-w", "research", None, &CancellationToken::new()).await.unwrap();
    let RunOutcome::Done { state, .. } = outcome else { panic!("expected done") };
    assert_eq!(state.iteration_count, 1);
    assert!(state.message_history[1].content.starts_with("Execution failed:"));
    // 结果交给 Planner 后即被消费
    assert!(state.subtask_result.is_none());
}

#[tokio::test]
async fn test_cancelled_resume_restores_interrupt_for_retry() {
    let mut llm = ResearchLlm::new(PlannerMode::FinishOnCall(2));
    llm.search_on_cycle = |_| true;
    let llm = Arc::new(llm);
    let (rt, started, completed) =
        slow_runtime(&config(10, &["web_search"]), llm.clone(), Duration::from_millis(200));

    let outcome = rt.graph.run("thread-k", "research", None, &CancellationToken::new()).await.unwrap();
    let RunOutcome::Suspended(pending) = outcome else { panic!("expected suspension") };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        started.notified().await;
        trigger.cancel();
    });
    let outcome = rt
        .graph
        .resume("thread-k", vec![Decision::Approve], None, &cancel)
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Cancelled));
    assert_eq!(completed.load(Ordering::SeqCst), 0);
    assert_eq!(rt.graph.pending_interrupt("thread-k").await, Some(pending));
    let stored = rt.graph.session("thread-k").await.unwrap();
    assert_eq!(stored.phase, Phase::Suspended);
    assert_eq!(stored.iteration_count, 0);
    assert!(stored.suspended_actor.is_some());

    let outcome = rt
        .graph
        .resume("thread-k", vec![Decision::Approve], None, &CancellationToken::new())
        .await
        .unwrap();
    let RunOutcome::Done { reason, state } = outcome else { panic!("expected done") };
    assert_eq!(reason, DoneReason::Completed);
    assert_eq!(state.iteration_count, 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
    assert!(state.message_history[1].content.starts_with("Findings after web_search: 1. result for"));
    assert!(rt.graph.pending_interrupt("thread-k").await.is_none());
}

#[tokio::test]
async fn test_session_outlives_pending_interrupt() {
    let mut llm = ResearchLlm::new(PlannerMode::FinishOnCall(2));
    llm.search_on_cycle = |_| true;
    let llm = Arc::new(llm);
    let mut cfg = config(10, &["web_search"]);
    cfg.app.session_ttl_secs = Some(1);
    let (rt, hits) = runtime(&cfg, llm);
    let cancel = CancellationToken::new();

    assert!(matches!(
        rt.graph.run("thread-t", "research", None, &cancel).await.unwrap(),
        RunOutcome::Suspended(_)
    ));
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(rt.graph.session("thread-t").await.is_some());

    let outcome = rt.graph.resume("thread-t", vec![Decision::Approve], None, &cancel).await.unwrap();
    let RunOutcome::Done { reason, .. } = outcome else { panic!("expected done") };
    assert_eq!(reason, DoneReason::Completed);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
