//! 会话状态与节点增量
//!
//! 每个节点拿到状态快照的只读引用，返回一个 `SessionDelta`，由控制循环合并；节点之间不共享可变状态。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::ActorCheckpoint;
use crate::memory::Message;

/// 子任务执行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failed,
}

/// Worker 的结构化结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskResult {
    pub status: ResultStatus,
    pub summary: String,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl SubtaskResult {
    pub fn success(summary: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Success,
            summary: summary.into(),
            artifacts: Vec::new(),
        }
    }

    /// 失败结果，summary 固定以 `Execution failed: ` 开头
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            status: ResultStatus::Failed,
            summary: format!("Execution failed: {reason}"),
            artifacts: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// 控制循环所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Factory,
    Acting,
    Counting,
    Suspended,
    Done,
}

/// Actor Factory 为当前周期给出的 Worker 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorAssignment {
    pub persona: Option<String>,
    pub tool_names: Vec<String>,
}

/// 会话状态：一次研究运行的持久化单元
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub objective: String,
    pub progress_outline: String,
    pub current_subtask: Option<String>,
    pub actor_persona: Option<String>,
    pub actor_tool_names: Vec<String>,
    pub subtask_result: Option<SubtaskResult>,
    pub iteration_count: usize,
    pub message_history: Vec<Message>,
    pub phase: Phase,
    /// 挂起中的 Worker 现场
    pub suspended_actor: Option<ActorCheckpoint>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            objective: objective.into(),
            progress_outline: String::new(),
            current_subtask: None,
            actor_persona: None,
            actor_tool_names: Vec::new(),
            subtask_result: None,
            iteration_count: 0,
            message_history: Vec::new(),
            phase: Phase::Planning,
            suspended_actor: None,
            updated_at: Utc::now(),
        }
    }

    /// 同一会话上的新一轮运行：重置计划相关字段，保留对话历史
    pub fn continue_with(&mut self, objective: impl Into<String>) {
        let history = std::mem::take(&mut self.message_history);
        *self = Self::new(self.session_id.clone(), objective);
        self.message_history = history;
    }

    pub fn apply(&mut self, delta: SessionDelta) {
        if let Some(outline) = delta.progress_outline {
            self.progress_outline = outline;
        }
        if let Some(subtask) = delta.current_subtask {
            self.current_subtask = subtask;
        }
        if let Some(actor) = delta.actor {
            self.actor_persona = actor.persona;
            self.actor_tool_names = actor.tool_names;
        }
        if let Some(result) = delta.subtask_result {
            self.subtask_result = result;
        }
        self.message_history.extend(delta.appended_messages);
        self.updated_at = Utc::now();
    }
}

/// 节点返回的局部更新；`None` 表示该字段不变
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDelta {
    pub progress_outline: Option<String>,
    pub current_subtask: Option<Option<String>>,
    pub actor: Option<ActorAssignment>,
    pub subtask_result: Option<Option<SubtaskResult>>,
    pub appended_messages: Vec<Message>,
}

impl SessionDelta {
    pub fn is_empty(&self) -> bool {
        self.progress_outline.is_none()
            && self.current_subtask.is_none()
            && self.actor.is_none()
            && self.subtask_result.is_none()
            && self.appended_messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_delta_changes_nothing_but_timestamp() {
        let mut s = SessionState::new("thread-1", "obj");
        s.progress_outline = "- [ ] a".into();
        s.current_subtask = Some("a".into());
        let before = s.clone();
        let delta = SessionDelta::default();
        assert!(delta.is_empty());
        s.apply(delta);
        assert_eq!(s.progress_outline, before.progress_outline);
        assert_eq!(s.current_subtask, before.current_subtask);
    }

    #[test]
    fn test_delta_can_clear_fields() {
        let mut s = SessionState::new("thread-1", "obj");
        s.current_subtask = Some("a".into());
        s.actor_persona = Some("old".into());
        s.actor_tool_names = vec!["web_search".into()];
        s.apply(SessionDelta {
            current_subtask: Some(None),
            actor: Some(ActorAssignment::default()),
            appended_messages: vec![Message::user("hi")],
            ..SessionDelta::default()
        });
        assert!(s.current_subtask.is_none());
        assert!(s.actor_persona.is_none());
        assert!(s.actor_tool_names.is_empty());
        assert_eq!(s.message_history.len(), 1);
    }

    #[test]
    fn test_continue_with_keeps_history_only() {
        let mut s = SessionState::new("thread-1", "first");
        s.iteration_count = 4;
        s.progress_outline = "- [x] done".into();
        s.message_history.push(Message::user("first"));
        s.phase = Phase::Done;
        s.continue_with("second");
        assert_eq!(s.objective, "second");
        assert_eq!(s.iteration_count, 0);
        assert!(s.progress_outline.is_empty());
        assert_eq!(s.phase, Phase::Planning);
        assert_eq!(s.message_history.len(), 1);
    }

    #[test]
    fn test_failed_result_prefix() {
        let r = SubtaskResult::failed("boom");
        assert_eq!(r.summary, "Execution failed: boom");
        assert!(!r.is_success());
        assert_eq!(serde_json::to_value(&r).unwrap()["status"], "failed");
    }
}
