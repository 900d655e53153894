//! Mock / Scripted LLM 客户端（用于离线运行与测试，无需 API）
//!
//! - MockLlmClient：按最后一条 User 消息的前缀判断调用方（Planner / Actor Factory / Worker），
//!   返回固定格式的回复，便于本地跑通一整轮规划-执行流程。
//! - ScriptedLlmClient：按顺序返回预置回复，并记录每次收到的消息，供测试断言。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：一轮计划、一轮执行后宣告完成
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        if let Some(objective) = last_user.strip_prefix("Objective:") {
            let objective = objective.trim();
            return Ok(serde_json::json!({
                "progress_outline": format!("- [ ] Research: {objective}"),
                "current_subtask": format!("Research: {objective}"),
            })
            .to_string());
        }
        if last_user.starts_with("Last Subtask Result:") {
            return Ok(serde_json::json!({
                "progress_outline": "- [x] Research completed",
                "current_subtask": null,
            })
            .to_string());
        }
        if last_user.starts_with("Current Subtask:") {
            return Ok(serde_json::json!({
                "actor_persona": "You are a meticulous research analyst.",
                "actor_tools": ["update_progress"],
            })
            .to_string());
        }
        Ok(format!("Echo from Mock: {last_user}"))
    }
}

/// 脚本化客户端：依次弹出预置回复；耗尽后若设置了 fallback 则一直返回它，否则返回 Exhausted
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    received: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    /// 每次都返回同一条回复
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            fallback: Some(reply.into()),
            ..Self::default()
        }
    }

    /// 追加一条失败回复
    pub fn then_fail(self, err: LlmError) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
        self
    }

    /// 追加一条成功回复
    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply.into()));
        }
        self
    }

    /// 已被调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次调用收到的完整消息序列
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut r) = self.received.lock() {
            r.push(messages.to_vec());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(reply) => reply,
            None => self.fallback.clone().ok_or(LlmError::Exhausted),
        }
    }
}
