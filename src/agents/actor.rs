//! Dynamic Actor（Worker）：以给定 persona 与工具子集执行单个子任务
//!
//! 内部是有界的工具循环：每轮调用一次模型，回复为 `{"tool","args"}` 或 `{"tool_calls":[...]}` 时执行工具并把
//! 观察结果追加为 tool 消息，回复为纯文本时视为最终答案。步数（模型轮次）与墙钟时间都有上限，
//! 超出任一上限或模型调用失败都返回 failed 结果，不向外抛错。
//!
//! 若某轮请求的工具在审批名单内，该轮所有调用都不执行，Worker 以检查点挂起；
//! 恢复时按决策（approve / edit / reject）执行整轮调用后继续循环。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::output::extract_json;
use crate::core::AgentError;
use crate::graph::SubtaskResult;
use crate::llm::LlmClient;
use crate::memory::{recent_window, Message, Role};
use crate::prompts::PromptRenderer;
use crate::store::{ActionRequest, Decision};
use crate::tools::{tool_call_schema_json, Tool, ToolExecutor, ERROR_MARKER};

/// Actor Factory 未给出 persona 时使用
pub const FALLBACK_PERSONA: &str = "You are a diligent research assistant.";

/// 单个工具调用；需要审批的调用带 request_id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCall {
    pub tool: String,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Worker 挂起时的完整现场，随会话状态持久化
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorCheckpoint {
    pub persona: String,
    /// 解析后的可用工具名（含 update_progress）
    pub tool_names: Vec<String>,
    /// 本子任务的完整消息序列（含 system）
    pub messages: Vec<Message>,
    /// 已消耗的模型轮次
    pub step: usize,
    /// 已消耗的墙钟时间
    pub elapsed_ms: u64,
    /// 挂起那一轮的全部调用（按模型给出的顺序）
    pub pending_calls: Vec<PendingCall>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActorOutcome {
    Finished(SubtaskResult),
    Suspended {
        checkpoint: ActorCheckpoint,
        requests: Vec<ActionRequest>,
    },
}

/// Worker 预算与审批策略
#[derive(Debug, Clone)]
pub struct ActorSettings {
    pub max_steps: usize,
    pub timeout: Duration,
    pub history_window: usize,
    pub approval_required: HashSet<String>,
    pub description_prefix: String,
}

impl Default for ActorSettings {
    fn default() -> Self {
        Self {
            max_steps: 8,
            timeout: Duration::from_secs(300),
            history_window: 20,
            approval_required: HashSet::new(),
            description_prefix: "Tool execution requires approval".to_string(),
        }
    }
}

/// 从模型回复中解析工具调用；不是工具调用时返回 None（视为最终答案）
pub fn parse_tool_calls(reply: &str) -> Option<Vec<(String, Value)>> {
    let json_str = extract_json(reply)?;
    let v: Value = serde_json::from_str(json_str).ok()?;

    fn one(v: &Value) -> Option<(String, Value)> {
        let tool = v.get("tool")?.as_str()?.trim();
        if tool.is_empty() {
            return None;
        }
        let args = v.get("args").cloned().unwrap_or_else(|| json!({}));
        Some((tool.to_string(), args))
    }

    if let Some(items) = v.get("tool_calls").and_then(Value::as_array) {
        let calls: Vec<_> = items.iter().filter_map(one).collect();
        return (!calls.is_empty()).then_some(calls);
    }
    one(&v).map(|call| vec![call])
}

pub struct DynamicActor {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptRenderer>,
    executor: Arc<ToolExecutor>,
    locale: String,
    settings: ActorSettings,
}

impl DynamicActor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<dyn PromptRenderer>,
        executor: Arc<ToolExecutor>,
        locale: impl Into<String>,
        settings: ActorSettings,
    ) -> Self {
        Self {
            llm,
            prompts,
            executor,
            locale: locale.into(),
            settings,
        }
    }

    fn render_system(&self, persona: &str, objective: &str, tools: &[Arc<dyn Tool>]) -> Result<String, AgentError> {
        let tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.parameters_schema().to_string(),
                })
            })
            .collect();
        self.prompts.render(
            "dynamic_actor",
            &self.locale,
            &json!({
                "actor_persona": persona,
                "objective": objective,
                "tools": tools,
                "tool_call_schema": tool_call_schema_json(),
            }),
        )
    }

    /// 执行子任务。`history` 为会话历史（末尾应是本子任务的 user 消息，缺失时补上）
    pub async fn execute(
        &self,
        objective: &str,
        subtask: &str,
        persona: Option<&str>,
        tool_names: &[String],
        history: &[Message],
    ) -> ActorOutcome {
        let persona = persona
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(FALLBACK_PERSONA)
            .to_string();
        let tools = self.executor.registry().resolve(tool_names);
        let system = match self.render_system(&persona, objective, &tools) {
            Ok(s) => s,
            Err(e) => return ActorOutcome::Finished(SubtaskResult::failed(e)),
        };

        let mut context = recent_window(history, self.settings.history_window);
        let ends_with_subtask =
            matches!(context.last(), Some(m) if m.role == Role::User && m.content == subtask);
        if !ends_with_subtask {
            context.push(Message::user(subtask));
        }
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(Message::system(system));
        messages.extend(context);

        let checkpoint = ActorCheckpoint {
            persona,
            tool_names: tools.iter().map(|t| t.name().to_string()).collect(),
            messages,
            step: 0,
            elapsed_ms: 0,
            pending_calls: Vec::new(),
        };
        tracing::info!(tools = ?checkpoint.tool_names, "worker started");
        self.run_budgeted(checkpoint, None).await
    }

    /// 以决策恢复挂起的 Worker；决策按位置对应挂起轮次中需要审批的调用
    pub async fn resume(&self, checkpoint: ActorCheckpoint, decisions: Vec<Decision>) -> ActorOutcome {
        tracing::info!(
            step = checkpoint.step,
            pending = checkpoint.pending_calls.len(),
            "worker resumed"
        );
        self.run_budgeted(checkpoint, Some(decisions)).await
    }

    async fn run_budgeted(&self, checkpoint: ActorCheckpoint, decisions: Option<Vec<Decision>>) -> ActorOutcome {
        let spent = Duration::from_millis(checkpoint.elapsed_ms);
        let remaining = self.settings.timeout.saturating_sub(spent);
        let started = Instant::now();
        match tokio::time::timeout(remaining, self.drive(checkpoint, decisions, spent, started)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(timeout_secs = self.settings.timeout.as_secs(), "worker time budget exhausted");
                ActorOutcome::Finished(SubtaskResult::failed(format!(
                    "time budget of {}s exhausted",
                    self.settings.timeout.as_secs()
                )))
            }
        }
    }

    async fn drive(
        &self,
        mut cp: ActorCheckpoint,
        decisions: Option<Vec<Decision>>,
        spent: Duration,
        started: Instant,
    ) -> ActorOutcome {
        if let Some(decisions) = decisions {
            let calls = std::mem::take(&mut cp.pending_calls);
            self.run_calls(&mut cp, calls, decisions).await;
        }

        loop {
            if cp.step >= self.settings.max_steps {
                tracing::warn!(max_steps = self.settings.max_steps, "worker step budget exhausted");
                return ActorOutcome::Finished(SubtaskResult::failed(format!(
                    "step budget of {} model turns exhausted",
                    self.settings.max_steps
                )));
            }
            let reply = match self.llm.complete(&cp.messages).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(error = %e, "worker model call failed");
                    return ActorOutcome::Finished(SubtaskResult::failed(e));
                }
            };
            cp.step += 1;

            let Some(calls) = parse_tool_calls(&reply) else {
                tracing::debug!(step = cp.step, "worker produced final answer");
                return ActorOutcome::Finished(SubtaskResult::success(reply.trim()));
            };
            cp.messages.push(Message::assistant(reply.trim()));

            let calls: Vec<PendingCall> = calls
                .into_iter()
                .map(|(tool, args)| {
                    let gated = self.settings.approval_required.contains(&tool)
                        && cp.tool_names.iter().any(|n| n == &tool);
                    PendingCall {
                        request_id: gated.then(|| uuid::Uuid::new_v4().to_string()),
                        tool,
                        args,
                    }
                })
                .collect();

            if calls.iter().any(|c| c.request_id.is_some()) {
                let requests: Vec<ActionRequest> = calls
                    .iter()
                    .filter_map(|c| {
                        c.request_id.as_ref().map(|id| ActionRequest {
                            request_id: id.clone(),
                            tool_name: c.tool.clone(),
                            args: c.args.clone(),
                            description: format!(
                                "{}\n\nTool: {}\nArgs: {}",
                                self.settings.description_prefix, c.tool, c.args
                            ),
                        })
                    })
                    .collect();
                tracing::info!(requests = requests.len(), step = cp.step, "worker suspended for approval");
                cp.pending_calls = calls;
                cp.elapsed_ms = (spent + started.elapsed()).as_millis() as u64;
                return ActorOutcome::Suspended {
                    checkpoint: cp,
                    requests,
                };
            }

            self.run_calls(&mut cp, calls, Vec::new()).await;
        }
    }

    /// 按顺序执行一轮调用并追加观察结果；需审批的调用依次消费决策
    async fn run_calls(&self, cp: &mut ActorCheckpoint, calls: Vec<PendingCall>, decisions: Vec<Decision>) {
        let mut decisions = decisions.into_iter();
        for call in calls {
            let observation = if !cp.tool_names.iter().any(|n| n == &call.tool) {
                format!("{ERROR_MARKER} tool {} is not available", call.tool)
            } else if call.request_id.is_some() {
                match decisions.next().unwrap_or(Decision::Reject { message: None }) {
                    Decision::Approve => self.executor.execute_text(&call.tool, call.args).await,
                    Decision::Edit { args } => self.executor.execute_text(&call.tool, args).await,
                    Decision::Reject { message } => format!(
                        "Tool call rejected by reviewer: {}",
                        message.unwrap_or_else(|| "no reason given".to_string())
                    ),
                }
            } else {
                self.executor.execute_text(&call.tool, call.args).await
            };
            cp.messages.push(Message::tool(call.tool, observation));
        }
    }
}
