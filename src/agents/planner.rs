//! Planner：维护进度大纲并给出下一个子任务
//!
//! 首次调用只带目标；之后带上当前大纲与上一子任务结果。输出 `{progress_outline, current_subtask}`，
//! `current_subtask` 为空或缺失表示计划完成。大纲只由 Planner 改写，不从对话历史重建。

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agents::output::parse_json;
use crate::core::AgentError;
use crate::graph::SubtaskResult;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::prompts::PromptRenderer;
use crate::tools::schema_json;

/// Planner 的输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
pub struct PlanDecision {
    /// 更新后的进度大纲（markdown 清单，标记已完成项与发现）
    pub progress_outline: String,
    /// 下一个交给 Worker 的子任务；全部完成时为 null
    pub current_subtask: Option<String>,
}

/// 宽松的线上格式：大纲可为字符串或列表，旧字段名 progress_list 也接受
#[derive(Deserialize)]
struct RawPlan {
    #[serde(default, alias = "progress_list")]
    progress_outline: Value,
    #[serde(default)]
    current_subtask: Value,
}

fn value_to_text(v: Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

impl From<RawPlan> for PlanDecision {
    fn from(raw: RawPlan) -> Self {
        let subtask = value_to_text(raw.current_subtask);
        let subtask = subtask.trim();
        Self {
            progress_outline: value_to_text(raw.progress_outline),
            current_subtask: (!subtask.is_empty() && subtask != "null").then(|| subtask.to_string()),
        }
    }
}

/// 解析 Planner 输出
pub fn parse_plan(output: &str) -> Result<PlanDecision, AgentError> {
    let raw: RawPlan = parse_json(output)?;
    Ok(raw.into())
}

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptRenderer>,
    locale: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<dyn PromptRenderer>, locale: impl Into<String>) -> Self {
        Self {
            llm,
            prompts,
            locale: locale.into(),
        }
    }

    /// 组装 Planner 的消息序列
    fn build_messages(
        &self,
        objective: &str,
        progress_outline: &str,
        last_result: Option<&SubtaskResult>,
    ) -> Result<Vec<Message>, AgentError> {
        let system = self.prompts.render(
            "planner",
            &self.locale,
            &json!({
                "progress_outline": progress_outline,
                "output_schema": schema_json::<PlanDecision>(),
            }),
        )?;
        let mut messages = vec![Message::system(system), Message::user(format!("Objective: {objective}"))];
        if !progress_outline.trim().is_empty() {
            messages.push(Message::user(format!(
                "Current Progress List/Outline:\n{progress_outline}"
            )));
            if let Some(result) = last_result {
                let result_json = serde_json::to_string_pretty(result)
                    .map_err(|e| AgentError::JsonParseError(e.to_string()))?;
                messages.push(Message::user(format!("Last Subtask Result:\n{result_json}")));
            }
        }
        Ok(messages)
    }

    /// 规划一步；模型或解析失败返回 Err，由控制循环决定如何处理
    pub async fn plan(
        &self,
        objective: &str,
        progress_outline: &str,
        last_result: Option<&SubtaskResult>,
    ) -> Result<PlanDecision, AgentError> {
        let messages = self.build_messages(objective, progress_outline, last_result)?;
        let output = self.llm.complete(&messages).await?;
        let plan = parse_plan(&output)?;
        tracing::debug!(
            subtask = ?plan.current_subtask,
            outline_len = plan.progress_outline.len(),
            "planner output parsed"
        );
        Ok(plan)
    }
}
