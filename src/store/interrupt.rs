//! 挂起记录与审批决策
//!
//! 挂起记录在控制循环挂起时创建，按 thread id 保存；同一会话的后一次挂起覆盖前一次。
//! 恢复请求到达时被取出删除（恰好一次），期间从不原地修改。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单个待审批动作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub request_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
    pub description: String,
}

/// 挂起记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub thread_id: String,
    /// 有序的待审批动作
    pub action_requests: Vec<ActionRequest>,
    pub created_at: DateTime<Utc>,
}

impl PendingInterrupt {
    pub fn new(thread_id: impl Into<String>, action_requests: Vec<ActionRequest>) -> Self {
        Self {
            thread_id: thread_id.into(),
            action_requests,
            created_at: Utc::now(),
        }
    }
}

/// 人工对单个动作的决策；决策集按位置与 action_requests 一一对应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    /// 按原参数执行
    Approve,
    /// 以修改后的参数执行
    Edit { args: serde_json::Value },
    /// 不执行，可附理由（回灌给 Worker）
    Reject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

/// 将客户端给出的决策补齐到 `count` 个：缺失的位置用 `default`，多余的丢弃
pub fn align_decisions(mut decisions: Vec<Decision>, count: usize, default: &Decision) -> Vec<Decision> {
    decisions.truncate(count);
    while decisions.len() < count {
        decisions.push(default.clone());
    }
    decisions
}
