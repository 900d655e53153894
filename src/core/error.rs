//! Agent 错误类型
//!
//! 组件级失败（Planner / Actor Factory / Worker）在控制循环内被捕获并转为空 delta 或 failed 结果，
//! 只有存储、会话不一致与取消会穿透到流式接口层，由其转为 `error` 事件。

use thiserror::Error;

use crate::llm::LlmError;

/// 运行过程中可能出现的错误（解析、工具、模板、会话存储、取消等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No pending interrupt for thread: {0}")]
    NoPendingInterrupt(String),

    /// 会话阶段与请求不匹配（如恢复一个未挂起的会话）
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}
