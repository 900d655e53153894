//! Scout - 多智能体研究助手
//!
//! 模块划分：
//! - **agent**: 运行时装配（LLM、工具、角色、存储、控制循环）
//! - **agents**: Planner / Actor Factory / Dynamic Actor 三个角色
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **graph**: 会话状态与控制循环（规划 → 组装 → 执行 → 计数）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock / Scripted）
//! - **memory**: 带角色标签的对话记录
//! - **prompts**: 按 locale 渲染的提示词模板
//! - **server**: 流式对话服务与 HTTP 接口（SSE）
//! - **store**: 键值存储抽象、挂起记录与审批决策
//! - **tools**: 工具注册表、执行器与研究工具

pub mod agent;
pub mod agents;
pub mod config;
pub mod core;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompts;
pub mod server;
pub mod store;
pub mod tools;
