//! 集成测试共用：按调用方路由的脚本化 LLM 与计数搜索工具

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use scout::agent::{create_runtime_with_parts, Runtime};
use scout::config::AppConfig;
use scout::llm::{LlmClient, LlmError};
use scout::memory::{Message, Role};
use scout::tools::{Tool, ToolRegistry, UpdateProgressTool};

/// Planner 何时宣告完成
#[derive(Debug, Clone, Copy)]
pub enum PlannerMode {
    /// 第 n 次调用（从 1 开始）返回空子任务
    FinishOnCall(usize),
    /// 只要带了上一子任务结果就完成
    FinishAfterResult,
    /// 从不完成
    Never,
}

/// 按消息形状区分 Planner / Factory / Worker 的 LLM
pub struct ResearchLlm {
    pub mode: PlannerMode,
    /// 第 n 次 Planner 调用返回无法解析的文本
    pub planner_garbage_on: Option<usize>,
    pub factory_fails: bool,
    /// Worker 在这些周期（首轮调用计数，从 1 开始）先请求 web_search
    pub search_on_cycle: fn(usize) -> bool,
    pub planner_calls: AtomicUsize,
    pub factory_calls: AtomicUsize,
    pub worker_cycles: AtomicUsize,
    pub worker_requests: Mutex<Vec<Vec<Message>>>,
}

impl ResearchLlm {
    pub fn new(mode: PlannerMode) -> Self {
        Self {
            mode,
            planner_garbage_on: None,
            factory_fails: false,
            search_on_cycle: |_| false,
            planner_calls: AtomicUsize::new(0),
            factory_calls: AtomicUsize::new(0),
            worker_cycles: AtomicUsize::new(0),
            worker_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn planner_calls(&self) -> usize {
        self.planner_calls.load(Ordering::SeqCst)
    }

    pub fn factory_calls(&self) -> usize {
        self.factory_calls.load(Ordering::SeqCst)
    }

    pub fn worker_cycles(&self) -> usize {
        self.worker_cycles.load(Ordering::SeqCst)
    }

    pub fn worker_requests(&self) -> Vec<Vec<Message>> {
        self.worker_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ResearchLlm {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let users: Vec<&Message> = messages.iter().filter(|m| m.role == Role::User).collect();

        if users.iter().any(|m| m.content.starts_with("Objective:")) {
            let n = self.planner_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.planner_garbage_on == Some(n) {
                return Ok("I am not sure what to do next.".to_string());
            }
            let has_result = users.iter().any(|m| m.content.starts_with("Last Subtask Result:"));
            let finish = match self.mode {
                PlannerMode::FinishOnCall(k) => k == n,
                PlannerMode::FinishAfterResult => has_result,
                PlannerMode::Never => false,
            };
            let reply = if finish {
                json!({"progress_outline": "- [x] all steps", "current_subtask": null})
            } else {
                json!({"progress_outline": format!("- [ ] step {n}"), "current_subtask": format!("step {n}")})
            };
            return Ok(reply.to_string());
        }

        if users.last().map(|m| m.content.starts_with("Current Subtask:")).unwrap_or(false) {
            self.factory_calls.fetch_add(1, Ordering::SeqCst);
            if self.factory_fails {
                return Ok("persona: ???".to_string());
            }
            return Ok(json!({
                "actor_persona": "You are a careful tester.",
                "actor_tools": ["web_search"],
            })
            .to_string());
        }

        self.worker_requests.lock().unwrap().push(messages.to_vec());
        let last = messages.last().cloned().unwrap_or_else(|| Message::user(""));
        if last.role == Role::Tool {
            return Ok(format!("Findings after {}: {}", last.name.unwrap_or_default(), last.content));
        }
        let cycle = self.worker_cycles.fetch_add(1, Ordering::SeqCst) + 1;
        if (self.search_on_cycle)(cycle) {
            return Ok(json!({"tool": "web_search", "args": {"query": last.content}}).to_string());
        }
        Ok(format!("done {}", last.content))
    }
}

/// 计数的假搜索工具
pub struct CountingSearch(pub Arc<AtomicUsize>);

#[async_trait]
impl Tool for CountingSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(format!("1. result for {}", args["query"].as_str().unwrap_or("")))
    }
}

/// 慢搜索工具：开始时通知，睡眠结束后才计数
pub struct SlowSearch {
    pub started: Arc<Notify>,
    pub completed: Arc<AtomicUsize>,
    pub delay: Duration,
}

#[async_trait]
impl Tool for SlowSearch {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web slowly"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("1. result for {}", args["query"].as_str().unwrap_or("")))
    }
}

pub fn config(max_iterations: usize, gated: &[&str]) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.graph.max_iterations = max_iterations;
    cfg.interrupts.approval_required = gated.iter().map(|s| s.to_string()).collect();
    cfg
}

/// 构建运行时，返回 (runtime, 搜索计数)
pub fn runtime(cfg: &AppConfig, llm: Arc<ResearchLlm>) -> (Runtime, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(CountingSearch(hits.clone()));
    registry.register(UpdateProgressTool);
    (create_runtime_with_parts(cfg, llm, registry), hits)
}

/// 以慢搜索工具构建运行时，返回 (runtime, 开始通知, 完成计数)
pub fn slow_runtime(
    cfg: &AppConfig,
    llm: Arc<ResearchLlm>,
    delay: Duration,
) -> (Runtime, Arc<Notify>, Arc<AtomicUsize>) {
    let started = Arc::new(Notify::new());
    let completed = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(SlowSearch {
        started: started.clone(),
        completed: completed.clone(),
        delay,
    });
    registry.register(UpdateProgressTool);
    (create_runtime_with_parts(cfg, llm, registry), started, completed)
}
