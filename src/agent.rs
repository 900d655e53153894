//! 运行时装配
//!
//! 按配置构建 LLM、工具注册表与执行器、三个角色、会话 / 挂起 / 决策存储、控制循环与对话服务；
//! HTTP 服务与命令行共用同一套组件。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agents::{ActorFactory, ActorSettings, DynamicActor, Planner};
use crate::config::AppConfig;
use crate::graph::{ResearchGraph, SessionState};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::prompts::{PromptRenderer, PromptTemplates};
use crate::server::ChatService;
use crate::store::{Decision, InMemoryStore, KeyValueStore, PendingInterrupt};
use crate::tools::{
    ReadFileTool, ReadUrlTool, SafeFs, ToolExecutor, ToolRegistry, UpdateProgressTool, WebSearchTool,
    WriteFileTool,
};

/// 组装好的运行时，可多请求共享
#[derive(Clone)]
pub struct Runtime {
    pub graph: Arc<ResearchGraph>,
    pub service: Arc<ChatService>,
    sessions: Arc<InMemoryStore<SessionState>>,
    interrupts: Arc<InMemoryStore<PendingInterrupt>>,
    /// 配置了过期时间时的清理周期
    pub sweep_interval: Option<Duration>,
}

impl Runtime {
    /// 清理过期的会话、挂起记录与预提交决策
    pub async fn cleanup_expired(&self) -> usize {
        self.sessions.cleanup_expired().await
            + self.interrupts.cleanup_expired().await
            + self.service.cleanup_expired().await
    }
}

/// 文件工具根目录：tools.filesystem_root → app.workspace_root → ./workspace
pub fn workspace_root(cfg: &AppConfig) -> PathBuf {
    cfg.tools
        .filesystem_root
        .clone()
        .or_else(|| cfg.app.workspace_root.clone())
        .unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("workspace")
        })
}

/// 构建工具注册表：web_search、read_url、update_progress、read_file、write_file
pub fn build_registry(cfg: &AppConfig) -> ToolRegistry {
    let root = workspace_root(cfg);
    if let Err(e) = std::fs::create_dir_all(&root) {
        tracing::warn!(root = %root.display(), "create workspace failed: {}", e);
    }
    let fs = SafeFs::new(&root);

    let mut registry = ToolRegistry::new();
    registry.register(WebSearchTool::new(
        cfg.tools.search.endpoint.clone(),
        cfg.tools.search.max_results,
        cfg.tools.search.timeout_secs,
    ));
    registry.register(ReadUrlTool::new(
        cfg.tools.fetch.allowed_domains.clone(),
        cfg.tools.fetch.timeout_secs,
        cfg.tools.fetch.max_chars,
    ));
    registry.register(UpdateProgressTool);
    registry.register(ReadFileTool::new(fs.clone()));
    registry.register(WriteFileTool::new(fs));
    registry
}

pub fn create_runtime(cfg: &AppConfig) -> Runtime {
    create_runtime_with_llm(cfg, create_llm_from_config(cfg))
}

/// 使用外部给定的 LLM 构建（测试中注入 ScriptedLlmClient）
pub fn create_runtime_with_llm(cfg: &AppConfig, llm: Arc<dyn LlmClient>) -> Runtime {
    create_runtime_with_parts(cfg, llm, build_registry(cfg))
}

/// 使用外部给定的 LLM 与工具注册表构建
/// 会话实际使用的过期时间
///
/// 会话先于挂起记录写入，且必须比挂起记录活得久：有挂起 TTL 时取两者较大值再多一秒；
/// 挂起记录不过期时会话也不过期。
fn session_ttl_secs(cfg: &AppConfig) -> Option<u64> {
    match (cfg.app.session_ttl_secs, cfg.interrupts.ttl_secs) {
        (Some(session), Some(interrupt)) => {
            let clamped = session.max(interrupt.saturating_add(1));
            if clamped != session {
                tracing::warn!(
                    session_ttl_secs = session,
                    interrupt_ttl_secs = interrupt,
                    effective = clamped,
                    "session_ttl_secs raised above interrupts.ttl_secs"
                );
            }
            Some(clamped)
        }
        (Some(session), None) => {
            tracing::warn!(
                session_ttl_secs = session,
                "session_ttl_secs ignored: interrupts never expire"
            );
            None
        }
        (None, _) => None,
    }
}

pub fn create_runtime_with_parts(cfg: &AppConfig, llm: Arc<dyn LlmClient>, registry: ToolRegistry) -> Runtime {
    let locale = cfg.app.locale.clone();
    let prompts: Arc<dyn PromptRenderer> =
        Arc::new(PromptTemplates::with_overrides(cfg.app.prompts_dir.as_deref()));

    let available_tools = registry.tool_descriptions();
    let executor = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));
    for name in &cfg.interrupts.approval_required {
        if !executor.registry().contains(name) {
            tracing::warn!(tool = %name, "approval_required names an unknown tool");
        }
    }

    let planner = Planner::new(llm.clone(), prompts.clone(), locale.clone());
    let factory = ActorFactory::new(llm.clone(), prompts.clone(), locale.clone(), available_tools);
    let actor = DynamicActor::new(
        llm,
        prompts,
        executor,
        locale,
        ActorSettings {
            max_steps: cfg.graph.actor_max_steps,
            timeout: Duration::from_secs(cfg.graph.actor_timeout_secs),
            history_window: cfg.graph.history_window,
            approval_required: cfg.interrupts.approval_required.iter().cloned().collect(),
            description_prefix: cfg.interrupts.description_prefix.clone(),
        },
    );

    let session_ttl = session_ttl_secs(cfg);
    let sessions = Arc::new(InMemoryStore::<SessionState>::with_ttl_secs(session_ttl));
    let interrupts = Arc::new(InMemoryStore::<PendingInterrupt>::with_ttl_secs(cfg.interrupts.ttl_secs));
    let staged: Arc<dyn KeyValueStore<Vec<Decision>>> =
        Arc::new(InMemoryStore::<Vec<Decision>>::with_ttl_secs(cfg.interrupts.ttl_secs));

    let graph = Arc::new(
        ResearchGraph::new(planner, factory, actor, sessions.clone(), interrupts.clone())
            .with_max_iterations(cfg.graph.max_iterations)
            .with_default_decision(cfg.interrupts.default_decision.clone()),
    );
    let service = Arc::new(ChatService::new(graph.clone(), staged));

    let sweep_interval = [session_ttl, cfg.interrupts.ttl_secs]
        .into_iter()
        .flatten()
        .min()
        .map(|secs| Duration::from_secs((secs / 2).clamp(1, 60)));

    tracing::info!(
        max_iterations = cfg.graph.max_iterations,
        gated_tools = ?cfg.interrupts.approval_required,
        "runtime assembled"
    );
    Runtime {
        graph,
        service,
        sessions,
        interrupts,
        sweep_interval,
    }
}
