//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，如 `SCOUT__GRAPH__MAX_ITERATIONS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::store::Decision;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub graph: GraphSection,
    pub tools: ToolsSection,
    pub interrupts: InterruptsSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、工作目录、locale、prompt 目录、会话过期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 文件工具的根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// Prompt 模板 locale，如 en-US、zh-CN
    pub locale: String,
    /// 覆盖内置模板的目录（存在同名 .md 文件时优先）
    pub prompts_dir: Option<PathBuf>,
    /// 会话状态过期时间（秒）；未设置则不过期。实际值不短于 interrupts.ttl_secs + 1，挂起记录不过期时会话也不过期
    pub session_ttl_secs: Option<u64>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: None,
            locale: default_locale(),
            prompts_dir: None,
            session_ttl_secs: None,
        }
    }
}

fn default_locale() -> String {
    "en-US".to_string()
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 读取 API Key 的环境变量名
    pub api_key_env: String,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [graph] 段：控制循环上限与 Worker 预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// Worker 执行轮数上限（达到即终止）
    pub max_iterations: usize,
    /// 单个子任务内 Worker 的模型调用步数上限
    pub actor_max_steps: usize,
    /// 单个子任务 Worker 的墙钟时间上限（秒）
    pub actor_timeout_secs: u64,
    /// Worker 可见的最近对话条数
    pub history_window: usize,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            actor_max_steps: 8,
            actor_timeout_secs: 300,
            history_window: 20,
        }
    }
}

/// [tools] 段：文件系统根、工具超时、搜索与抓取
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub filesystem_root: Option<PathBuf>,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub fetch: FetchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            filesystem_root: None,
            tool_timeout_secs: 30,
            search: SearchSection::default(),
            fetch: FetchSection::default(),
        }
    }
}

/// [tools.search] 段：搜索端点（DuckDuckGo HTML 版）、结果数、超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            max_results: 5,
            timeout_secs: 15,
        }
    }
}

/// [tools.fetch] 段：抓取 URL 的超时、默认最大字符数、可选域名白名单（空表示不限制）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub timeout_secs: u64,
    pub max_chars: usize,
    pub allowed_domains: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_chars: 4000,
            allowed_domains: Vec::new(),
        }
    }
}

/// [interrupts] 段：需人工审批的工具、挂起记录过期、缺省决策
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterruptsSection {
    /// 调用前需人工审批的工具名
    pub approval_required: Vec<String>,
    /// 挂起记录过期时间（秒）；未设置则不过期
    pub ttl_secs: Option<u64>,
    /// 恢复时某个待审批动作没有对应决策时采用的决策
    pub default_decision: Decision,
    /// 审批请求描述的前缀
    pub description_prefix: String,
}

impl Default for InterruptsSection {
    fn default() -> Self {
        Self {
            approval_required: Vec::new(),
            ttl_secs: None,
            default_decision: Decision::Reject { message: None },
            description_prefix: "Tool execution requires approval".to_string(),
        }
    }
}

/// [server] 段：监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.graph.max_iterations, 10);
        assert_eq!(cfg.tools.fetch.max_chars, 4000);
        assert_eq!(cfg.app.locale, "en-US");
        assert!(cfg.interrupts.ttl_secs.is_none());
        assert!(cfg.interrupts.approval_required.is_empty());
        assert_eq!(cfg.server.port, 8000);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scout.toml");
        std::fs::write(
            &path,
            r#"
[graph]
max_iterations = 3

[interrupts]
approval_required = ["write_file"]
default_decision = { type = "approve" }
"#,
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.graph.max_iterations, 3);
        assert_eq!(cfg.graph.actor_max_steps, 8);
        assert_eq!(cfg.interrupts.approval_required, vec!["write_file".to_string()]);
        assert_eq!(cfg.interrupts.default_decision, Decision::Approve);
    }
}
