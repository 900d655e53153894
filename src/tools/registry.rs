//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册与查找；
//! `resolve` 将 Actor Factory 选出的工具名映射为可调用工具，未知名称静默忽略，进度记录工具总是包含在内。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::progress::UPDATE_PROGRESS;

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（用于 JSON 中的 "tool" 字段）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema（供 LLM 生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；失败以 Err(文本) 返回，由执行器统一加上错误标记
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>（BTreeMap 保证列举顺序稳定）
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// 返回 (name, description) 列表，用于生成 prompt 中的可用工具段落
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description().to_string()))
            .collect()
    }

    /// 将工具名映射为工具：保持首次出现的顺序、去重、忽略未知名称，并总是附加 update_progress
    pub fn resolve(&self, names: &[String]) -> Vec<Arc<dyn Tool>> {
        let mut selected: Vec<Arc<dyn Tool>> = Vec::new();
        for name in names {
            if selected.iter().any(|t| t.name() == name) {
                continue;
            }
            match self.tools.get(name.as_str()) {
                Some(tool) => selected.push(tool.clone()),
                None => tracing::debug!(tool = %name, "ignoring unknown tool name"),
            }
        }
        if !selected.iter().any(|t| t.name() == UPDATE_PROGRESS) {
            if let Some(progress) = self.tools.get(UPDATE_PROGRESS) {
                selected.push(progress.clone());
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::UpdateProgressTool;

    struct Named(&'static str);

    #[async_trait]
    impl Tool for Named {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "test tool"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(Named("web_search"));
        r.register(Named("read_url"));
        r.register(UpdateProgressTool);
        r
    }

    #[test]
    fn test_resolve_ignores_unknown_and_adds_progress() {
        let r = registry();
        let tools = r.resolve(&["web_search".into(), "teleport".into(), "web_search".into()]);
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["web_search", UPDATE_PROGRESS]);
    }

    #[test]
    fn test_resolve_empty_selection_yields_progress_only() {
        let tools = registry().resolve(&[]);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), UPDATE_PROGRESS);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let err = registry().execute("nope", Value::Null).await.unwrap_err();
        assert!(err.contains("Unknown tool"));
    }
}
