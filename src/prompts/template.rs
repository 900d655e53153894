//! Jinja 模板渲染（minijinja）

use std::collections::HashMap;
use std::path::Path;

use minijinja::Environment;
use serde_json::Value;

use crate::core::AgentError;

/// 模板渲染接口：给定模板名、locale 与变量，返回完整的提示词
pub trait PromptRenderer: Send + Sync {
    fn render(&self, name: &str, locale: &str, vars: &Value) -> Result<String, AgentError>;
}

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("planner.md", include_str!("../../config/prompts/planner.md")),
    (
        "planner.zh_CN.md",
        include_str!("../../config/prompts/planner.zh_CN.md"),
    ),
    (
        "actor_factory.md",
        include_str!("../../config/prompts/actor_factory.md"),
    ),
    (
        "dynamic_actor.md",
        include_str!("../../config/prompts/dynamic_actor.md"),
    ),
];

/// locale 归一化：空白 → en_US，`-` → `_`
pub fn normalize_locale(locale: &str) -> String {
    let locale = locale.trim();
    if locale.is_empty() {
        "en_US".to_string()
    } else {
        locale.replace('-', "_")
    }
}

/// 模板集合：文件名 → 源码
pub struct PromptTemplates {
    sources: HashMap<String, String>,
    env: Environment<'static>,
}

impl PromptTemplates {
    /// 仅含内置模板
    pub fn builtin() -> Self {
        let sources = BUILTIN_TEMPLATES
            .iter()
            .map(|(name, src)| (name.to_string(), src.to_string()))
            .collect();
        Self::from_sources(sources)
    }

    /// 内置模板 + 目录覆盖（目录不存在时等同 builtin）
    pub fn with_overrides(dir: Option<&Path>) -> Self {
        let mut templates = Self::builtin();
        let Some(dir) = dir else {
            return templates;
        };
        let Ok(entries) = std::fs::read_dir(dir) else {
            tracing::warn!(dir = %dir.display(), "prompts_dir not readable, using builtin templates");
            return templates;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(src) => {
                    tracing::debug!(template = %name, "prompt template override loaded");
                    templates.sources.insert(name.to_string(), src);
                }
                Err(e) => tracing::warn!(path = %path.display(), "read template failed: {}", e),
            }
        }
        templates
    }

    /// 直接从 (文件名, 源码) 构建（测试或嵌入方使用）
    pub fn from_sources(sources: HashMap<String, String>) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        Self { sources, env }
    }

    fn lookup(&self, name: &str, locale: &str) -> Option<&str> {
        let localized = format!("{}.{}.md", name, normalize_locale(locale));
        self.sources
            .get(&localized)
            .or_else(|| self.sources.get(&format!("{name}.md")))
            .map(String::as_str)
    }
}

impl PromptRenderer for PromptTemplates {
    fn render(&self, name: &str, locale: &str, vars: &Value) -> Result<String, AgentError> {
        let source = self.lookup(name, locale).ok_or_else(|| {
            AgentError::Prompt(format!("template {name} not found for locale {locale}"))
        })?;

        let mut ctx = match vars {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut m = serde_json::Map::new();
                m.insert("input".to_string(), other.clone());
                m
            }
        };
        ctx.entry("CURRENT_TIME").or_insert_with(|| {
            Value::String(chrono::Local::now().format("%a %b %d %Y %H:%M:%S %z").to_string())
        });

        self.env
            .render_str(source, Value::Object(ctx))
            .map_err(|e| {
                AgentError::Prompt(format!(
                    "error applying template {name} for locale {locale}: {e}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn templates() -> PromptTemplates {
        let mut sources = HashMap::new();
        sources.insert("greet.md".to_string(), "Hello {{ who }}".to_string());
        sources.insert("greet.zh_CN.md".to_string(), "你好 {{ who }}".to_string());
        sources.insert("clock.md".to_string(), "now={{ CURRENT_TIME }}".to_string());
        PromptTemplates::from_sources(sources)
    }

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("zh-CN"), "zh_CN");
        assert_eq!(normalize_locale("  "), "en_US");
    }

    #[test]
    fn test_locale_specific_template_wins() {
        let out = templates().render("greet", "zh-CN", &json!({"who": "世界"})).unwrap();
        assert_eq!(out, "你好 世界");
    }

    #[test]
    fn test_falls_back_to_default_template() {
        let out = templates().render("greet", "fr-FR", &json!({"who": "world"})).unwrap();
        assert_eq!(out, "Hello world");
    }

    #[test]
    fn test_current_time_injected() {
        let out = templates().render("clock", "en-US", &json!({})).unwrap();
        assert!(out.starts_with("now="));
        assert!(out.len() > "now=".len());
    }

    #[test]
    fn test_missing_template_is_prompt_error() {
        let err = templates().render("absent", "en-US", &json!({})).unwrap_err();
        assert!(matches!(err, AgentError::Prompt(_)));
    }

    #[test]
    fn test_builtin_templates_render() {
        let t = PromptTemplates::builtin();
        let planner = t
            .render(
                "planner",
                "en-US",
                &json!({"objective": "x", "progress_outline": "", "output_schema": "{}"}),
            )
            .unwrap();
        assert!(planner.contains("Planner"));
        let zh = t
            .render(
                "planner",
                "zh-CN",
                &json!({"objective": "x", "progress_outline": "- [ ] a", "output_schema": "{}"}),
            )
            .unwrap();
        assert!(zh.contains("规划者"));
    }

    #[test]
    fn test_directory_override() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("planner.md"), "custom {{ objective }}").unwrap();
        let t = PromptTemplates::with_overrides(Some(dir.path()));
        let out = t.render("planner", "en-US", &json!({"objective": "goal"})).unwrap();
        assert_eq!(out, "custom goal");
    }
}
