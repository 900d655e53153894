//! Prompt 模板：按名称与 locale 渲染系统提示词
//!
//! 查找顺序 `<name>.<locale>.md` → `<name>.md`（locale 中的 `-` 归一化为 `_`，如 zh-CN → zh_CN）。
//! 内置模板编译进二进制；若配置了 prompts_dir，目录中的同名文件覆盖内置版本。

pub mod template;

pub use template::{normalize_locale, PromptRenderer, PromptTemplates};
