//! 工作目录文件工具
//!
//! SafeFs 绑定 root_dir：相对路径按词法归一化后必须仍在 root 下（`../` 逃逸返回 PathEscape）；
//! 绝对路径允许访问但记录 warn 日志。ReadFileTool / WriteFileTool 基于 SafeFs。

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::schema::schema_value;
use crate::tools::Tool;

/// 词法归一化：消去 `.` 与 `..`，不访问文件系统
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// 沙箱文件系统：绑定根目录
#[derive(Debug, Clone)]
pub struct SafeFs {
    root_dir: PathBuf,
}

impl SafeFs {
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        let root = root_dir.as_ref().to_path_buf();
        let root_dir = root.canonicalize().unwrap_or(root);
        Self {
            root_dir: normalize(&root_dir),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// 解析路径：相对路径须留在 root 内，绝对路径放行并告警
    pub fn resolve(&self, path: &str) -> Result<PathBuf, AgentError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(AgentError::ToolExecutionFailed("path must not be empty".to_string()));
        }
        let p = Path::new(path);
        if p.is_absolute() {
            tracing::warn!(path = %path, root = %self.root_dir.display(), "absolute path outside workspace policy");
            return Ok(normalize(p));
        }
        let full = normalize(&self.root_dir.join(p));
        if full.starts_with(&self.root_dir) {
            Ok(full)
        } else {
            Err(AgentError::PathEscape(path.to_string()))
        }
    }

    pub async fn read_file(&self, path: &str) -> Result<String, AgentError> {
        let resolved = self.resolve(path)?;
        if !resolved.is_file() {
            return Err(AgentError::ToolExecutionFailed(format!("File not found: {path}")));
        }
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Read failed: {e}")))
    }

    /// 写入文件（覆盖），自动创建父目录；返回写入字节数
    pub async fn write_file(&self, path: &str, content: &str) -> Result<usize, AgentError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AgentError::ToolExecutionFailed(format!("Create dir failed: {e}")))?;
        }
        tokio::fs::write(&resolved, content.as_bytes())
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Write failed: {e}")))?;
        Ok(content.len())
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// 相对工作目录的文件路径
    pub path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// 相对工作目录的文件路径
    pub path: String,
    /// 写入的完整内容
    pub content: String,
}

/// read_file 工具
pub struct ReadFileTool {
    fs: SafeFs,
}

impl ReadFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace. Args: {\"path\": \"notes/summary.md\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<ReadFileArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: ReadFileArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {e}"))?;
        tracing::info!(path = %args.path, "read_file");
        self.fs.read_file(&args.path).await.map_err(|e| e.to_string())
    }
}

/// write_file 工具
pub struct WriteFileTool {
    fs: SafeFs,
}

impl WriteFileTool {
    pub fn new(fs: SafeFs) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text to a file in the workspace (overwrites). Args: {\"path\": \"notes/summary.md\", \"content\": \"...\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<WriteFileArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: WriteFileArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {e}"))?;
        tracing::info!(path = %args.path, bytes = args.content.len(), "write_file");
        let n = self
            .fs
            .write_file(&args.path, &args.content)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!("Wrote {n} bytes to {}", args.path))
    }
}
