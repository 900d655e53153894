//! 工具层：注册表、执行器与研究用工具

pub mod executor;
pub mod fetch;
pub mod filesystem;
pub mod progress;
pub mod registry;
pub mod schema;
pub mod search;

pub use executor::{ToolExecutor, ERROR_MARKER};
pub use fetch::ReadUrlTool;
pub use filesystem::{ReadFileTool, SafeFs, WriteFileTool};
pub use progress::{UpdateProgressTool, UPDATE_PROGRESS};
pub use registry::{Tool, ToolRegistry};
pub use schema::{schema_json, schema_value, tool_call_schema_json};
pub use search::WebSearchTool;
