//! JSON Schema 生成（schemars）
//!
//! 用于将「合法 tool call」以及工具参数的 JSON 结构注入 prompt，减少 LLM 输出格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 工具调用请求格式：与 Worker 解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 web_search、read_url、update_progress
    pub tool: String,
    /// 工具参数，依工具不同而不同（query、url、milestone、path 等）
    pub args: HashMap<String, Value>,
}

/// 类型 T 的 JSON Schema（serde_json::Value 形式）
pub fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// 类型 T 的 JSON Schema（美化字符串），可拼入 prompt
pub fn schema_json<T: JsonSchema>() -> String {
    serde_json::to_string_pretty(&schema_value::<T>()).unwrap_or_default()
}

/// 返回工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    schema_json::<ToolCallFormat>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_call_schema_mentions_fields() {
        let s = tool_call_schema_json();
        assert!(s.contains("\"tool\""));
        assert!(s.contains("\"args\""));
    }
}
