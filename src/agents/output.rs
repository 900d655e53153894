//! 模型输出中的 JSON 提取
//!
//! 模型常在 JSON 外包裹 ```json 代码块或说明文字：优先取代码块内容，否则取第一个 `{` 到最后一个 `}`。

use serde::de::DeserializeOwned;

use crate::core::AgentError;

/// 提取 JSON 片段；找不到对象时返回 None
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest).trim();
        return Some(block);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&trimmed[start..=end])
}

/// 提取并反序列化为 T
pub fn parse_json<T: DeserializeOwned>(output: &str) -> Result<T, AgentError> {
    let json_str = extract_json(output)
        .ok_or_else(|| AgentError::JsonParseError(format!("no JSON object in output: {}", preview(output))))?;
    serde_json::from_str(json_str)
        .map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, preview(json_str))))
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
