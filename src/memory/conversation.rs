//! 对话记录：带角色标签的消息
//!
//! 消息在进入系统时即确定角色（system / user / assistant / tool），之后只按 `role` 匹配，
//! 不再对内容形状做临时判断。会话的 `message_history` 为只追加序列。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致，另含 tool 观察结果）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅 tool 消息携带：产生该观察结果的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            name: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            name: None,
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(name.into()),
        }
    }
}

/// 取历史末尾最多 `window` 条非 system 消息，作为 LLM 的对话上下文
pub fn recent_window(history: &[Message], window: usize) -> Vec<Message> {
    let filtered: Vec<&Message> = history
        .iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let skip = filtered.len().saturating_sub(window);
    filtered.into_iter().skip(skip).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        let msg = Message::tool("web_search", "1. result");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["name"], "web_search");
    }

    #[test]
    fn test_user_message_omits_name() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_recent_window_skips_system_and_keeps_tail() {
        let history = vec![
            Message::system("sys"),
            Message::user("a"),
            Message::assistant("b"),
            Message::user("c"),
        ];
        let window = recent_window(&history, 2);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].content, "b");
        assert_eq!(window[1].content, "c");
    }
}
