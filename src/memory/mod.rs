//! 记忆层：会话级对话历史

pub mod conversation;

pub use conversation::{recent_window, Message, Role};
