//! 动态 Agent 图：会话状态、节点事件与控制循环

pub mod events;
pub mod loop_;
pub mod state;

pub use events::{Node, NodeMessage};
pub use loop_::{DoneReason, ResearchGraph, RunOutcome};
pub use state::{ActorAssignment, Phase, ResultStatus, SessionDelta, SessionState, SubtaskResult};

/// 生成会话 id：`thread-` 加 8 位十六进制
pub fn new_thread_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("thread-{}", &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_format() {
        let id = new_thread_id();
        assert!(id.starts_with("thread-"));
        assert_eq!(id.len(), "thread-".len() + 8);
        assert!(id["thread-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
