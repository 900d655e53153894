//! 控制循环对外产出的文本事件（按来源节点标注）

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// 产生文本的节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Planner,
    ActorFactory,
    DynamicActor,
    Counter,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Planner => "planner",
            Node::ActorFactory => "actor_factory",
            Node::DynamicActor => "dynamic_actor",
            Node::Counter => "counter",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMessage {
    pub node: Node,
    pub content: String,
}

pub(crate) fn send_event(tx: Option<&UnboundedSender<NodeMessage>>, node: Node, content: impl Into<String>) {
    if let Some(t) = tx {
        let _ = t.send(NodeMessage {
            node,
            content: content.into(),
        });
    }
}
