//! Actor Factory：为子任务设计一次性 Worker（persona + 工具子集）

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agents::output::parse_json;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::prompts::PromptRenderer;
use crate::tools::schema_json;

/// Actor Factory 的输出
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActorSpec {
    /// 第二人称的角色描述（擅长什么、如何工作、好的答案是什么样）
    #[serde(default)]
    pub actor_persona: String,
    /// 从可用工具中选出的工具名
    #[serde(default)]
    pub actor_tools: Vec<String>,
}

pub struct ActorFactory {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptRenderer>,
    locale: String,
    /// 可选工具 (name, description)
    available_tools: Vec<(String, String)>,
}

impl ActorFactory {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<dyn PromptRenderer>,
        locale: impl Into<String>,
        available_tools: Vec<(String, String)>,
    ) -> Self {
        Self {
            llm,
            prompts,
            locale: locale.into(),
            available_tools,
        }
    }

    /// 为子任务生成 persona 与工具名；工具名不在此校验，未知名称由 Worker 忽略
    pub async fn build_actor(&self, subtask: &str) -> Result<ActorSpec, AgentError> {
        let tools: Vec<_> = self
            .available_tools
            .iter()
            .map(|(name, description)| json!({"name": name, "description": description}))
            .collect();
        let system = self.prompts.render(
            "actor_factory",
            &self.locale,
            &json!({
                "available_tools": tools,
                "output_schema": schema_json::<ActorSpec>(),
            }),
        )?;
        let messages = vec![
            Message::system(system),
            Message::user(format!("Current Subtask: {subtask}")),
        ];
        let output = self.llm.complete(&messages).await?;
        let spec: ActorSpec = parse_json(&output)?;
        tracing::debug!(tools = ?spec.actor_tools, "actor factory output parsed");
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::prompts::PromptTemplates;

    fn factory(llm: Arc<ScriptedLlmClient>) -> ActorFactory {
        ActorFactory::new(
            llm,
            Arc::new(PromptTemplates::builtin()),
            "en-US",
            vec![("web_search".into(), "search the web".into())],
        )
    }

    #[tokio::test]
    async fn test_build_actor_parses_spec_and_lists_tools() {
        let llm = Arc::new(ScriptedLlmClient::new([
            r#"{"actor_persona": "You are a historian.", "actor_tools": ["web_search", "made_up"]}"#,
        ]));
        let spec = factory(llm.clone()).build_actor("find dates").await.unwrap();
        assert_eq!(spec.actor_persona, "You are a historian.");
        assert_eq!(spec.actor_tools, vec!["web_search", "made_up"]);

        let sent = &llm.received()[0];
        assert!(sent[0].content.contains("`web_search`: search the web"));
        assert_eq!(sent[1].content, "Current Subtask: find dates");
    }

    #[tokio::test]
    async fn test_build_actor_failures() {
        let llm = Arc::new(ScriptedLlmClient::new(["no json here"]).then_fail(LlmError::Timeout(5)));
        let f = factory(llm);
        assert!(matches!(f.build_actor("x").await, Err(AgentError::JsonParseError(_))));
        assert!(matches!(f.build_actor("x").await, Err(AgentError::Llm(LlmError::Timeout(5)))));
    }
}
