//! 进度记录工具：Worker 总是拥有它，用于记录里程碑或发现

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::schema_value;
use crate::tools::Tool;

/// 工具名
pub const UPDATE_PROGRESS: &str = "update_progress";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateProgressArgs {
    /// 里程碑或发现的描述
    pub milestone: String,
    /// 状态：info / success / warning / error
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "info".to_string()
}

/// update_progress：返回确认文本
pub struct UpdateProgressTool;

#[async_trait]
impl Tool for UpdateProgressTool {
    fn name(&self) -> &str {
        UPDATE_PROGRESS
    }

    fn description(&self) -> &str {
        "Log a significant milestone or finding to the progress list. Args: {\"milestone\": \"...\", \"status\": \"info|success|warning|error\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<UpdateProgressArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: UpdateProgressArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {e}"))?;
        tracing::info!(status = %args.status, milestone = %args.milestone, "progress");
        Ok(format!(
            "Progress logged: [{}] {}",
            args.status.to_uppercase(),
            args.milestone
        ))
    }
}
